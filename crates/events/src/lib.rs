//! Cross-process event distribution for generation tasks.
//!
//! Events describing task lifecycle transitions are published on a single
//! broker channel ([`bus::EVENT_CHANNEL`]) and fanned out to client
//! connections by whichever API process holds them.

pub mod broadcast;
pub mod bus;
pub mod event;

pub use broadcast::{Broadcast, BusBroadcaster};
pub use bus::{EventBusError, EventPublisher, RedisPublisher, RedisSubscriber, EVENT_CHANNEL};
pub use event::{EventType, TaskEvent};
