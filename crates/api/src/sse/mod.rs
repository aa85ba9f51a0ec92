//! SSE connection management: registry, hub, heartbeat, route handler.

pub mod handler;
pub mod heartbeat;
pub mod hub;
pub mod registry;

pub use heartbeat::start_heartbeat;
pub use hub::SseHub;
pub use registry::{ConnectionRegistry, OutboundFrame};
