//! Broker-backed job queues with delayed retry scheduling.
//!
//! Each queue is a family of broker keys (see [`keys::QueueKeys`]): a ready
//! list, a delayed sorted set, an active list, and capped history lists.
//! Producers push through [`JobQueue`]; a [`runner::QueueRunner`] per
//! process consumes with bounded concurrency and settles each delivery.

pub mod config;
pub mod keys;
pub mod payload;
pub mod queue;
pub mod runner;

pub use config::QueueConfig;
pub use payload::{JobDelivery, JobPayload};
pub use queue::{JobQueue, QueueCounts, QueueError};
pub use runner::{HandlerError, JobHandler, QueueRunner};
