//! Broadcast seam between event producers and the delivery substrate.
//!
//! Producers (workers, the orchestrator, sweeps) emit events through a
//! [`Broadcast`] without knowing whether delivery goes over the broker,
//! to in-process connections, or both.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::EventPublisher;
use crate::event::TaskEvent;

/// Fire-and-forget event emission.
///
/// Implementations must never propagate delivery failures to callers: a
/// job's state transition has already been persisted by the time its event
/// is broadcast, and clients recover missed events by re-fetching task
/// state.
#[async_trait]
pub trait Broadcast: Send + Sync {
    async fn broadcast(&self, event: TaskEvent);
}

/// Broadcaster for processes with no local client connections.
///
/// Worker processes only ever deliver through the broker; a publish failure
/// is logged and the event dropped.
pub struct BusBroadcaster {
    publisher: Arc<dyn EventPublisher>,
}

impl BusBroadcaster {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl Broadcast for BusBroadcaster {
    async fn broadcast(&self, event: TaskEvent) {
        if let Err(e) = self.publisher.publish(&event).await {
            tracing::warn!(
                task_id = event.task_id,
                event_type = %event.event_type,
                error = %e,
                "Failed to publish event, dropping"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBusError;
    use crate::event::EventType;

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, _event: &TaskEvent) -> Result<(), EventBusError> {
            Err(EventBusError::Serialization(serde_json::from_str::<i32>("x").unwrap_err()))
        }
    }

    struct RecordingPublisher {
        events: std::sync::Mutex<Vec<TaskEvent>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, event: &TaskEvent) -> Result<(), EventBusError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn publish_failure_is_swallowed() {
        let broadcaster = BusBroadcaster::new(Arc::new(FailingPublisher));
        // Must not panic or surface the error.
        broadcaster
            .broadcast(TaskEvent::new(1, EventType::TaskUpdated, serde_json::json!({})))
            .await;
    }

    #[tokio::test]
    async fn events_reach_the_publisher() {
        let publisher = Arc::new(RecordingPublisher {
            events: std::sync::Mutex::new(Vec::new()),
        });
        let broadcaster = BusBroadcaster::new(publisher.clone());

        broadcaster
            .broadcast(TaskEvent::new(
                42,
                EventType::ModelProgress,
                serde_json::json!({ "progress": 50 }),
            ))
            .await;

        let events = publisher.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].task_id, 42);
        assert_eq!(events[0].event_type, EventType::ModelProgress);
    }
}
