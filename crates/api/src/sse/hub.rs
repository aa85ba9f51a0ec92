//! Event distribution hub for the API process.
//!
//! Outgoing events go through the broker so every replica's connections
//! see them; if the broker is unavailable the event is still handed to
//! this process's own connections (degraded same-process delivery).
//! Incoming broker messages are fed straight into the local registry.

use std::sync::Arc;

use async_trait::async_trait;
use meshgen_events::{Broadcast, EventPublisher, TaskEvent};

use super::registry::ConnectionRegistry;

pub struct SseHub {
    registry: Arc<ConnectionRegistry>,
    publisher: Arc<dyn EventPublisher>,
}

impl SseHub {
    pub fn new(registry: Arc<ConnectionRegistry>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            registry,
            publisher,
        }
    }

    /// Deliver a broker-received event to this process's connections.
    pub fn deliver_local(&self, event: &TaskEvent) -> usize {
        self.registry.send_to_task(event)
    }
}

#[async_trait]
impl Broadcast for SseHub {
    async fn broadcast(&self, event: TaskEvent) {
        if let Err(e) = self.publisher.publish(&event).await {
            // Local connections still get the event; the subscription loop
            // would have echoed it back to us anyway.
            let delivered = self.registry.send_to_task(&event);
            tracing::warn!(
                task_id = event.task_id,
                event_type = %event.event_type,
                delivered,
                error = %e,
                "Event publish failed, delivered to local connections only"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::registry::OutboundFrame;
    use assert_matches::assert_matches;
    use meshgen_events::{EventBusError, EventType};

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, _event: &TaskEvent) -> Result<(), EventBusError> {
            Err(EventBusError::Serialization(
                serde_json::from_str::<i32>("x").unwrap_err(),
            ))
        }
    }

    struct OkPublisher;

    #[async_trait]
    impl EventPublisher for OkPublisher {
        async fn publish(&self, _event: &TaskEvent) -> Result<(), EventBusError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn publish_failure_falls_back_to_local_delivery() {
        let registry = Arc::new(ConnectionRegistry::new());
        let hub = SseHub::new(registry.clone(), Arc::new(FailingPublisher));
        let (_id, mut rx) = registry.add(5);

        hub.broadcast(TaskEvent::new(
            5,
            EventType::ImageCompleted,
            serde_json::json!({ "image_index": 0 }),
        ))
        .await;

        assert_matches!(rx.try_recv(), Ok(OutboundFrame::Event(e)) => {
            assert_eq!(e.task_id, 5);
            assert_eq!(e.event_type, EventType::ImageCompleted);
        });
    }

    #[tokio::test]
    async fn successful_publish_skips_direct_local_delivery() {
        let registry = Arc::new(ConnectionRegistry::new());
        let hub = SseHub::new(registry.clone(), Arc::new(OkPublisher));
        let (_id, mut rx) = registry.add(5);

        hub.broadcast(TaskEvent::new(5, EventType::TaskUpdated, serde_json::json!({})))
            .await;

        // Delivery happens via the broker echo, not synchronously here.
        assert!(rx.try_recv().is_err());
    }
}
