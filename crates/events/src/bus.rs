//! Broker-backed pub/sub channel for cross-process event delivery.
//!
//! Workers and API replicas are separate OS processes; an event produced by
//! a worker must reach every API process holding client connections for that
//! task. All events travel on one fixed channel with the task id embedded in
//! the message body; a fixed subscription avoids per-task channel churn
//! across horizontally-scaled replicas.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use tokio_util::sync::CancellationToken;

use crate::event::TaskEvent;

/// The single pub/sub channel every process publishes to and subscribes on.
pub const EVENT_CHANNEL: &str = "meshgen:events";

/// Delay before re-establishing a dropped subscription connection.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// Errors from the event bus.
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("broker error: {0}")]
    Broker(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Publish capability. A trait so the degraded-delivery paths can be tested
/// with a failing publisher, and so processes without a broker connection
/// can be handed a no-op.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Serialize the event and send it on the shared channel.
    ///
    /// Errors are returned, never panicked on; callers degrade to
    /// local-only delivery when the broker is unavailable.
    async fn publish(&self, event: &TaskEvent) -> Result<(), EventBusError>;
}

/// Redis-backed publisher using a multiplexed auto-reconnecting connection.
pub struct RedisPublisher {
    conn: redis::aio::ConnectionManager,
}

impl RedisPublisher {
    pub async fn connect(client: &redis::Client) -> Result<Self, EventBusError> {
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl EventPublisher for RedisPublisher {
    async fn publish(&self, event: &TaskEvent) -> Result<(), EventBusError> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.conn.clone();
        // Receiver count is irrelevant: zero subscribers just means no
        // process currently holds connections for any task.
        let _: i64 = conn.publish(EVENT_CHANNEL, payload).await?;
        Ok(())
    }
}

/// Redis-backed subscriber: one active subscription per process.
///
/// Every message on the channel, including those this process published,
/// is handed to the handler; the connection registry filters by local task
/// interest.
pub struct RedisSubscriber {
    client: redis::Client,
}

impl RedisSubscriber {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Spawn the subscription loop. Reconnects with a fixed delay if the
    /// broker connection drops; exits when `cancel` fires.
    pub fn spawn<H>(self, cancel: CancellationToken, handler: H) -> tokio::task::JoinHandle<()>
    where
        H: Fn(TaskEvent) + Send + Sync + 'static,
    {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Event subscriber shutting down");
                        break;
                    }
                    result = self.run_subscription(&handler) => {
                        match result {
                            Ok(()) => {
                                // Stream ended without error: connection closed.
                                tracing::warn!("Event subscription stream ended, reconnecting");
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Event subscription failed, reconnecting");
                            }
                        }
                        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                    }
                }
            }
        })
    }

    async fn run_subscription<H>(&self, handler: &H) -> Result<(), EventBusError>
    where
        H: Fn(TaskEvent),
    {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(EVENT_CHANNEL).await?;
        tracing::info!(channel = EVENT_CHANNEL, "Subscribed to event channel");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload: String = msg.get_payload()?;
            match serde_json::from_str::<TaskEvent>(&payload) {
                Ok(event) => handler(event),
                Err(e) => {
                    // A malformed message must not kill the subscription.
                    tracing::warn!(error = %e, "Discarding malformed event message");
                }
            }
        }
        Ok(())
    }
}
