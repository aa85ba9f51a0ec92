//! Producer and inspection side of a named queue.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;

use crate::config::QueueConfig;
use crate::keys::QueueKeys;
use crate::payload::{JobDelivery, JobPayload};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("broker error: {0}")]
    Broker(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Depth of each list backing a queue, reported on the worker status
/// endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct QueueCounts {
    pub ready: i64,
    pub delayed: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Handle to one named queue. Cheap to clone; producers and the runner
/// share the same multiplexed connection.
#[derive(Clone)]
pub struct JobQueue {
    conn: ConnectionManager,
    keys: QueueKeys,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(conn: ConnectionManager, config: QueueConfig) -> Self {
        Self {
            conn,
            keys: QueueKeys::new(&config.name),
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub(crate) fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    pub(crate) fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Enqueue a first delivery for immediate pickup. Non-blocking: the
    /// caller returns as soon as the broker acknowledges the push.
    pub async fn enqueue(&self, payload: JobPayload) -> Result<(), QueueError> {
        let delivery = JobDelivery::first(payload, self.config.max_attempts);
        let raw = serde_json::to_string(&delivery)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.lpush(self.keys.ready(), raw).await?;
        Ok(())
    }

    /// Schedule a delivery for pickup at `due_at_millis` (epoch millis).
    pub async fn enqueue_delayed(
        &self,
        delivery: &JobDelivery,
        due_at_millis: i64,
    ) -> Result<(), QueueError> {
        let raw = serde_json::to_string(delivery)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.zadd(self.keys.delayed(), raw, due_at_millis).await?;
        Ok(())
    }

    /// Move deliveries stranded in the active list back to ready. Run once
    /// at startup, before the runner starts, so work held by a crashed
    /// process is re-delivered.
    pub async fn recover(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let mut recovered = 0u64;
        loop {
            let moved: Option<String> = conn
                .lmove(
                    self.keys.active(),
                    self.keys.ready(),
                    redis::Direction::Right,
                    redis::Direction::Left,
                )
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }
        if recovered > 0 {
            tracing::info!(
                queue = %self.config.name,
                recovered,
                "Requeued deliveries from a previous run"
            );
        }
        Ok(recovered)
    }

    pub async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let mut conn = self.conn.clone();
        let ready: i64 = conn.llen(self.keys.ready()).await?;
        let delayed: i64 = conn.zcard(self.keys.delayed()).await?;
        let active: i64 = conn.llen(self.keys.active()).await?;
        let completed: i64 = conn.llen(self.keys.completed()).await?;
        let failed: i64 = conn.llen(self.keys.failed()).await?;
        Ok(QueueCounts {
            ready,
            delayed,
            active,
            completed,
            failed,
        })
    }
}
