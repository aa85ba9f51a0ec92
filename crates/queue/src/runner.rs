//! Consumer loop for a named queue.
//!
//! Each cycle promotes due delayed deliveries, then drains the ready list
//! into handler tasks, bounded by a semaphore and an optional fixed-window
//! rate limit. A delivery sits in the active list for the duration of its
//! handler run so that a crash re-delivers it on the next startup.

use std::sync::Arc;

use async_trait::async_trait;
use meshgen_core::backoff::retry_delay;
use redis::AsyncCommands;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::payload::JobDelivery;
use crate::queue::{JobQueue, QueueError};

/// Batch size when promoting due delayed deliveries.
const PROMOTE_BATCH: isize = 100;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processes one delivery. An `Err` counts as a failed attempt and
/// triggers backoff scheduling or parking in the failed list; handlers
/// persist their own domain-level failure state before returning `Err`.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, delivery: &JobDelivery) -> Result<(), HandlerError>;
}

pub struct QueueRunner {
    queue: JobQueue,
    handler: Arc<dyn JobHandler>,
    semaphore: Arc<Semaphore>,
}

impl QueueRunner {
    pub fn new(queue: JobQueue, handler: Arc<dyn JobHandler>) -> Self {
        let semaphore = Arc::new(Semaphore::new(queue.config().concurrency));
        Self {
            queue,
            handler,
            semaphore,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.queue.config().poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(queue = %self.queue.config().name, "Queue runner started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!(queue = %self.queue.config().name, "Queue runner shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = self.cycle().await {
                            tracing::error!(
                                queue = %self.queue.config().name,
                                error = %e,
                                "Queue cycle failed"
                            );
                        }
                    }
                }
            }
        })
    }

    async fn cycle(&self) -> Result<(), QueueError> {
        self.promote_due().await?;
        self.drain_ready().await
    }

    /// Move delayed deliveries whose due time has passed onto the ready
    /// list. ZREM before LPUSH: only the runner that wins the removal
    /// promotes, so concurrent runners never duplicate a delivery.
    async fn promote_due(&self) -> Result<(), QueueError> {
        let keys = self.queue.keys();
        let mut conn = self.queue.connection();
        let now = chrono::Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore_limit(keys.delayed(), 0, now, 0, PROMOTE_BATCH)
            .await?;
        for raw in due {
            let removed: i64 = conn.zrem(keys.delayed(), &raw).await?;
            if removed == 1 {
                let _: i64 = conn.lpush(keys.ready(), raw).await?;
            }
        }
        Ok(())
    }

    async fn drain_ready(&self) -> Result<(), QueueError> {
        let keys = self.queue.keys();
        let mut conn = self.queue.connection();
        loop {
            // Don't pull work we have no capacity for; a delivery parked
            // in active while we wait for a permit would stall redelivery.
            if self.semaphore.available_permits() == 0 {
                return Ok(());
            }
            let slot = self.charge_rate_slot(&mut conn).await?;
            if matches!(slot, RateSlot::Exhausted) {
                return Ok(());
            }
            let raw: Option<String> = conn
                .lmove(
                    keys.ready(),
                    keys.active(),
                    redis::Direction::Right,
                    redis::Direction::Left,
                )
                .await?;
            let Some(raw) = raw else {
                // Nothing was dequeued; an idle poll must not spend the
                // window's budget.
                if let RateSlot::Charged(key) = slot {
                    let _: i64 = conn.decr(&key, 1).await?;
                }
                return Ok(());
            };
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("runner semaphore is never closed");
            let queue = self.queue.clone();
            let handler = self.handler.clone();
            tokio::spawn(async move {
                if let Err(e) = process_delivery(&queue, handler.as_ref(), &raw).await {
                    tracing::error!(
                        queue = %queue.config().name,
                        error = %e,
                        "Failed to settle delivery"
                    );
                }
                drop(permit);
            });
        }
    }

    /// Fixed-window limiter: one counter per window. The charge is taken
    /// up front (INCR is the only atomic claim across replicas) and the
    /// caller refunds it when no delivery was actually dequeued.
    async fn charge_rate_slot(
        &self,
        conn: &mut redis::aio::ConnectionManager,
    ) -> Result<RateSlot, QueueError> {
        let config = self.queue.config();
        let Some(max) = config.rate_limit_max else {
            return Ok(RateSlot::Unlimited);
        };
        let window_secs = config.rate_limit_window.as_secs().max(1) as i64;
        let key = self
            .queue
            .keys()
            .rate_window(window_index(chrono::Utc::now().timestamp(), window_secs));
        let count: i64 = conn.incr(&key, 1).await?;
        if count == 1 {
            // Keep the counter one extra window so a clock-edge read
            // never sees a vanished key mid-window.
            let _: bool = conn.expire(&key, window_secs * 2).await?;
        }
        if count <= i64::from(max) {
            Ok(RateSlot::Charged(key))
        } else {
            Ok(RateSlot::Exhausted)
        }
    }
}

/// Outcome of claiming a dequeue slot from the fixed-window limiter.
enum RateSlot {
    /// No limiter configured for this queue.
    Unlimited,
    /// A slot was claimed against this window key; refundable.
    Charged(String),
    /// The window's budget is spent.
    Exhausted,
}

fn window_index(now_secs: i64, window_secs: i64) -> i64 {
    now_secs / window_secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_within_a_window_share_one_counter() {
        assert_eq!(window_index(100, 10), window_index(109, 10));
        assert_ne!(window_index(109, 10), window_index(110, 10));
        assert_eq!(window_index(5, 1), 5);
    }
}

/// Run the handler for one raw delivery and settle it: completed history
/// on success, backoff re-schedule or failed history on error.
async fn process_delivery(
    queue: &JobQueue,
    handler: &dyn JobHandler,
    raw: &str,
) -> Result<(), QueueError> {
    let keys = queue.keys();
    let config = queue.config();
    let mut conn = queue.connection();

    let delivery: JobDelivery = match serde_json::from_str(raw) {
        Ok(delivery) => delivery,
        Err(e) => {
            tracing::error!(queue = %config.name, error = %e, "Unreadable delivery, parking as failed");
            let _: i64 = conn.lrem(keys.active(), 1, raw).await?;
            let _: i64 = conn.lpush(keys.failed(), raw).await?;
            let _: () = conn.ltrim(keys.failed(), 0, config.failed_cap - 1).await?;
            return Ok(());
        }
    };

    let result = handler.handle(&delivery).await;
    let _: i64 = conn.lrem(keys.active(), 1, raw).await?;

    match result {
        Ok(()) => {
            let _: i64 = conn.lpush(keys.completed(), raw).await?;
            let _: () = conn
                .ltrim(keys.completed(), 0, config.completed_cap - 1)
                .await?;
        }
        Err(e) if delivery.has_attempts_left() => {
            let next = delivery.next_attempt();
            let delay = retry_delay(config.backoff_base, delivery.attempt);
            let due = chrono::Utc::now().timestamp_millis() + delay.as_millis() as i64;
            tracing::warn!(
                queue = %config.name,
                job_id = delivery.payload.job_id,
                attempt = delivery.attempt,
                next_attempt = next.attempt,
                delay_secs = delay.as_secs(),
                error = %e,
                "Delivery failed, scheduling retry"
            );
            queue.enqueue_delayed(&next, due).await?;
        }
        Err(e) => {
            tracing::error!(
                queue = %config.name,
                job_id = delivery.payload.job_id,
                attempt = delivery.attempt,
                error = %e,
                "Delivery failed with no attempts left"
            );
            let _: i64 = conn.lpush(keys.failed(), raw).await?;
            let _: () = conn.ltrim(keys.failed(), 0, config.failed_cap - 1).await?;
        }
    }
    Ok(())
}
