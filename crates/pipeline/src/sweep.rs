//! Periodic background sweeps.
//!
//! The timeout sweep is the only path out of RUNNING that is not driven by
//! the worker owning the job; it catches attempts whose process died or
//! hung. The orphan sweep retries storage deletions that failed during
//! request deletion.

use std::sync::Arc;
use std::time::Duration;

use meshgen_db::models::status::JobKind;
use meshgen_db::repositories::{
    GeneratedImageRepo, GenerationJobRepo, GenerationRequestRepo, ModelRepo, OrphanedFileRepo,
};
use meshgen_db::DbPool;
use meshgen_events::{Broadcast, EventType, TaskEvent};
use meshgen_providers::ModelStorage;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TIMED_OUT_MESSAGE: &str = "generation timed out";

type SweepError = Box<dyn std::error::Error + Send + Sync>;

/// Moves RUNNING jobs past their deadline to TIMEOUT and fails the owning
/// domain rows.
pub struct TimeoutSweeper {
    pool: DbPool,
    broadcast: Arc<dyn Broadcast>,
    interval: Duration,
}

impl TimeoutSweeper {
    pub fn new(pool: DbPool, broadcast: Arc<dyn Broadcast>, interval: Duration) -> Self {
        Self {
            pool,
            broadcast,
            interval,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(interval_secs = self.interval.as_secs(), "Timeout sweep started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Timeout sweep shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = self.cycle().await {
                            tracing::error!(error = %e, "Timeout sweep cycle failed");
                        }
                    }
                }
            }
        })
    }

    async fn cycle(&self) -> Result<(), SweepError> {
        let swept = GenerationJobRepo::sweep_timeouts(&self.pool).await?;
        for job in swept {
            tracing::warn!(
                job_id = job.id,
                job_kind_id = job.job_kind_id,
                request_id = job.request_id,
                "Job exceeded its deadline, timed out"
            );
            match JobKind::from_id(job.job_kind_id) {
                Some(JobKind::Image) => {
                    GeneratedImageRepo::mark_failed(&self.pool, job.entity_id, TIMED_OUT_MESSAGE)
                        .await?;
                    let index = GeneratedImageRepo::find_by_id(&self.pool, job.entity_id)
                        .await?
                        .map(|image| image.image_index);
                    self.broadcast
                        .broadcast(TaskEvent::new(
                            job.request_id,
                            EventType::ImageFailed,
                            serde_json::json!({
                                "image_index": index,
                                "error_message": TIMED_OUT_MESSAGE,
                            }),
                        ))
                        .await;
                }
                Some(JobKind::Model) => {
                    ModelRepo::mark_failed(&self.pool, job.entity_id, TIMED_OUT_MESSAGE).await?;
                    self.broadcast
                        .broadcast(TaskEvent::new(
                            job.request_id,
                            EventType::ModelFailed,
                            serde_json::json!({ "error_message": TIMED_OUT_MESSAGE }),
                        ))
                        .await;
                }
                None => {
                    tracing::error!(job_id = job.id, job_kind_id = job.job_kind_id, "Unknown job kind");
                    continue;
                }
            }
            GenerationRequestRepo::mark_failed(&self.pool, job.request_id, TIMED_OUT_MESSAGE)
                .await?;
        }
        Ok(())
    }
}

/// Retries deletion of storage objects whose rows are already gone.
pub struct OrphanSweeper {
    pool: DbPool,
    storage: Arc<dyn ModelStorage>,
    interval: Duration,
    max_retries: i32,
    batch: i64,
}

impl OrphanSweeper {
    pub fn new(
        pool: DbPool,
        storage: Arc<dyn ModelStorage>,
        interval: Duration,
        max_retries: i32,
        batch: i64,
    ) -> Self {
        Self {
            pool,
            storage,
            interval,
            max_retries,
            batch,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(interval_secs = self.interval.as_secs(), "Orphan sweep started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Orphan sweep shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = self.cycle().await {
                            tracing::error!(error = %e, "Orphan sweep cycle failed");
                        }
                    }
                }
            }
        })
    }

    async fn cycle(&self) -> Result<(), SweepError> {
        let pending =
            OrphanedFileRepo::list_pending(&self.pool, self.max_retries, self.batch).await?;
        for row in pending {
            match self.storage.delete_object(&row.s3_key).await {
                Ok(()) => {
                    OrphanedFileRepo::mark_deleted(&self.pool, row.id).await?;
                    tracing::info!(key = %row.s3_key, "Deleted orphaned object");
                }
                Err(e) => {
                    OrphanedFileRepo::bump_retry(&self.pool, row.id).await?;
                    tracing::warn!(
                        key = %row.s3_key,
                        retry_count = row.retry_count + 1,
                        error = %e,
                        "Orphaned object deletion failed"
                    );
                }
            }
        }

        // Rows past the ceiling stay visible on every pass until someone
        // cleans them up by hand.
        let exhausted = OrphanedFileRepo::list_exhausted(&self.pool, self.max_retries).await?;
        for row in exhausted {
            tracing::error!(
                key = %row.s3_key,
                retry_count = row.retry_count,
                "Orphaned object exhausted deletion retries, manual cleanup required"
            );
        }
        Ok(())
    }
}
