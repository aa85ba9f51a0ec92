//! Repository for the `generation_jobs` table.
//!
//! Jobs move through the state machine PENDING → RUNNING → {COMPLETED |
//! RETRYING | FAILED | TIMEOUT}, with RETRYING → RUNNING on redelivery.
//! Every transition is guarded on the status it moves from, so the timeout
//! sweep and a completing worker cannot race each other into an invalid
//! state: whichever conditional UPDATE matches first wins, the other
//! affects zero rows.

use meshgen_core::types::{DbId, Timestamp};
use sqlx::{PgExecutor, PgPool};

use crate::models::generation_job::GenerationJob;
use crate::models::status::{JobKind, JobStatus};

/// Column list for `generation_jobs` queries.
const COLUMNS: &str = "\
    id, job_kind_id, entity_id, request_id, user_id, status_id, progress, \
    retry_count, next_retry_at, timeout_at, provider_name, provider_job_id, \
    error_message, started_at, completed_at, failed_at, created_at, updated_at";

/// Provides CRUD operations for queue-tracking job rows.
pub struct GenerationJobRepo;

impl GenerationJobRepo {
    /// Insert a pending job row for a domain entity. Takes any executor so
    /// callers can create jobs inside a transaction.
    pub async fn create(
        executor: impl PgExecutor<'_>,
        kind: JobKind,
        entity_id: DbId,
        request_id: DbId,
        user_id: DbId,
    ) -> Result<GenerationJob, sqlx::Error> {
        let query = format!(
            "INSERT INTO generation_jobs (job_kind_id, entity_id, request_id, user_id, status_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GenerationJob>(&query)
            .bind(kind.id())
            .bind(entity_id)
            .bind(request_id)
            .bind(user_id)
            .bind(JobStatus::Pending.id())
            .fetch_one(executor)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<GenerationJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generation_jobs WHERE id = $1");
        sqlx::query_as::<_, GenerationJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All jobs belonging to a request.
    pub async fn list_by_request(
        pool: &PgPool,
        request_id: DbId,
    ) -> Result<Vec<GenerationJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_jobs WHERE request_id = $1 ORDER BY id"
        );
        sqlx::query_as::<_, GenerationJob>(&query)
            .bind(request_id)
            .fetch_all(pool)
            .await
    }

    /// Transition PENDING/RETRYING → RUNNING at the start of an attempt.
    ///
    /// Sets `started_at`, the execution deadline for the timeout sweep, and
    /// the provider handling this attempt; clears `next_retry_at` (only set
    /// while RETRYING). Returns `false` when the job was not in a runnable
    /// state (already terminal -- e.g. cancelled or swept).
    pub async fn mark_running(
        pool: &PgPool,
        id: DbId,
        provider_name: &str,
        timeout_secs: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_jobs \
             SET status_id = $2, started_at = NOW(), next_retry_at = NULL, \
                 provider_name = $3, \
                 timeout_at = NOW() + make_interval(secs => $4::double precision), \
                 updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($5, $6)",
        )
        .bind(id)
        .bind(JobStatus::Running.id())
        .bind(provider_name)
        .bind(timeout_secs)
        .bind(JobStatus::Pending.id())
        .bind(JobStatus::Retrying.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remember the provider-side job handle for an asynchronous provider.
    pub async fn set_provider_job(
        pool: &PgPool,
        id: DbId,
        provider_job_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generation_jobs SET provider_job_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(provider_job_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Update progress (0-100) while RUNNING.
    pub async fn update_progress(pool: &PgPool, id: DbId, progress: i16) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generation_jobs \
             SET progress = $2, updated_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(progress)
        .bind(JobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Transition RUNNING → COMPLETED.
    pub async fn complete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_jobs \
             SET status_id = $2, progress = 100, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(JobStatus::Completed.id())
        .bind(JobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition RUNNING → RETRYING after a failed attempt with budget left.
    ///
    /// Increments `retry_count` (strictly increasing across the job's life)
    /// and records when the queue will redeliver.
    pub async fn mark_retrying(
        pool: &PgPool,
        id: DbId,
        error: &str,
        next_retry_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generation_jobs \
             SET status_id = $2, retry_count = retry_count + 1, next_retry_at = $3, \
                 error_message = $4, updated_at = NOW() \
             WHERE id = $1 AND status_id = $5",
        )
        .bind(id)
        .bind(JobStatus::Retrying.id())
        .bind(next_retry_at)
        .bind(error)
        .bind(JobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Transition RUNNING → FAILED after the final attempt.
    ///
    /// Does not touch `retry_count`: the terminal attempt is not a retry.
    pub async fn fail(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generation_jobs \
             SET status_id = $2, error_message = $3, next_retry_at = NULL, \
                 failed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(JobStatus::Failed.id())
        .bind(error)
        .bind(JobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Cancel every non-terminal job of a request (delete path).
    pub async fn cancel_for_request(pool: &PgPool, request_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_jobs \
             SET status_id = $2, updated_at = NOW() \
             WHERE request_id = $1 AND status_id NOT IN ($3, $4, $5, $6)",
        )
        .bind(request_id)
        .bind(JobStatus::Cancelled.id())
        .bind(JobStatus::Completed.id())
        .bind(JobStatus::Failed.id())
        .bind(JobStatus::Cancelled.id())
        .bind(JobStatus::Timeout.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Timeout sweep: move RUNNING jobs past their deadline to TIMEOUT.
    ///
    /// The `status_id = RUNNING AND timeout_at < NOW()` guard is what keeps
    /// the sweep from racing a worker that completes the job in the same
    /// window. Returns the swept rows so the caller can fail the owning
    /// domain rows and notify clients.
    pub async fn sweep_timeouts(pool: &PgPool) -> Result<Vec<GenerationJob>, sqlx::Error> {
        let query = format!(
            "UPDATE generation_jobs \
             SET status_id = $1, error_message = $2, failed_at = NOW(), updated_at = NOW() \
             WHERE status_id = $3 AND timeout_at IS NOT NULL AND timeout_at < NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GenerationJob>(&query)
            .bind(JobStatus::Timeout.id())
            .bind("generation timed out")
            .bind(JobStatus::Running.id())
            .fetch_all(pool)
            .await
    }
}
