//! Queue-tracking job rows, one per enqueued unit of background work.

use meshgen_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `generation_jobs` table.
///
/// `job_kind` discriminates image jobs (entity_id → generated_images) from
/// model jobs (entity_id → models). Distinct from the domain entity it
/// operates on: the job row tracks queue bookkeeping only.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GenerationJob {
    pub id: DbId,
    pub job_kind_id: StatusId,
    pub entity_id: DbId,
    pub request_id: DbId,
    pub user_id: DbId,
    pub status_id: StatusId,
    pub progress: i16,
    pub retry_count: i32,
    pub next_retry_at: Option<Timestamp>,
    pub timeout_at: Option<Timestamp>,
    pub provider_name: Option<String>,
    pub provider_job_id: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub failed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
