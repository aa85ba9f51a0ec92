//! Orphaned storage objects awaiting deletion.

use meshgen_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `orphaned_files` table: an object-storage key whose owning
/// domain row was deleted before the object itself could be removed.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrphanedFile {
    pub id: DbId,
    pub s3_key: String,
    pub request_id: Option<DbId>,
    pub status_id: StatusId,
    pub retry_count: i32,
    pub last_retry_at: Option<Timestamp>,
    pub created_at: Timestamp,
}
