//! Candidate image entity: one of N images fanned out per request.

use meshgen_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `generated_images` table.
///
/// `(request_id, image_index)` is unique; `image_url` is null until the
/// image worker completes the row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GeneratedImage {
    pub id: DbId,
    pub request_id: DbId,
    pub image_index: i32,
    pub image_status_id: StatusId,
    pub image_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
