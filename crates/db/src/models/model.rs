//! 3D model entity: the single model produced per request after selection.

use meshgen_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `models` table (1:1 with a generation request once image
/// selection occurs).
///
/// Invariants: `completed_at` and `failed_at` are never both set;
/// `model_url` is non-null iff `completed_at` is set.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Model {
    pub id: DbId,
    pub request_id: DbId,
    pub format: String,
    pub model_url: Option<String>,
    pub mtl_url: Option<String>,
    pub texture_url: Option<String>,
    pub preview_image_url: Option<String>,
    pub visibility_id: StatusId,
    pub slice_task_id: Option<String>,
    pub slice_status_id: StatusId,
    pub gcode_url: Option<String>,
    pub error_message: Option<String>,
    pub completed_at: Option<Timestamp>,
    pub failed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Result URLs persisted when a model generation succeeds.
#[derive(Debug, Clone)]
pub struct ModelResultUrls {
    pub model_url: String,
    pub mtl_url: Option<String>,
    pub texture_url: Option<String>,
    pub preview_image_url: Option<String>,
}
