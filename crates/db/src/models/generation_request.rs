//! Generation request entity: the root aggregate for one pipeline run.

use meshgen_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `generation_requests` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GenerationRequest {
    pub id: DbId,
    pub user_id: DbId,
    pub prompt: String,
    pub status_id: StatusId,
    pub phase_id: StatusId,
    pub image_count: i32,
    pub selected_image_index: Option<i32>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for `POST /api/v1/requests`.
#[derive(Debug, Deserialize)]
pub struct CreateGenerationRequest {
    pub prompt: String,
    /// Number of candidate images to fan out. Defaults to 4.
    pub image_count: Option<i32>,
}

/// DTO for `POST /api/v1/requests/{id}/select`.
#[derive(Debug, Deserialize)]
pub struct SelectImage {
    pub image_index: i32,
}
