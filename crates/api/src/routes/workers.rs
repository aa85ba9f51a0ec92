//! Queue diagnostics.

use axum::extract::State;
use axum::{routing::get, Json, Router};
use meshgen_queue::QueueCounts;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct WorkersStatusResponse {
    pub image_generation: QueueStatus,
    pub model_generation: QueueStatus,
}

#[derive(Serialize)]
pub struct QueueStatus {
    /// Ready plus delayed deliveries.
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

impl From<QueueCounts> for QueueStatus {
    fn from(counts: QueueCounts) -> Self {
        Self {
            waiting: counts.ready + counts.delayed,
            active: counts.active,
            completed: counts.completed,
            failed: counts.failed,
        }
    }
}

/// GET /api/workers/status -- per-queue depth counts.
async fn workers_status(State(state): State<AppState>) -> AppResult<Json<WorkersStatusResponse>> {
    let image = state
        .image_queue
        .counts()
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let model = state
        .model_queue
        .counts()
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    Ok(Json(WorkersStatusResponse {
        image_generation: image.into(),
        model_generation: model.into(),
    }))
}

/// Mount at root level (the path is `/api/workers/status`, outside `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/api/workers/status", get(workers_status))
}
