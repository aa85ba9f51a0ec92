//! Generation request routes.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use meshgen_core::types::DbId;
use meshgen_db::models::{CreateGenerationRequest, GenerationRequest, Model, SelectImage};
use meshgen_pipeline::RequestDetail;

use crate::error::{AppError, AppResult};
use crate::sse;
use crate::state::AppState;

/// Session handling lives at the gateway; it forwards the authenticated
/// user in this header. Local development falls back to user 1.
const USER_ID_HEADER: &str = "x-user-id";
const DEV_USER_ID: DbId = 1;

fn current_user(headers: &HeaderMap) -> AppResult<DbId> {
    match headers.get(USER_ID_HEADER) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| AppError::BadRequest(format!("invalid {USER_ID_HEADER} header"))),
        None => Ok(DEV_USER_ID),
    }
}

/// POST /api/v1/requests -- create a request and start image fan-out.
async fn create_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateGenerationRequest>,
) -> AppResult<(StatusCode, Json<GenerationRequest>)> {
    let user_id = current_user(&headers)?;
    let request = state
        .orchestrator
        .create_request(user_id, &body.prompt, body.image_count)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /api/v1/requests/{id} -- full request state.
async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<RequestDetail>> {
    Ok(Json(state.orchestrator.request_detail(id).await?))
}

/// POST /api/v1/requests/{id}/select -- pick an image, start the model stage.
async fn select_image(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(body): Json<SelectImage>,
) -> AppResult<(StatusCode, Json<Model>)> {
    let model = state
        .orchestrator
        .select_image(id, body.image_index)
        .await?;
    Ok((StatusCode::CREATED, Json(model)))
}

/// DELETE /api/v1/requests/{id}
async fn delete_request(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    state.orchestrator.delete_request(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Mount under `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/requests", post(create_request))
        .route("/requests/{id}", get(get_request).delete(delete_request))
        .route("/requests/{id}/select", post(select_image))
        .route("/requests/{id}/events", get(sse::handler::task_events))
}
