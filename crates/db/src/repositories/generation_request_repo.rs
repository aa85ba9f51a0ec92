//! Repository for the `generation_requests` table.
//!
//! Phase transitions are guarded in SQL: every transition names the phase it
//! moves from, so replayed or interleaved workers cannot move a request
//! backwards.

use meshgen_core::types::DbId;
use sqlx::{PgExecutor, PgPool};

use crate::models::generation_request::GenerationRequest;
use crate::models::status::{RequestPhase, RequestStatus};

/// Column list for `generation_requests` queries.
const COLUMNS: &str = "\
    id, user_id, prompt, status_id, phase_id, image_count, \
    selected_image_index, error_message, created_at, updated_at";

/// Statuses a starting image job may move to ImageGenerating from. A
/// terminal status (a sibling already failed the request) must stay put.
const IMAGE_GENERATING_SOURCES: [RequestStatus; 2] =
    [RequestStatus::ImagePending, RequestStatus::ImageGenerating];

/// Statuses a starting model job may move to ModelGenerating from.
const MODEL_GENERATING_SOURCES: [RequestStatus; 2] =
    [RequestStatus::ModelPending, RequestStatus::ModelGenerating];

/// Provides CRUD operations for generation requests.
pub struct GenerationRequestRepo;

impl GenerationRequestRepo {
    /// Insert a new request in phase ImageGeneration / status ImagePending.
    pub async fn create(
        pool: &PgPool,
        user_id: DbId,
        prompt: &str,
        image_count: i32,
    ) -> Result<GenerationRequest, sqlx::Error> {
        let query = format!(
            "INSERT INTO generation_requests (user_id, prompt, status_id, phase_id, image_count) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GenerationRequest>(&query)
            .bind(user_id)
            .bind(prompt)
            .bind(RequestStatus::ImagePending.id())
            .bind(RequestPhase::ImageGeneration.id())
            .bind(image_count)
            .fetch_one(pool)
            .await
    }

    /// Find a request by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<GenerationRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generation_requests WHERE id = $1");
        sqlx::query_as::<_, GenerationRequest>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's requests, newest first.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: DbId,
        limit: i64,
    ) -> Result<Vec<GenerationRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_requests \
             WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2"
        );
        sqlx::query_as::<_, GenerationRequest>(&query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Mark the request as actively generating images. Guarded on both the
    /// phase and a non-terminal status: a sibling job starting after another
    /// already failed the request must not bring it back to life.
    pub async fn mark_image_generating(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generation_requests \
             SET status_id = $2, updated_at = NOW() \
             WHERE id = $1 AND phase_id = $3 AND status_id IN ($4, $5)",
        )
        .bind(id)
        .bind(RequestStatus::ImageGenerating.id())
        .bind(RequestPhase::ImageGeneration.id())
        .bind(IMAGE_GENERATING_SOURCES[0].id())
        .bind(IMAGE_GENERATING_SOURCES[1].id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Fan-in join: advance to AwaitingSelection, but only while the request
    /// is still in the image-generation phase. Returns `true` when this call
    /// performed the transition (exactly one sibling completion wins).
    pub async fn mark_awaiting_selection(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_requests \
             SET status_id = $2, phase_id = $3, updated_at = NOW() \
             WHERE id = $1 AND phase_id = $4",
        )
        .bind(id)
        .bind(RequestStatus::AwaitingSelection.id())
        .bind(RequestPhase::AwaitingSelection.id())
        .bind(RequestPhase::ImageGeneration.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the user's image selection and advance to ModelGeneration.
    ///
    /// Guarded on phase AwaitingSelection; returns `false` if the request
    /// was not awaiting a selection (double-select, wrong phase). Takes any
    /// executor so the orchestrator can run it in the selection transaction.
    pub async fn record_selection(
        executor: impl PgExecutor<'_>,
        id: DbId,
        image_index: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_requests \
             SET selected_image_index = $2, status_id = $3, phase_id = $4, updated_at = NOW() \
             WHERE id = $1 AND phase_id = $5",
        )
        .bind(id)
        .bind(image_index)
        .bind(RequestStatus::ModelPending.id())
        .bind(RequestPhase::ModelGeneration.id())
        .bind(RequestPhase::AwaitingSelection.id())
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark the model stage as actively generating. Same status guard as
    /// the image transition.
    pub async fn mark_model_generating(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generation_requests \
             SET status_id = $2, updated_at = NOW() \
             WHERE id = $1 AND phase_id = $3 AND status_id IN ($4, $5)",
        )
        .bind(id)
        .bind(RequestStatus::ModelGenerating.id())
        .bind(RequestPhase::ModelGeneration.id())
        .bind(MODEL_GENERATING_SOURCES[0].id())
        .bind(MODEL_GENERATING_SOURCES[1].id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Terminal success: phase Completed / status Completed.
    pub async fn mark_completed(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generation_requests \
             SET status_id = $2, phase_id = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(RequestStatus::Completed.id())
        .bind(RequestPhase::Completed.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Terminal failure: record the error without moving the phase, so the
    /// failed stage remains visible.
    pub async fn mark_failed(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generation_requests \
             SET status_id = $2, error_message = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(RequestStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete a request. Images, model, and jobs cascade.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM generation_requests WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generating_transitions_start_only_from_live_statuses() {
        let terminal = [
            RequestStatus::Completed,
            RequestStatus::Failed,
            RequestStatus::Cancelled,
        ];
        for status in terminal {
            assert!(!IMAGE_GENERATING_SOURCES.contains(&status));
            assert!(!MODEL_GENERATING_SOURCES.contains(&status));
        }
    }
}
