//! Repository for the `models` table.

use meshgen_core::types::DbId;
use sqlx::{PgExecutor, PgPool};

use crate::models::model::{Model, ModelResultUrls};
use crate::models::status::{ModelVisibility, SliceStatus};

/// Column list for `models` queries.
const COLUMNS: &str = "\
    id, request_id, format, model_url, mtl_url, texture_url, \
    preview_image_url, visibility_id, slice_task_id, slice_status_id, \
    gcode_url, error_message, completed_at, failed_at, created_at, updated_at";

/// Provides CRUD operations for generated 3D models.
pub struct ModelRepo;

impl ModelRepo {
    /// Insert the model row created at image-selection time. Takes any
    /// executor so selection can create it inside a transaction.
    pub async fn create(
        executor: impl PgExecutor<'_>,
        request_id: DbId,
        format: &str,
    ) -> Result<Model, sqlx::Error> {
        let query = format!(
            "INSERT INTO models (request_id, format, visibility_id, slice_status_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Model>(&query)
            .bind(request_id)
            .bind(format)
            .bind(ModelVisibility::Private.id())
            .bind(SliceStatus::NotSliced.id())
            .fetch_one(executor)
            .await
    }

    /// Find a model by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Model>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM models WHERE id = $1");
        sqlx::query_as::<_, Model>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find the model belonging to a request (1:1 once selection occurred).
    pub async fn find_by_request(
        pool: &PgPool,
        request_id: DbId,
    ) -> Result<Option<Model>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM models WHERE request_id = $1");
        sqlx::query_as::<_, Model>(&query)
            .bind(request_id)
            .fetch_optional(pool)
            .await
    }

    /// Persist result URLs and mark the model completed.
    ///
    /// Clears `failed_at`/`error_message` so the completed/failed exclusivity
    /// invariant holds even when a retry succeeds after a failed attempt.
    pub async fn mark_completed(
        pool: &PgPool,
        id: DbId,
        urls: &ModelResultUrls,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE models \
             SET model_url = $2, mtl_url = $3, texture_url = $4, preview_image_url = $5, \
                 completed_at = NOW(), failed_at = NULL, error_message = NULL, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&urls.model_url)
        .bind(&urls.mtl_url)
        .bind(&urls.texture_url)
        .bind(&urls.preview_image_url)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a failed generation attempt.
    pub async fn mark_failed(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE models \
             SET failed_at = NOW(), error_message = $2, updated_at = NOW() \
             WHERE id = $1 AND completed_at IS NULL",
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// All stored object URLs for a request's model (delete path).
    pub async fn stored_urls(pool: &PgPool, request_id: DbId) -> Result<Vec<String>, sqlx::Error> {
        let row: Option<Model> = Self::find_by_request(pool, request_id).await?;
        let Some(model) = row else {
            return Ok(Vec::new());
        };
        Ok([
            model.model_url,
            model.mtl_url,
            model.texture_url,
            model.preview_image_url,
            model.gcode_url,
        ]
        .into_iter()
        .flatten()
        .collect())
    }
}
