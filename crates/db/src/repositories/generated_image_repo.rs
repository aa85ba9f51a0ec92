//! Repository for the `generated_images` table.

use meshgen_core::types::DbId;
use sqlx::PgPool;

use crate::models::generated_image::GeneratedImage;
use crate::models::status::{ImageStatus, StatusId};

/// Column list for `generated_images` queries.
const COLUMNS: &str = "\
    id, request_id, image_index, image_status_id, image_url, \
    error_message, created_at, updated_at";

/// Provides CRUD operations for candidate images.
pub struct GeneratedImageRepo;

impl GeneratedImageRepo {
    /// Bulk-insert the N pending candidate rows for a new request, with
    /// indices `0..count`.
    pub async fn create_batch(
        pool: &PgPool,
        request_id: DbId,
        count: i32,
    ) -> Result<Vec<GeneratedImage>, sqlx::Error> {
        let query = format!(
            "INSERT INTO generated_images (request_id, image_index, image_status_id) \
             SELECT $1, idx, $2 FROM generate_series(0, $3 - 1) AS idx \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(request_id)
            .bind(ImageStatus::Pending.id())
            .bind(count)
            .fetch_all(pool)
            .await
    }

    /// Find an image by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<GeneratedImage>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generated_images WHERE id = $1");
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All sibling images for a request, ordered by index.
    pub async fn list_by_request(
        pool: &PgPool,
        request_id: DbId,
    ) -> Result<Vec<GeneratedImage>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generated_images \
             WHERE request_id = $1 ORDER BY image_index"
        );
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(request_id)
            .fetch_all(pool)
            .await
    }

    /// Find one image of a request by its fan-out index.
    pub async fn find_by_index(
        pool: &PgPool,
        request_id: DbId,
        image_index: i32,
    ) -> Result<Option<GeneratedImage>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generated_images \
             WHERE request_id = $1 AND image_index = $2"
        );
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(request_id)
            .bind(image_index)
            .fetch_optional(pool)
            .await
    }

    /// Freshly queried per-sibling completion flags, ordered by index.
    ///
    /// The fan-in check re-derives "all completed" from this snapshot rather
    /// than trusting in-memory counts (sibling completions interleave).
    pub async fn completion_flags(
        pool: &PgPool,
        request_id: DbId,
    ) -> Result<Vec<bool>, sqlx::Error> {
        let statuses: Vec<StatusId> = sqlx::query_scalar(
            "SELECT image_status_id FROM generated_images \
             WHERE request_id = $1 ORDER BY image_index",
        )
        .bind(request_id)
        .fetch_all(pool)
        .await?;
        Ok(statuses
            .into_iter()
            .map(|s| s == ImageStatus::Completed.id())
            .collect())
    }

    /// Transition PENDING → GENERATING.
    pub async fn mark_generating(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generated_images \
             SET image_status_id = $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(ImageStatus::Generating.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Transition to COMPLETED with the stored image URL.
    pub async fn mark_completed(pool: &PgPool, id: DbId, url: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generated_images \
             SET image_status_id = $2, image_url = $3, error_message = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(ImageStatus::Completed.id())
        .bind(url)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Transition to FAILED with a human-readable error.
    pub async fn mark_failed(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generated_images \
             SET image_status_id = $2, error_message = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(ImageStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Non-null image URLs for a request (delete path: keys to reclaim).
    pub async fn stored_urls(pool: &PgPool, request_id: DbId) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT image_url FROM generated_images \
             WHERE request_id = $1 AND image_url IS NOT NULL",
        )
        .bind(request_id)
        .fetch_all(pool)
        .await
    }
}
