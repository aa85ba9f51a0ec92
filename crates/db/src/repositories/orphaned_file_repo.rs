//! Repository for the `orphaned_files` table.

use meshgen_core::types::DbId;
use sqlx::PgPool;

use crate::models::orphaned_file::OrphanedFile;
use crate::models::status::OrphanStatus;

/// Column list for `orphaned_files` queries.
const COLUMNS: &str = "\
    id, s3_key, request_id, status_id, retry_count, last_retry_at, created_at";

/// Provides CRUD operations for orphaned storage objects.
pub struct OrphanedFileRepo;

impl OrphanedFileRepo {
    /// Record a storage key whose owning row is gone but whose object could
    /// not be deleted synchronously.
    pub async fn create(
        pool: &PgPool,
        s3_key: &str,
        request_id: Option<DbId>,
    ) -> Result<OrphanedFile, sqlx::Error> {
        let query = format!(
            "INSERT INTO orphaned_files (s3_key, request_id, status_id) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OrphanedFile>(&query)
            .bind(s3_key)
            .bind(request_id)
            .bind(OrphanStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// Pending rows still under the retry ceiling, oldest first.
    pub async fn list_pending(
        pool: &PgPool,
        max_retries: i32,
        limit: i64,
    ) -> Result<Vec<OrphanedFile>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM orphaned_files \
             WHERE status_id = $1 AND retry_count < $2 \
             ORDER BY created_at LIMIT $3"
        );
        sqlx::query_as::<_, OrphanedFile>(&query)
            .bind(OrphanStatus::Pending.id())
            .bind(max_retries)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Pending rows that exhausted their retries. Never deleted silently;
    /// the sweep surfaces these for manual alerting on every pass.
    pub async fn list_exhausted(
        pool: &PgPool,
        max_retries: i32,
    ) -> Result<Vec<OrphanedFile>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM orphaned_files \
             WHERE status_id = $1 AND retry_count >= $2 \
             ORDER BY created_at"
        );
        sqlx::query_as::<_, OrphanedFile>(&query)
            .bind(OrphanStatus::Pending.id())
            .bind(max_retries)
            .fetch_all(pool)
            .await
    }

    /// The underlying object is confirmed gone.
    pub async fn mark_deleted(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE orphaned_files SET status_id = $2 WHERE id = $1")
            .bind(id)
            .bind(OrphanStatus::Deleted.id())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// A deletion attempt failed; count it and remember when.
    pub async fn bump_retry(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE orphaned_files \
             SET retry_count = retry_count + 1, last_retry_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
