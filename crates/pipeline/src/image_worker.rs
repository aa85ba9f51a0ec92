//! Queue handler for the image generation stage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meshgen_core::fanin::all_images_completed;
use meshgen_core::proxy::{ProxyKind, ProxyRewriter};
use meshgen_db::repositories::{GeneratedImageRepo, GenerationJobRepo, GenerationRequestRepo};
use meshgen_db::DbPool;
use meshgen_events::{Broadcast, EventType, TaskEvent};
use meshgen_providers::{ImageProvider, ModelStorage};
use meshgen_queue::{HandlerError, JobDelivery, JobHandler};

use crate::settle::{failure_action, FailureAction};

pub struct ImageWorker {
    pool: DbPool,
    provider: Arc<dyn ImageProvider>,
    storage: Arc<dyn ModelStorage>,
    broadcast: Arc<dyn Broadcast>,
    proxy: ProxyRewriter,
    provider_name: String,
    /// Execution deadline for one attempt; the timeout sweep fires past it.
    timeout: Duration,
    /// Mirrors the queue's backoff so `next_retry_at` matches redelivery.
    backoff_base: Duration,
}

impl ImageWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: DbPool,
        provider: Arc<dyn ImageProvider>,
        storage: Arc<dyn ModelStorage>,
        broadcast: Arc<dyn Broadcast>,
        proxy: ProxyRewriter,
        provider_name: String,
        timeout: Duration,
        backoff_base: Duration,
    ) -> Self {
        Self {
            pool,
            provider,
            storage,
            broadcast,
            proxy,
            provider_name,
            timeout,
            backoff_base,
        }
    }

    /// Persist the failure on both rows, notify, and settle the job as
    /// RETRYING or FAILED. Always returns `Err` so the queue counts the
    /// attempt.
    async fn fail_attempt(
        &self,
        delivery: &JobDelivery,
        image_index: i32,
        error: String,
    ) -> Result<(), HandlerError> {
        let payload = &delivery.payload;
        GeneratedImageRepo::mark_failed(&self.pool, payload.entity_id, &error).await?;
        self.broadcast
            .broadcast(TaskEvent::new(
                payload.request_id,
                EventType::ImageFailed,
                serde_json::json!({
                    "image_index": image_index,
                    "error_message": error,
                }),
            ))
            .await;
        match failure_action(delivery, self.backoff_base, chrono::Utc::now()) {
            FailureAction::Retry { next_retry_at } => {
                GenerationJobRepo::mark_retrying(&self.pool, payload.job_id, &error, next_retry_at)
                    .await?;
            }
            FailureAction::Fail => {
                GenerationJobRepo::fail(&self.pool, payload.job_id, &error).await?;
                GenerationRequestRepo::mark_failed(&self.pool, payload.request_id, &error).await?;
            }
        }
        Err(error.into())
    }
}

#[async_trait]
impl JobHandler for ImageWorker {
    async fn handle(&self, delivery: &JobDelivery) -> Result<(), HandlerError> {
        let payload = &delivery.payload;
        let job = GenerationJobRepo::find_by_id(&self.pool, payload.job_id)
            .await?
            .ok_or_else(|| format!("image job {} not found", payload.job_id))?;
        let image = GeneratedImageRepo::find_by_id(&self.pool, payload.entity_id)
            .await?
            .ok_or_else(|| format!("generated image {} not found", payload.entity_id))?;
        let request = GenerationRequestRepo::find_by_id(&self.pool, payload.request_id)
            .await?
            .ok_or_else(|| format!("generation request {} not found", payload.request_id))?;

        let runnable = GenerationJobRepo::mark_running(
            &self.pool,
            job.id,
            &self.provider_name,
            self.timeout.as_secs() as i64,
        )
        .await?;
        if !runnable {
            tracing::info!(
                job_id = job.id,
                status_id = job.status_id,
                "Image job no longer runnable, dropping delivery"
            );
            return Ok(());
        }

        GeneratedImageRepo::mark_generating(&self.pool, image.id).await?;
        GenerationRequestRepo::mark_image_generating(&self.pool, request.id).await?;
        self.broadcast
            .broadcast(TaskEvent::new(
                request.id,
                EventType::ImageGenerating,
                serde_json::json!({ "image_index": image.image_index }),
            ))
            .await;

        let url = match self.provider.generate_images(&request.prompt, 1).await {
            Ok(urls) if !urls.is_empty() => urls.into_iter().next().unwrap_or_default(),
            Ok(_) => {
                return self
                    .fail_attempt(
                        delivery,
                        image.image_index,
                        "image provider returned no images".to_string(),
                    )
                    .await
            }
            Err(e) => {
                return self
                    .fail_attempt(
                        delivery,
                        image.image_index,
                        format!("image generation failed: {e}"),
                    )
                    .await
            }
        };

        // The provider URL is time-limited (often signed); copy the image
        // into our own bucket before anything durable references it.
        let owned_url = match self
            .storage
            .download_and_upload_image(&url, request.id, image.image_index)
            .await
        {
            Ok(owned_url) => owned_url,
            Err(e) => {
                return self
                    .fail_attempt(
                        delivery,
                        image.image_index,
                        format!("storing generated image failed: {e}"),
                    )
                    .await
            }
        };

        let stored_url = self.proxy.to_proxy_url(&owned_url, ProxyKind::Image);
        // Completing the job first settles the race with the timeout sweep:
        // a swept job keeps the sweep's failure verdict.
        if !GenerationJobRepo::complete(&self.pool, job.id).await? {
            tracing::warn!(job_id = job.id, "Image job swept before completion, discarding result");
            return Ok(());
        }
        GeneratedImageRepo::mark_completed(&self.pool, image.id, &stored_url).await?;
        self.broadcast
            .broadcast(TaskEvent::new(
                request.id,
                EventType::ImageCompleted,
                serde_json::json!({
                    "image_index": image.image_index,
                    "image_url": stored_url,
                }),
            ))
            .await;

        // Fan-in join: re-derive completion from a fresh sibling snapshot;
        // the guarded phase transition makes exactly one completer win.
        let flags = GeneratedImageRepo::completion_flags(&self.pool, request.id).await?;
        if all_images_completed(&flags)
            && GenerationRequestRepo::mark_awaiting_selection(&self.pool, request.id).await?
        {
            tracing::info!(request_id = request.id, "All images completed, awaiting selection");
            self.broadcast
                .broadcast(TaskEvent::new(
                    request.id,
                    EventType::TaskUpdated,
                    serde_json::json!({
                        "request_id": request.id,
                        "phase": "awaiting_selection",
                    }),
                ))
                .await;
        }
        Ok(())
    }
}
