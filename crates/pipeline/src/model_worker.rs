//! Queue handler for the model generation stage.
//!
//! Submits the selected image to the asynchronous 3D provider, polls until
//! terminal, then copies the result bundle into our own storage. Every URL
//! placed in an event or on the model row is in proxied form.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meshgen_core::poll::PollPolicy;
use meshgen_core::proxy::{ProxyKind, ProxyRewriter};
use meshgen_db::models::ModelResultUrls;
use meshgen_db::repositories::{
    GeneratedImageRepo, GenerationJobRepo, GenerationRequestRepo, ModelRepo,
};
use meshgen_db::DbPool;
use meshgen_events::{Broadcast, EventType, TaskEvent};
use meshgen_providers::{ModelProvider, ModelStorage};
use meshgen_queue::{HandlerError, JobDelivery, JobHandler};

use crate::poll::{poll_model_task, PollOutcome};
use crate::settle::{failure_action, FailureAction};

pub struct ModelWorker {
    pool: DbPool,
    provider: Arc<dyn ModelProvider>,
    storage: Arc<dyn ModelStorage>,
    broadcast: Arc<dyn Broadcast>,
    proxy: ProxyRewriter,
    policy: PollPolicy,
    provider_name: String,
    /// Public base of this deployment, used to turn proxied image paths
    /// back into URLs the provider can fetch.
    public_base_url: String,
    backoff_base: Duration,
}

impl ModelWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: DbPool,
        provider: Arc<dyn ModelProvider>,
        storage: Arc<dyn ModelStorage>,
        broadcast: Arc<dyn Broadcast>,
        proxy: ProxyRewriter,
        policy: PollPolicy,
        provider_name: String,
        public_base_url: String,
        backoff_base: Duration,
    ) -> Self {
        Self {
            pool,
            provider,
            storage,
            broadcast,
            proxy,
            policy,
            provider_name,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            backoff_base,
        }
    }

    fn resolvable_url(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{url}", self.public_base_url)
        } else {
            url.to_string()
        }
    }

    /// Persist the failure, notify, and settle the job. The request is only
    /// failed once the attempt budget is spent; earlier attempts leave it
    /// in ModelGenerating for the retry.
    async fn fail_attempt(&self, delivery: &JobDelivery, error: String) -> Result<(), HandlerError> {
        let payload = &delivery.payload;
        ModelRepo::mark_failed(&self.pool, payload.entity_id, &error).await?;
        self.broadcast
            .broadcast(TaskEvent::new(
                payload.request_id,
                EventType::ModelFailed,
                serde_json::json!({ "error_message": error }),
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
impl JobHandler for ModelWorker {
    async fn handle(&self, delivery: &JobDelivery) -> Result<(), HandlerError> {
        let payload = &delivery.payload;
        let job = GenerationJobRepo::find_by_id(&self.pool, payload.job_id)
            .await?
            .ok_or_else(|| format!("model job {} not found", payload.job_id))?;
        let model = ModelRepo::find_by_id(&self.pool, payload.entity_id)
            .await?
            .ok_or_else(|| format!("model {} not found", payload.entity_id))?;
        let request = GenerationRequestRepo::find_by_id(&self.pool, payload.request_id)
            .await?
            .ok_or_else(|| format!("generation request {} not found", payload.request_id))?;
        let selected_index = request
            .selected_image_index
            .ok_or_else(|| format!("request {} has no selected image", request.id))?;
        let image = GeneratedImageRepo::find_by_index(&self.pool, request.id, selected_index)
            .await?
            .ok_or_else(|| format!("request {} image {selected_index} not found", request.id))?;
        let image_url = image
            .image_url
            .ok_or_else(|| format!("selected image {} has no stored URL", image.id))?;

        // The poll budget is the attempt's real duration; give the sweep
        // deadline headroom beyond it so the sweep only catches hangs.
        let timeout_secs =
            (self.policy.interval.as_secs() * u64::from(self.policy.max_attempts) + 120) as i64;
        let runnable =
            GenerationJobRepo::mark_running(&self.pool, job.id, &self.provider_name, timeout_secs)
                .await?;
        if !runnable {
            tracing::info!(
                job_id = job.id,
                status_id = job.status_id,
                "Model job no longer runnable, dropping delivery"
            );
            return Ok(());
        }

        GenerationRequestRepo::mark_model_generating(&self.pool, request.id).await?;
        self.broadcast
            .broadcast(TaskEvent::new(
                request.id,
                EventType::ModelGenerating,
                serde_json::json!({ "model_id": model.id }),
            ))
            .await;

        let submit_url = self.resolvable_url(&image_url);
        let provider_job_id = match self.provider.submit(&submit_url).await {
            Ok(id) => id,
            Err(e) => {
                return self
                    .fail_attempt(delivery, format!("model submission failed: {e}"))
                    .await
            }
        };
        GenerationJobRepo::set_provider_job(&self.pool, job.id, &provider_job_id).await?;
        tracing::info!(
            job_id = job.id,
            model_id = model.id,
            provider_job_id = %provider_job_id,
            "Model task submitted"
        );

        let outcome = poll_model_task(
            self.provider.as_ref(),
            &self.policy,
            &provider_job_id,
            |_attempt, progress| {
                let pool = self.pool.clone();
                let broadcast = self.broadcast.clone();
                let job_id = job.id;
                let task_id = request.id;
                async move {
                    if let Err(e) = GenerationJobRepo::update_progress(&pool, job_id, progress).await
                    {
                        tracing::warn!(job_id, error = %e, "Failed to persist progress");
                    }
                    broadcast
                        .broadcast(TaskEvent::new(
                            task_id,
                            EventType::ModelProgress,
                            serde_json::json!({ "progress": progress }),
                        ))
                        .await;
                }
            },
        )
        .await;

        let status = match outcome {
            Ok(PollOutcome::Done(status)) => status,
            Ok(PollOutcome::Failed { message, code }) => {
                let error = match code {
                    Some(code) => format!("model generation failed ({code}): {message}"),
                    None => format!("model generation failed: {message}"),
                };
                return self.fail_attempt(delivery, error).await;
            }
            Ok(PollOutcome::BudgetExhausted) => {
                return self
                    .fail_attempt(
                        delivery,
                        "model generation timed out waiting for provider".to_string(),
                    )
                    .await
            }
            Err(e) => {
                return self
                    .fail_attempt(delivery, format!("model status query failed: {e}"))
                    .await
            }
        };

        let Some(file) = status.result_files.into_iter().next() else {
            return self
                .fail_attempt(delivery, "provider returned no result files".to_string())
                .await;
        };

        let assets = match self
            .storage
            .download_and_upload_model(&file.url, model.id, &model.format)
            .await
        {
            Ok(assets) => assets,
            Err(e) => {
                return self
                    .fail_attempt(delivery, format!("storing model result failed: {e}"))
                    .await
            }
        };
        let preview_url = match &file.preview_image_url {
            Some(url) => match self
                .storage
                .download_and_upload_preview_image(url, model.id)
                .await
            {
                Ok(url) => Some(url),
                Err(e) => {
                    return self
                        .fail_attempt(delivery, format!("storing preview image failed: {e}"))
                        .await
                }
            },
            None => None,
        };

        let urls = ModelResultUrls {
            model_url: self.proxy.to_proxy_url(&assets.model_url, ProxyKind::Model),
            mtl_url: assets
                .mtl_url
                .as_deref()
                .map(|u| self.proxy.to_proxy_url(u, ProxyKind::Model)),
            texture_url: assets
                .texture_url
                .as_deref()
                .map(|u| self.proxy.to_proxy_url(u, ProxyKind::Model)),
            preview_image_url: preview_url
                .as_deref()
                .map(|u| self.proxy.to_proxy_url(u, ProxyKind::Preview)),
        };

        // Completing the job first settles the race with the timeout sweep:
        // if the sweep already moved the job to TIMEOUT, its verdict stands
        // and the domain rows keep the sweep's failure.
        if !GenerationJobRepo::complete(&self.pool, job.id).await? {
            tracing::warn!(job_id = job.id, "Model job swept before completion, discarding result");
            return Ok(());
        }
        ModelRepo::mark_completed(&self.pool, model.id, &urls).await?;
        GenerationRequestRepo::mark_completed(&self.pool, request.id).await?;
        tracing::info!(job_id = job.id, model_id = model.id, "Model generation completed");
        self.broadcast
            .broadcast(TaskEvent::new(
                request.id,
                EventType::ModelCompleted,
                serde_json::json!({
                    "model_id": model.id,
                    "model_url": urls.model_url,
                    "mtl_url": urls.mtl_url,
                    "texture_url": urls.texture_url,
                    "preview_image_url": urls.preview_image_url,
                }),
            ))
            .await;
        Ok(())
    }
}
