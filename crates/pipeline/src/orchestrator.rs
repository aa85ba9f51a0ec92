//! Request-level orchestration: fan-out, selection, deletion.
//!
//! These are the API-facing entry points of the pipeline. Workers own all
//! other state transitions; the orchestrator only creates rows, enqueues
//! work, and records the user's selection.

use std::sync::Arc;

use meshgen_core::error::CoreError;
use meshgen_core::proxy::ProxyRewriter;
use meshgen_core::types::DbId;
use meshgen_db::models::{GeneratedImage, GenerationJob, GenerationRequest, Model};
use meshgen_db::models::status::{ImageStatus, JobKind};
use meshgen_db::repositories::{
    GeneratedImageRepo, GenerationJobRepo, GenerationRequestRepo, ModelRepo, OrphanedFileRepo,
};
use meshgen_db::DbPool;
use meshgen_events::{Broadcast, EventType, TaskEvent};
use meshgen_providers::ModelStorage;
use meshgen_queue::{JobPayload, JobQueue};
use serde::Serialize;

use crate::error::PipelineError;

/// Candidate images generated when the caller does not say how many.
const DEFAULT_IMAGE_COUNT: i32 = 4;
const MAX_IMAGE_COUNT: i32 = 8;
/// Output format requested from the model provider.
const DEFAULT_MODEL_FORMAT: &str = "obj";

/// Everything a client needs to render one request's current state.
#[derive(Debug, Serialize)]
pub struct RequestDetail {
    pub request: GenerationRequest,
    pub images: Vec<GeneratedImage>,
    pub model: Option<Model>,
    pub jobs: Vec<GenerationJob>,
}

pub struct Orchestrator {
    pool: DbPool,
    image_queue: JobQueue,
    model_queue: JobQueue,
    broadcast: Arc<dyn Broadcast>,
    storage: Arc<dyn ModelStorage>,
    proxy: ProxyRewriter,
}

impl Orchestrator {
    pub fn new(
        pool: DbPool,
        image_queue: JobQueue,
        model_queue: JobQueue,
        broadcast: Arc<dyn Broadcast>,
        storage: Arc<dyn ModelStorage>,
        proxy: ProxyRewriter,
    ) -> Self {
        Self {
            pool,
            image_queue,
            model_queue,
            broadcast,
            storage,
            proxy,
        }
    }

    /// Create a request and fan out one image job per candidate.
    pub async fn create_request(
        &self,
        user_id: DbId,
        prompt: &str,
        image_count: Option<i32>,
    ) -> Result<GenerationRequest, PipelineError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(CoreError::Validation("prompt must not be empty".into()).into());
        }
        let image_count = image_count.unwrap_or(DEFAULT_IMAGE_COUNT);
        if !(1..=MAX_IMAGE_COUNT).contains(&image_count) {
            return Err(CoreError::Validation(format!(
                "image_count must be between 1 and {MAX_IMAGE_COUNT}"
            ))
            .into());
        }

        let request =
            GenerationRequestRepo::create(&self.pool, user_id, prompt, image_count).await?;
        let images = GeneratedImageRepo::create_batch(&self.pool, request.id, image_count).await?;
        for image in &images {
            let job = GenerationJobRepo::create(
                &self.pool,
                JobKind::Image,
                image.id,
                request.id,
                user_id,
            )
            .await?;
            self.image_queue
                .enqueue(JobPayload {
                    job_id: job.id,
                    entity_id: image.id,
                    request_id: request.id,
                    user_id,
                })
                .await?;
        }
        tracing::info!(
            request_id = request.id,
            user_id,
            image_count,
            "Created generation request"
        );
        self.broadcast
            .broadcast(TaskEvent::new(
                request.id,
                EventType::TaskInit,
                serde_json::json!({
                    "request_id": request.id,
                    "image_count": image_count,
                    "status": "image_pending",
                }),
            ))
            .await;
        Ok(request)
    }

    /// Record the user's pick and enqueue the model stage.
    pub async fn select_image(
        &self,
        request_id: DbId,
        image_index: i32,
    ) -> Result<Model, PipelineError> {
        let request = GenerationRequestRepo::find_by_id(&self.pool, request_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "generation request",
                id: request_id,
            })?;
        let image = GeneratedImageRepo::find_by_index(&self.pool, request_id, image_index)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "generated image",
                id: request_id,
            })?;
        if image.image_status_id != ImageStatus::Completed.id() {
            return Err(
                CoreError::Validation("selected image has not completed".into()).into(),
            );
        }

        // Selection, model row, and model job land atomically: a failed
        // insert rolls the phase back so the request never sits in
        // ModelGeneration without a model. The phase guard makes a
        // double-select lose cleanly.
        let mut tx = self.pool.begin().await?;
        let advanced =
            GenerationRequestRepo::record_selection(&mut *tx, request_id, image_index).await?;
        if !advanced {
            return Err(
                CoreError::Conflict("request is not awaiting image selection".into()).into(),
            );
        }

        let model = ModelRepo::create(&mut *tx, request_id, DEFAULT_MODEL_FORMAT).await?;
        let job = GenerationJobRepo::create(
            &mut *tx,
            JobKind::Model,
            model.id,
            request_id,
            request.user_id,
        )
        .await?;
        tx.commit().await?;

        self.model_queue
            .enqueue(JobPayload {
                job_id: job.id,
                entity_id: model.id,
                request_id,
                user_id: request.user_id,
            })
            .await?;
        tracing::info!(request_id, image_index, model_id = model.id, "Image selected");
        self.broadcast
            .broadcast(TaskEvent::new(
                request_id,
                EventType::TaskUpdated,
                serde_json::json!({
                    "request_id": request_id,
                    "phase": "model_generation",
                    "selected_image_index": image_index,
                }),
            ))
            .await;
        Ok(model)
    }

    /// Current state of a request: images, model, jobs.
    pub async fn request_detail(&self, request_id: DbId) -> Result<RequestDetail, PipelineError> {
        let request = GenerationRequestRepo::find_by_id(&self.pool, request_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "generation request",
                id: request_id,
            })?;
        let images = GeneratedImageRepo::list_by_request(&self.pool, request_id).await?;
        let model = ModelRepo::find_by_request(&self.pool, request_id).await?;
        let jobs = GenerationJobRepo::list_by_request(&self.pool, request_id).await?;
        Ok(RequestDetail {
            request,
            images,
            model,
            jobs,
        })
    }

    /// Delete a request and reclaim its stored objects.
    ///
    /// Rows go first (jobs cancelled, cascade delete), then object deletion
    /// is attempted per key; keys that fail become `orphaned_files` rows so
    /// the orphan sweep retries them instead of leaking the object.
    pub async fn delete_request(&self, request_id: DbId) -> Result<(), PipelineError> {
        GenerationRequestRepo::find_by_id(&self.pool, request_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "generation request",
                id: request_id,
            })?;

        let cancelled = GenerationJobRepo::cancel_for_request(&self.pool, request_id).await?;
        let mut urls = GeneratedImageRepo::stored_urls(&self.pool, request_id).await?;
        urls.extend(ModelRepo::stored_urls(&self.pool, request_id).await?);
        let keys: Vec<String> = urls
            .iter()
            .filter_map(|url| self.proxy.object_key(url))
            .collect();

        GenerationRequestRepo::delete(&self.pool, request_id).await?;

        let mut orphaned = 0usize;
        for key in &keys {
            if let Err(e) = self.storage.delete_object(key).await {
                tracing::warn!(request_id, key = %key, error = %e, "Storage delete failed, recording orphan");
                OrphanedFileRepo::create(&self.pool, key, None).await?;
                orphaned += 1;
            }
        }
        tracing::info!(
            request_id,
            cancelled_jobs = cancelled,
            objects = keys.len(),
            orphaned,
            "Deleted generation request"
        );
        Ok(())
    }
}
