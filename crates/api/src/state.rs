use std::sync::Arc;

use meshgen_db::DbPool;
use meshgen_pipeline::Orchestrator;
use meshgen_queue::JobQueue;

use crate::sse::ConnectionRegistry;

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub registry: Arc<ConnectionRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub image_queue: JobQueue,
    pub model_queue: JobQueue,
}
