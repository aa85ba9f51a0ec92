use meshgen_core::error::CoreError;
use meshgen_queue::QueueError;
use thiserror::Error;

/// Errors surfaced by orchestration entry points.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}
