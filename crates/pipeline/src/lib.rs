//! Generation pipeline: orchestration, stage workers, and sweeps.
//!
//! A request fans out into N image jobs, joins on the user's selection,
//! and fans back in through a single model job. The orchestrator creates
//! rows and enqueues; the workers own every other state transition.

pub mod error;
pub mod image_worker;
pub mod model_worker;
pub mod orchestrator;
pub mod poll;
mod settle;
pub mod sweep;

pub use error::PipelineError;
pub use image_worker::ImageWorker;
pub use model_worker::ModelWorker;
pub use orchestrator::{Orchestrator, RequestDetail};
pub use sweep::{OrphanSweeper, TimeoutSweeper};
