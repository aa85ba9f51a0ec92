//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod generated_image_repo;
pub mod generation_job_repo;
pub mod generation_request_repo;
pub mod model_repo;
pub mod orphaned_file_repo;

pub use generated_image_repo::GeneratedImageRepo;
pub use generation_job_repo::GenerationJobRepo;
pub use generation_request_repo::GenerationRequestRepo;
pub use model_repo::ModelRepo;
pub use orphaned_file_repo::OrphanedFileRepo;
