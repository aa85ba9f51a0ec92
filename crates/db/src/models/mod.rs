//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row, plus any `Deserialize` DTOs the routes accept.

pub mod generated_image;
pub mod generation_job;
pub mod generation_request;
pub mod model;
pub mod orphaned_file;
pub mod status;

pub use generated_image::GeneratedImage;
pub use generation_job::GenerationJob;
pub use generation_request::{CreateGenerationRequest, GenerationRequest, SelectImage};
pub use model::{Model, ModelResultUrls};
pub use orphaned_file::OrphanedFile;
