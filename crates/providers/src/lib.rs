//! External collaborator contracts and their HTTP/S3 implementations.
//!
//! Workers depend only on the traits here; the concrete clients are wired
//! up by the worker binary from environment configuration.

pub mod error;
pub mod image;
pub mod model3d;
pub mod storage;

pub use error::ProviderError;
pub use image::{HttpImageProvider, ImageProvider};
pub use model3d::{HttpModelProvider, ModelProvider, ModelResultFile, ModelTaskState, ModelTaskStatus};
pub use storage::{ModelAssets, ModelStorage, S3ModelStorage};
