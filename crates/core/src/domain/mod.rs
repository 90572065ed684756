// Domain Layer - Requests, mounts, images and results

pub mod execution;
pub mod image;
pub mod mount;
pub mod request;

// Re-exports
pub use execution::{ExecutionResult, ExecutionState};
pub use image::ImageMap;
pub use mount::{normalize_lexically, Mount, MountAccess};
pub use request::{validate_env_key, validate_env_value, ExecutionRequest, OutputFile, DEFAULT_EXECUTION_NAME};
