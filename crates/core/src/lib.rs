// Styx Singularity Core - Domain Logic & Ports
// NO process spawning here: the ProcessInvoker port is implemented in infra-system

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;
pub mod shell;

pub use application::{Session, SingularityRunner};
pub use config::{RunnerConfig, RunnerSettings, UnmountedPathPolicy};
pub use domain::{ExecutionRequest, ExecutionResult, ImageMap, Mount, MountAccess, OutputFile};
pub use error::{ContainerFailure, ErrorKind, Result, RunnerError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
