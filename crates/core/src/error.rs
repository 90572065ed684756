// Central Error Type for the Runner

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::shell::shell_join;

/// Runner error type
///
/// Every failure the adapter can surface. Nothing is retried or swallowed
/// internally; callers branch on [`RunnerError::kind`] and log the payload.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(
        "Container image not found: {tag}. Use `singularity pull docker://{tag} [output file]` \
         to download it and add it to the runner's image map"
    )]
    UnknownImage { tag: String },

    #[error("Failed to launch container runtime `{executable}`: {source}")]
    Launch {
        executable: String,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    ContainerExecution(Box<ContainerFailure>),

    #[error("Invalid mount {path}: {reason}")]
    InvalidMount { path: String, reason: String },

    #[error("Argument {argument:?} references {path}, which is outside every declared mount")]
    UnmountedPath { argument: String, path: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Workspace error at {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Singularity runner is not supported on {0}")]
    UnsupportedPlatform(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Diagnostic payload of a container that ran and exited unsuccessfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerFailure {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    /// Full runtime command line, executable first
    pub argv: Vec<String>,
    /// Logical command as requested (executable + arguments)
    pub command: Vec<String>,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for ContainerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command failed.")?;
        if let Some(code) = self.exit_code {
            write!(f, "\n- Return code: {}", code)?;
        }
        if let Some(signal) = self.signal {
            write!(f, "\n- Terminated by signal: {}", signal)?;
        }
        write!(f, "\n- Singularity args: {}", shell_join(&self.argv))?;
        write!(f, "\n- Command args: {}", shell_join(&self.command))
    }
}

/// Error kind, for callers that only branch on the category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownImage,
    Launch,
    ContainerExecution,
    InvalidMount,
    UnmountedPath,
    InvalidRequest,
    Workspace,
    Config,
    UnsupportedPlatform,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnknownImage => "unknown_image",
            ErrorKind::Launch => "launch",
            ErrorKind::ContainerExecution => "container_execution",
            ErrorKind::InvalidMount => "invalid_mount",
            ErrorKind::UnmountedPath => "unmounted_path",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Workspace => "workspace",
            ErrorKind::Config => "config",
            ErrorKind::UnsupportedPlatform => "unsupported_platform",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

impl RunnerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunnerError::UnknownImage { .. } => ErrorKind::UnknownImage,
            RunnerError::Launch { .. } => ErrorKind::Launch,
            RunnerError::ContainerExecution(_) => ErrorKind::ContainerExecution,
            RunnerError::InvalidMount { .. } => ErrorKind::InvalidMount,
            RunnerError::UnmountedPath { .. } => ErrorKind::UnmountedPath,
            RunnerError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            RunnerError::Workspace { .. } => ErrorKind::Workspace,
            RunnerError::Config(_) => ErrorKind::Config,
            RunnerError::UnsupportedPlatform(_) => ErrorKind::UnsupportedPlatform,
            RunnerError::Io(_) => ErrorKind::Io,
        }
    }

    /// Failure payload when the container ran and exited unsuccessfully
    pub fn container_failure(&self) -> Option<&ContainerFailure> {
        match self {
            RunnerError::ContainerExecution(failure) => Some(&**failure),
            _ => None,
        }
    }

    pub(crate) fn invalid_mount(path: impl Into<String>, reason: impl Into<String>) -> Self {
        RunnerError::InvalidMount {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using RunnerError
pub type Result<T> = std::result::Result<T, RunnerError>;
