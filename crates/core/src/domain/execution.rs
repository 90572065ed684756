// Execution Result & Lifecycle

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Execution lifecycle
///
/// RESOLVED -> TRANSLATED -> INVOKED -> COMPLETED | FAILED.
/// Any pre-terminal state may fail. Only the terminal outcome is visible to
/// callers (as `Ok(ExecutionResult)` or `Err(RunnerError)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Resolved,
    Translated,
    Invoked,
    Completed,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Completed | ExecutionState::Failed)
    }

    pub fn can_transition_to(&self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Resolved, Translated)
                | (Translated, Invoked)
                | (Invoked, Completed)
                | (Resolved | Translated | Invoked, Failed)
        )
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionState::Resolved => write!(f, "RESOLVED"),
            ExecutionState::Translated => write!(f, "TRANSLATED"),
            ExecutionState::Invoked => write!(f, "INVOKED"),
            ExecutionState::Completed => write!(f, "COMPLETED"),
            ExecutionState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Outcome of a successful container run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Runtime command line that was executed
    pub argv: Vec<String>,
    pub workspace: PathBuf,
    /// Declared outputs resolved to host paths, in declaration order
    pub output_files: Vec<PathBuf>,
    pub duration_ms: i64,
}
