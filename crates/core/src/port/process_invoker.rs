// Process Invoker Port
// Abstraction over spawning the container runtime as a child process

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// Raw outcome of a finished process
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// `None` if the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// Terminating signal (Unix only)
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Process Invoker trait
///
/// Implementations:
/// - SubprocessInvoker (infra-system): tokio child process with piped output
///
/// Interpreting the exit status is the runner's job, so every invoker
/// reports the same failures the same way.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait ProcessInvoker: Send + Sync {
    /// Run `argv` (executable first) with `cwd` as working directory and wait
    /// for it to exit, capturing stdout and stderr in full
    ///
    /// # Errors
    /// - RunnerError::Launch if the executable cannot be started
    /// - RunnerError::Io if reading the output pipes fails
    async fn run(&self, argv: &[String], cwd: &Path) -> Result<ProcessOutput>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::RunnerError;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    /// Scripted response of the recording invoker
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Exit with the given code and output
        Exit {
            code: i32,
            stdout: String,
            stderr: String,
        },
        /// Fail to launch (binary not found)
        LaunchFailure,
    }

    /// A recorded invocation
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedCall {
        pub argv: Vec<String>,
        pub cwd: PathBuf,
    }

    /// Invoker that records every call and replays a scripted behavior
    #[derive(Clone)]
    pub struct RecordingInvoker {
        behavior: MockBehavior,
        calls: Arc<Mutex<Vec<RecordedCall>>>,
    }

    impl RecordingInvoker {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn new_success(stdout: impl Into<String>) -> Self {
            Self::new(MockBehavior::Exit {
                code: 0,
                stdout: stdout.into(),
                stderr: String::new(),
            })
        }

        pub fn new_exit(code: i32, stderr: impl Into<String>) -> Self {
            Self::new(MockBehavior::Exit {
                code,
                stdout: String::new(),
                stderr: stderr.into(),
            })
        }

        pub fn new_launch_failure() -> Self {
            Self::new(MockBehavior::LaunchFailure)
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ProcessInvoker for RecordingInvoker {
        async fn run(&self, argv: &[String], cwd: &Path) -> Result<ProcessOutput> {
            self.calls.lock().unwrap().push(RecordedCall {
                argv: argv.to_vec(),
                cwd: cwd.to_path_buf(),
            });

            match &self.behavior {
                MockBehavior::Exit {
                    code,
                    stdout,
                    stderr,
                } => Ok(ProcessOutput {
                    exit_code: Some(*code),
                    signal: None,
                    stdout: stdout.clone(),
                    stderr: stderr.clone(),
                }),
                MockBehavior::LaunchFailure => Err(RunnerError::Launch {
                    executable: argv.first().cloned().unwrap_or_default(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                }),
            }
        }
    }
}
