// Subprocess invoker implementation
// reason: async-trait, tokio for async process management
use async_trait::async_trait;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{error, info};

use styx_singularity_core::error::{Result, RunnerError};
use styx_singularity_core::port::{ProcessInvoker, ProcessOutput};

/// Which pipe a line came from
#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Subprocess invoker
///
/// Spawns the container runtime with piped stdout/stderr, drains both pipes
/// concurrently (so neither can fill up and stall the child) and waits for
/// exit. The child inherits the host environment; the runtime needs it.
pub struct SubprocessInvoker {
    log_lines: bool,
}

impl SubprocessInvoker {
    /// Create an invoker that logs every output line as it arrives
    /// (stdout at INFO, stderr at ERROR) besides capturing it
    pub fn new() -> Self {
        Self { log_lines: true }
    }

    /// Capture output without logging it line by line
    pub fn quiet() -> Self {
        Self { log_lines: false }
    }

    /// Read a pipe to EOF, keeping the bytes verbatim
    async fn drain<R>(&self, reader: Option<R>, stream: Stream) -> std::io::Result<Vec<u8>>
    where
        R: AsyncRead + Unpin,
    {
        let Some(reader) = reader else {
            return Ok(Vec::new());
        };

        let mut reader = BufReader::new(reader);
        let mut captured = Vec::new();
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                break;
            }
            if self.log_lines {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end_matches(['\n', '\r']);
                match stream {
                    Stream::Stdout => info!("{}", text),
                    Stream::Stderr => error!("{}", text),
                }
            }
            captured.extend_from_slice(&line);
        }
        Ok(captured)
    }

    /// Build process output from exit status and captured bytes
    fn build_output(status: ExitStatus, stdout: Vec<u8>, stderr: Vec<u8>) -> ProcessOutput {
        ProcessOutput {
            exit_code: status.code(),
            signal: exit_signal(&status),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        }
    }
}

impl Default for SubprocessInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[async_trait]
impl ProcessInvoker for SubprocessInvoker {
    async fn run(&self, argv: &[String], cwd: &Path) -> Result<ProcessOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| RunnerError::InvalidRequest("empty command line".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Launch {
                executable: program.clone(),
                source,
            })?;

        let pid = child.id();
        info!(program = %program, pid = ?pid, cwd = %cwd.display(), "Started container runtime");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (stdout, stderr, status) = tokio::try_join!(
            self.drain(stdout, Stream::Stdout),
            self.drain(stderr, Stream::Stderr),
            child.wait(),
        )?;

        let output = Self::build_output(status, stdout, stderr);

        info!(
            program = %program,
            exit_code = ?output.exit_code,
            signal = ?output.signal,
            "Container runtime exited"
        );

        Ok(output)
    }
}
