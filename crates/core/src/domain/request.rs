// Execution Request Domain Model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, RunnerError};

use super::mount::Mount;

/// Default execution name (used for workspace directory naming)
pub const DEFAULT_EXECUTION_NAME: &str = "execution";

/// A file the command is expected to write, relative to the workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub path: PathBuf,
    #[serde(default)]
    pub optional: bool,
}

impl OutputFile {
    pub fn new(path: impl Into<PathBuf>, optional: bool) -> Self {
        Self {
            path: path.into(),
            optional,
        }
    }
}

/// One logical command to run inside a container
///
/// Owned by the call that built it; the runner only borrows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Human-readable name, sanitized into the workspace directory name
    pub name: String,
    /// Image tag, resolved through the runner's image map
    pub image: String,
    pub executable: String,
    pub args: Vec<String>,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    /// Per-request environment; wins over runner-wide variables on collision
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Caller-supplied workspace; a fresh one is allocated when `None`
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    /// Container path at which the workspace is bound read-write
    #[serde(default)]
    pub workspace_mount: Option<String>,
    /// Working directory inside the container (`--pwd`)
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub outputs: Vec<OutputFile>,
}

impl ExecutionRequest {
    pub fn new(image: impl Into<String>, executable: impl Into<String>) -> Self {
        Self {
            name: DEFAULT_EXECUTION_NAME.to_string(),
            image: image.into(),
            executable: executable.into(),
            args: Vec::new(),
            mounts: Vec::new(),
            env: BTreeMap::new(),
            workspace: None,
            workspace_mount: None,
            workdir: None,
            outputs: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_workspace_mount(mut self, container_path: impl Into<String>) -> Self {
        self.workspace_mount = Some(container_path.into());
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn with_output(mut self, output: OutputFile) -> Self {
        self.outputs.push(output);
        self
    }

    /// The logical command: executable followed by its arguments
    pub fn command(&self) -> Vec<String> {
        std::iter::once(self.executable.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Check request-local invariants (no configuration needed)
    ///
    /// # Errors
    /// - InvalidRequest on empty executable, malformed env keys or values,
    ///   or output paths that escape the workspace
    pub fn validate(&self) -> Result<()> {
        if self.executable.trim().is_empty() {
            return Err(RunnerError::InvalidRequest(
                "executable must not be empty".to_string(),
            ));
        }
        for (key, value) in &self.env {
            validate_env_key(key)?;
            validate_env_value(key, value)?;
        }
        for output in &self.outputs {
            validate_output_path(&output.path)?;
        }
        if let Some(workdir) = &self.workdir {
            if !workdir.starts_with('/') {
                return Err(RunnerError::InvalidRequest(format!(
                    "container working directory must be absolute: {}",
                    workdir
                )));
            }
        }
        Ok(())
    }
}

/// Characters the runtime's `--env` parser splits or quotes on
const ILLEGAL_ENV_CHARS: [char; 2] = [',', '"'];

/// Environment variable names must be non-empty and free of '=', ',' and '"'
pub fn validate_env_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains('=') || key.contains(ILLEGAL_ENV_CHARS) {
        return Err(RunnerError::InvalidRequest(format!(
            "invalid environment variable name: {:?}",
            key
        )));
    }
    Ok(())
}

/// `--env` takes comma-separated `K=V` pairs, so a value cannot carry ',' or '"'
pub fn validate_env_value(key: &str, value: &str) -> Result<()> {
    if value.contains(ILLEGAL_ENV_CHARS) {
        return Err(RunnerError::InvalidRequest(format!(
            "value of environment variable {} must not contain ',' or '\"': {:?}",
            key, value
        )));
    }
    Ok(())
}

fn validate_output_path(path: &Path) -> Result<()> {
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || path.as_os_str().is_empty() {
        return Err(RunnerError::InvalidRequest(format!(
            "output path must be relative to the workspace: {}",
            path.display()
        )));
    }
    Ok(())
}
