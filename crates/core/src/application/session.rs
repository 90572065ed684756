// Staging Session
// Input/output file staging for one execution, as the Styx layer drives it

use std::path::{Path, PathBuf};

use crate::application::constants::{INPUT_MOUNT_ROOT, OUTPUT_MOUNT_POINT};
use crate::domain::{ExecutionRequest, Mount, OutputFile};
use crate::error::{Result, RunnerError};

/// Collects staged inputs and declared outputs, then yields the request
///
/// Created by `SingularityRunner::session`, which has already resolved the
/// image and picked the workspace path.
#[derive(Debug, Clone)]
pub struct Session {
    name: String,
    image: String,
    workspace: PathBuf,
    inputs: Vec<Mount>,
    outputs: Vec<OutputFile>,
}

impl Session {
    pub(crate) fn new(name: impl Into<String>, image: impl Into<String>, workspace: PathBuf) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            workspace,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Host directory bound at `/styx_output`
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Stage a host file read-only and return its path inside the container
    ///
    /// Every input gets its own numbered directory, so two inputs with the
    /// same file name never collide.
    pub fn input_file(&mut self, host_file: impl AsRef<Path>) -> Result<String> {
        let host_file = host_file.as_ref();
        let file_name = host_file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                RunnerError::invalid_mount(
                    host_file.to_string_lossy(),
                    "input must name a file with a UTF-8 file name",
                )
            })?;
        let absolute = std::path::absolute(host_file).map_err(|e| {
            RunnerError::invalid_mount(host_file.to_string_lossy(), e.to_string())
        })?;

        let container_path = format!("{}/{}/{}", INPUT_MOUNT_ROOT, self.inputs.len(), file_name);
        self.inputs
            .push(Mount::read_only(absolute, container_path.clone()));
        Ok(container_path)
    }

    /// Declare an output and return where it will appear on the host
    pub fn output_file(&mut self, local: impl AsRef<Path>, optional: bool) -> PathBuf {
        let local = local.as_ref();
        self.outputs.push(OutputFile::new(local, optional));
        self.workspace.join(local)
    }

    /// Build the request: inputs bound read-only, workspace bound read-write
    /// at `/styx_output` and used as the container working directory
    pub fn request<I, S>(&self, executable: impl Into<String>, args: I) -> ExecutionRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut request = ExecutionRequest::new(self.image.clone(), executable)
            .with_name(self.name.clone())
            .with_args(args)
            .with_workspace(self.workspace.clone())
            .with_workspace_mount(OUTPUT_MOUNT_POINT)
            .with_workdir(OUTPUT_MOUNT_POINT);
        request.mounts = self.inputs.clone();
        request.outputs = self.outputs.clone();
        request
    }
}
