// Workspace Manager
// Allocates per-execution directories and readies bind sources on the host

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::domain::{ExecutionRequest, MountAccess, OutputFile};
use crate::error::{Result, RunnerError};
use crate::port::IdProvider;

/// Manages workspaces below a fixed root
///
/// Never deletes anything: outputs must stay readable after the run, and
/// retention is the caller's decision.
pub struct WorkspaceManager<'a> {
    root: &'a Path,
    ids: &'a dyn IdProvider,
}

impl<'a> WorkspaceManager<'a> {
    pub fn new(root: &'a Path, ids: &'a dyn IdProvider) -> Self {
        Self { root, ids }
    }

    /// Workspace path for a request, without touching the filesystem
    ///
    /// The caller's directory when one is supplied (made absolute), otherwise
    /// `<root>/<sanitized name>_<unique id>`.
    pub fn locate(&self, request: &ExecutionRequest) -> Result<PathBuf> {
        match &request.workspace {
            Some(dir) => std::path::absolute(dir).map_err(|source| RunnerError::Workspace {
                path: dir.clone(),
                source,
            }),
            None => Ok(self.allocate(&request.name)),
        }
    }

    /// Fresh workspace path for an execution name
    pub fn allocate(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{}_{}", sanitize_name(name), self.ids.generate_id()))
    }

    /// Create the workspace and make every bind source ready
    ///
    /// Read-write sources are created as directories when missing, since the
    /// runtime will not create bind sources on every platform. Read-only
    /// sources must already exist.
    ///
    /// # Errors
    /// - Workspace if a directory cannot be created
    /// - InvalidMount if a read-only source is missing
    pub fn prepare(&self, request: &ExecutionRequest, workspace: &Path) -> Result<()> {
        create_dir(workspace)?;

        for mount in &request.mounts {
            match mount.access {
                MountAccess::ReadWrite if !mount.host_path.exists() => {
                    debug!(path = %mount.host_path.display(), "Creating output mount source");
                    create_dir(&mount.host_path)?;
                }
                MountAccess::ReadWrite => {}
                MountAccess::ReadOnly => {
                    if !mount.host_path.exists() {
                        return Err(RunnerError::invalid_mount(
                            mount.host_path.to_string_lossy(),
                            "source does not exist on the host",
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve declared outputs to host paths inside the workspace
    ///
    /// Missing required outputs are reported in the log only; the command
    /// already succeeded and the caller decides what a missing file means.
    pub fn resolve_outputs(&self, workspace: &Path, outputs: &[OutputFile]) -> Vec<PathBuf> {
        outputs
            .iter()
            .map(|output| {
                let path = workspace.join(&output.path);
                if !output.optional && !path.exists() {
                    warn!(path = %path.display(), "Declared output file was not produced");
                }
                path
            })
            .collect()
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| RunnerError::Workspace {
        path: path.to_path_buf(),
        source,
    })
}

/// Collapse every run of non-word characters into a single '_'
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if c.is_alphanumeric() || c == '_' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}
