// Command Translator
// Logical command -> `singularity exec` argument vector

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::{RunnerConfig, UnmountedPathPolicy};
use crate::domain::{
    normalize_lexically, validate_env_key, validate_env_value, ExecutionRequest, Mount,
};
use crate::error::{Result, RunnerError};

/// Builds runtime command lines from requests
///
/// Pure: the same request, image and workspace always produce the same argv.
pub struct CommandTranslator<'a> {
    config: &'a RunnerConfig,
}

impl<'a> CommandTranslator<'a> {
    pub fn new(config: &'a RunnerConfig) -> Self {
        Self { config }
    }

    /// Assemble
    /// `<exe> exec [--bind M1,M2,...] [--env K=V]... [--pwd DIR] <image> <cmd> [args...]`
    ///
    /// # Errors
    /// - InvalidMount for malformed or conflicting mounts
    /// - UnmountedPath for argument paths outside every mount (reject policy)
    /// - InvalidRequest for non-UTF-8 image paths, bad variable names, or
    ///   values the runtime's `--env` parser would split
    pub fn build(
        &self,
        request: &ExecutionRequest,
        image: &Path,
        workspace: &Path,
    ) -> Result<Vec<String>> {
        let mounts = self.collect_mounts(request, workspace)?;
        if self.config.unmounted_paths() == UnmountedPathPolicy::Reject {
            self.check_argument_paths(&request.args, &mounts)?;
        }
        let env = self.merge_env(request)?;

        let image = image.to_str().ok_or_else(|| {
            RunnerError::InvalidRequest(format!(
                "image path is not valid UTF-8: {}",
                image.display()
            ))
        })?;

        let mut argv = vec![self.config.executable().to_string(), "exec".to_string()];

        if !mounts.is_empty() {
            let binds = mounts
                .iter()
                .map(Mount::to_bind_spec)
                .collect::<Result<Vec<_>>>()?;
            argv.push("--bind".to_string());
            argv.push(binds.join(","));
        }

        for (key, value) in &env {
            argv.push("--env".to_string());
            argv.push(format!("{}={}", key, value));
        }

        if let Some(workdir) = &request.workdir {
            argv.push("--pwd".to_string());
            argv.push(workdir.clone());
        }

        argv.push(image.to_string());
        argv.push(request.executable.clone());
        argv.extend(request.args.iter().cloned());

        Ok(argv)
    }

    /// Declared mounts plus the workspace mount, validated, sorted by host path
    /// and free of duplicates
    fn collect_mounts(&self, request: &ExecutionRequest, workspace: &Path) -> Result<Vec<Mount>> {
        let mut mounts = request.mounts.clone();
        if let Some(target) = &request.workspace_mount {
            mounts.push(Mount::read_write(workspace, target.clone()));
        }

        for mount in &mounts {
            mount.validate()?;
        }

        mounts.sort();
        mounts.dedup();

        let mut targets: BTreeMap<&str, &Mount> = BTreeMap::new();
        for mount in &mounts {
            if let Some(existing) = targets.insert(mount.container_path.as_str(), mount) {
                return Err(RunnerError::invalid_mount(
                    &mount.container_path,
                    format!(
                        "container path is bound twice ({} and {})",
                        existing.host_path.display(),
                        mount.host_path.display()
                    ),
                ));
            }
        }

        Ok(mounts)
    }

    /// Fail closed on absolute paths the container could not see
    ///
    /// Both bare arguments (`/data/x`) and option values (`--out=/data/x`)
    /// are checked, after resolving `.` and `..`.
    fn check_argument_paths(&self, args: &[String], mounts: &[Mount]) -> Result<()> {
        let exempt = self.config.container_paths();

        for arg in args {
            let value = arg.split_once('=').map(|(_, v)| v);
            for candidate in std::iter::once(arg.as_str()).chain(value) {
                if !candidate.starts_with('/') {
                    continue;
                }
                let resolved = normalize_lexically(Path::new(candidate));
                let covered = mounts.iter().any(|m| m.covers(candidate))
                    || exempt.iter().any(|p| resolved.starts_with(p));
                if !covered {
                    return Err(RunnerError::UnmountedPath {
                        argument: arg.clone(),
                        path: candidate.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Runner-wide variables overlaid with the request's own (request wins)
    fn merge_env(&self, request: &ExecutionRequest) -> Result<BTreeMap<String, String>> {
        let mut env = self.config.environment().clone();
        for (key, value) in &request.env {
            validate_env_key(key)?;
            env.insert(key.clone(), value.clone());
        }
        for (key, value) in &env {
            validate_env_value(key, value)?;
        }
        Ok(env)
    }
}
