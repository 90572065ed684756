// Runner Configuration
//
// `RunnerSettings` is the loosely-typed shape read from config files and the
// environment. `RunnerConfig` is the validated, immutable result every runner
// borrows for its whole lifetime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::application::constants::{
    DEFAULT_CONTAINER_PATHS, DEFAULT_WORKSPACE_DIR, RUNTIME_EXECUTABLES,
};
use crate::domain::{validate_env_key, validate_env_value, ImageMap};
use crate::error::{Result, RunnerError};

/// What to do with argument paths that are not inside any declared mount
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmountedPathPolicy {
    /// Fail translation with `RunnerError::UnmountedPath`
    #[default]
    Reject,
    /// Pass the argument through untouched
    Allow,
}

/// One `[[images]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub tag: String,
    pub path: String,
}

/// Raw settings as read from a config file
///
/// Images and environment are lists rather than maps so that image tags and
/// variable names survive loaders that normalize map keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub images: Vec<ImageEntry>,
    pub executable: Option<String>,
    pub workspace_root: Option<String>,
    /// `KEY=VALUE` entries
    pub environment: Vec<String>,
    pub unmounted_paths: UnmountedPathPolicy,
    pub container_paths: Option<Vec<String>>,
}

/// Validated runner configuration (immutable)
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    images: ImageMap,
    executable: String,
    workspace_root: PathBuf,
    environment: BTreeMap<String, String>,
    unmounted_paths: UnmountedPathPolicy,
    container_paths: Vec<String>,
}

impl RunnerConfig {
    /// Start a configuration from the (required) image map
    ///
    /// # Example
    /// ```text
    /// let config = RunnerConfig::builder(
    ///     ImageMap::new().with_image("alpine:3.18", "/images/alpine.sif"),
    /// )
    /// .executable("apptainer")
    /// .env("OMP_NUM_THREADS", "1")
    /// .build()?;
    /// ```
    pub fn builder(images: ImageMap) -> RunnerConfigBuilder {
        RunnerConfigBuilder {
            images,
            executable: None,
            workspace_root: None,
            environment: BTreeMap::new(),
            unmounted_paths: UnmountedPathPolicy::default(),
            container_paths: None,
        }
    }

    pub fn images(&self) -> &ImageMap {
        &self.images
    }

    /// Container runtime binary (`singularity` / `apptainer` or a path)
    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Absolute directory under which per-execution workspaces are created
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Variables injected into every container run
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn unmounted_paths(&self) -> UnmountedPathPolicy {
        self.unmounted_paths
    }

    /// Container-internal prefixes exempt from the unmounted-path check
    pub fn container_paths(&self) -> &[String] {
        &self.container_paths
    }
}

/// Builder for [`RunnerConfig`]
#[derive(Debug, Clone)]
pub struct RunnerConfigBuilder {
    images: ImageMap,
    executable: Option<String>,
    workspace_root: Option<PathBuf>,
    environment: BTreeMap<String, String>,
    unmounted_paths: UnmountedPathPolicy,
    container_paths: Option<Vec<String>>,
}

impl RunnerConfigBuilder {
    pub fn executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = Some(executable.into());
        self
    }

    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn unmounted_paths(mut self, policy: UnmountedPathPolicy) -> Self {
        self.unmounted_paths = policy;
        self
    }

    pub fn container_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.container_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Validate and freeze the configuration
    ///
    /// # Errors
    /// - Config if the image map is empty, an image path is empty or cannot
    ///   be made absolute, the executable is blank, a variable is malformed,
    ///   a container path is relative, or the workspace root cannot be made
    ///   absolute
    ///
    /// Relative image paths resolve against the current directory here,
    /// because the runtime itself is started inside the workspace.
    pub fn build(self) -> Result<RunnerConfig> {
        if self.images.is_empty() {
            return Err(RunnerError::Config(
                "at least one container image must be configured".to_string(),
            ));
        }
        if let Some((tag, _)) = self
            .images
            .iter()
            .find(|(tag, path)| tag.is_empty() || path.as_os_str().is_empty())
        {
            return Err(RunnerError::Config(format!(
                "image entry {:?} needs both a tag and a path",
                tag
            )));
        }

        let images = self
            .images
            .iter()
            .map(|(tag, path)| {
                std::path::absolute(path)
                    .map(|absolute| (tag, absolute))
                    .map_err(|e| {
                        RunnerError::Config(format!(
                            "cannot resolve image path {}: {}",
                            path.display(),
                            e
                        ))
                    })
            })
            .collect::<Result<ImageMap>>()?;

        let executable = match self.executable {
            Some(exe) if exe.trim().is_empty() => {
                return Err(RunnerError::Config(
                    "container runtime executable must not be empty".to_string(),
                ))
            }
            Some(exe) => exe,
            None => discover_executable(),
        };

        for (key, value) in &self.environment {
            validate_env_key(key)
                .and_then(|_| validate_env_value(key, value))
                .map_err(|e| RunnerError::Config(e.to_string()))?;
        }

        let container_paths = self.container_paths.unwrap_or_else(|| {
            DEFAULT_CONTAINER_PATHS
                .iter()
                .map(|p| p.to_string())
                .collect()
        });
        if let Some(relative) = container_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(RunnerError::Config(format!(
                "container path prefix must be absolute: {}",
                relative
            )));
        }

        let root = self
            .workspace_root
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_WORKSPACE_DIR));
        let workspace_root = std::path::absolute(&root).map_err(|e| {
            RunnerError::Config(format!(
                "cannot resolve workspace root {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(RunnerConfig {
            images,
            executable,
            workspace_root,
            environment: self.environment,
            unmounted_paths: self.unmounted_paths,
            container_paths,
        })
    }
}

impl TryFrom<RunnerSettings> for RunnerConfig {
    type Error = RunnerError;

    fn try_from(settings: RunnerSettings) -> Result<Self> {
        let images: ImageMap = settings
            .images
            .into_iter()
            .map(|entry| (entry.tag, expand_path(&entry.path)))
            .collect();

        let mut builder = RunnerConfig::builder(images).unmounted_paths(settings.unmounted_paths);
        if let Some(executable) = settings.executable {
            builder = builder.executable(executable);
        }
        if let Some(root) = settings.workspace_root {
            builder = builder.workspace_root(expand_path(&root));
        }
        if let Some(paths) = settings.container_paths {
            builder = builder.container_paths(paths);
        }
        for entry in &settings.environment {
            let (key, value) = parse_env_pair(entry).map_err(|e| RunnerError::Config(e.to_string()))?;
            builder = builder.env(key, value);
        }
        builder.build()
    }
}

/// Split a `KEY=VALUE` pair; the value may itself contain '='
pub fn parse_env_pair(pair: &str) -> Result<(String, String)> {
    let (key, value) = pair.split_once('=').ok_or_else(|| {
        RunnerError::InvalidRequest(format!("expected KEY=VALUE, got {:?}", pair))
    })?;
    validate_env_key(key)?;
    Ok((key.to_string(), value.to_string()))
}

/// Expand `~` and `$VAR` in a configured path (left as-is on lookup failure)
fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

/// First known runtime binary found on PATH, else "singularity"
pub fn discover_executable() -> String {
    let search_path = std::env::var_os("PATH").unwrap_or_default();
    discover_executable_in(&search_path)
}

fn discover_executable_in(search_path: &std::ffi::OsStr) -> String {
    let dirs: Vec<PathBuf> = std::env::split_paths(search_path).collect();
    RUNTIME_EXECUTABLES
        .iter()
        .find(|name| dirs.iter().any(|dir| dir.join(name).is_file()))
        .unwrap_or(&RUNTIME_EXECUTABLES[0])
        .to_string()
}
