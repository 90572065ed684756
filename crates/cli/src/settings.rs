//! Configuration loading
//!
//! Precedence (lowest to highest): config file, `STYX_SINGULARITY_*`
//! environment variables, command-line flags.
//!
//! ```toml
//! executable = "apptainer"
//! workspace_root = "~/styx_tmp"
//! environment = ["OMP_NUM_THREADS=1"]
//! unmounted_paths = "reject"
//!
//! [[images]]
//! tag = "alpine:3.18"
//! path = "/images/alpine.sif"
//! ```

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use styx_singularity_core::config::{ImageEntry, RunnerSettings};

/// Prefix of environment variables read as settings
pub const ENV_PREFIX: &str = "STYX_SINGULARITY";

const CONFIG_FILE_NAME: &str = "config.toml";

/// `<platform config dir>/styx-singularity/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "styx-singularity").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Environment variable source for settings
pub fn environment_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("container_paths")
        .with_list_parse_key("environment")
}

/// Read settings from a config file (explicit, or the optional default one)
/// layered under the given environment source
pub fn load_settings(explicit: Option<&Path>, env: Environment) -> Result<RunnerSettings> {
    let mut builder = Config::builder();

    match explicit {
        Some(path) => {
            builder = builder.add_source(File::from(path).required(true));
        }
        None => {
            if let Some(path) = default_config_path() {
                builder = builder.add_source(File::from(path).required(false));
            }
        }
    }

    builder
        .add_source(env)
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Invalid configuration")
}

/// Settings given as command-line flags
#[derive(Debug, Default)]
pub struct Overrides {
    /// `TAG=PATH` entries
    pub images: Vec<String>,
    pub executable: Option<String>,
    pub workspace_root: Option<PathBuf>,
}

impl Overrides {
    /// Layer the flags over loaded settings; an image flag replaces a
    /// configured image with the same tag
    pub fn apply(self, mut settings: RunnerSettings) -> Result<RunnerSettings> {
        for entry in &self.images {
            let (tag, path) = entry
                .split_once('=')
                .with_context(|| format!("Expected TAG=PATH for --image-map, got {:?}", entry))?;
            settings.images.retain(|image| image.tag != tag);
            settings.images.push(ImageEntry {
                tag: tag.to_string(),
                path: path.to_string(),
            });
        }
        if let Some(executable) = self.executable {
            settings.executable = Some(executable);
        }
        if let Some(root) = self.workspace_root {
            settings.workspace_root = Some(root.to_string_lossy().into_owned());
        }
        Ok(settings)
    }
}
