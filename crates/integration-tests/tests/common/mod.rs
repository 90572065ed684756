//! Fake container runtime for end-to-end tests
//!
//! A shell script that accepts `exec [--bind X] [--env K=V]... [--pwd D]
//! IMAGE CMD ARGS...`, exports the `--env` pairs, drops the rest and runs
//! CMD on the host in the current directory. Every invocation is appended
//! to a log file.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use styx_singularity_core::config::RunnerConfigBuilder;
use styx_singularity_core::{ImageMap, RunnerConfig, SingularityRunner};
use styx_singularity_infra_system::SubprocessInvoker;
use tempfile::TempDir;

pub const IMAGE_TAG: &str = "alpine:3.18";
pub const IMAGE_PATH: &str = "/images/alpine.sif";

pub struct FakeRuntime {
    pub dir: TempDir,
    pub executable: PathBuf,
    log: PathBuf,
}

impl FakeRuntime {
    pub fn install() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let executable = dir.path().join("singularity");
        let log = dir.path().join("invocations.log");

        let script = format!(
            r#"#!/bin/sh
printf '%s\n' "$*" >> '{log}'
if [ "$1" != exec ]; then
  echo "fake runtime: unsupported command $1" >&2
  exit 64
fi
shift
while [ $# -gt 0 ]; do
  case "$1" in
    --env) export "$2"; shift 2 ;;
    --bind|--pwd) shift 2 ;;
    *) break ;;
  esac
done
shift
exec "$@"
"#,
            log = log.display()
        );
        std::fs::write(&executable, script).unwrap();
        std::fs::set_permissions(&executable, std::fs::Permissions::from_mode(0o755)).unwrap();

        Self {
            dir,
            executable,
            log,
        }
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.dir.path().join("workspaces")
    }

    pub fn config(&self) -> RunnerConfigBuilder {
        RunnerConfig::builder(ImageMap::new().with_image(IMAGE_TAG, IMAGE_PATH))
            .executable(self.executable.to_string_lossy())
            .workspace_root(self.workspace_root())
    }

    pub fn runner(&self) -> SingularityRunner {
        runner_with(self.config().build().unwrap())
    }

    /// Logged command lines (without the executable)
    pub fn invocations(&self) -> Vec<String> {
        match std::fs::read_to_string(&self.log) {
            Ok(log) => log.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

pub fn runner_with(config: RunnerConfig) -> SingularityRunner {
    SingularityRunner::new(config, Arc::new(SubprocessInvoker::quiet())).unwrap()
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}
