// Bind Mount Domain Model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, RunnerError};

/// Characters that would corrupt a `--bind SRC:DST[:ro][,...]` list
const ILLEGAL_BIND_CHARS: [char; 3] = [',', ':', '\\'];

/// Mount access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountAccess {
    ReadOnly,
    ReadWrite,
}

impl fmt::Display for MountAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountAccess::ReadOnly => write!(f, "ro"),
            MountAccess::ReadWrite => write!(f, "rw"),
        }
    }
}

/// A host path made visible inside the container for one execution
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub access: MountAccess,
}

impl Mount {
    pub fn new(
        host_path: impl Into<PathBuf>,
        container_path: impl Into<String>,
        access: MountAccess,
    ) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            access,
        }
    }

    /// Input mount
    pub fn read_only(host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        Self::new(host_path, container_path, MountAccess::ReadOnly)
    }

    /// Output mount; the host directory is created before the run if missing
    pub fn read_write(host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        Self::new(host_path, container_path, MountAccess::ReadWrite)
    }

    pub fn is_read_only(&self) -> bool {
        self.access == MountAccess::ReadOnly
    }

    /// Parse the command-line form `SRC[:DST][:ro|:rw]`
    ///
    /// A missing destination mounts the source at the same path. Mounts are
    /// read-write unless `:ro` is given, matching Singularity's own default.
    pub fn parse(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split(':').collect();
        let (src, dst, access) = match parts.as_slice() {
            [src] => (*src, *src, MountAccess::ReadWrite),
            [src, dst] => (*src, *dst, MountAccess::ReadWrite),
            [src, dst, "ro"] => (*src, *dst, MountAccess::ReadOnly),
            [src, dst, "rw"] => (*src, *dst, MountAccess::ReadWrite),
            [_, _, opt] => {
                return Err(RunnerError::invalid_mount(
                    spec,
                    format!("unknown mount option '{}', expected 'ro' or 'rw'", opt),
                ))
            }
            _ => {
                return Err(RunnerError::invalid_mount(
                    spec,
                    "expected SRC[:DST][:ro|:rw]",
                ))
            }
        };
        if src.is_empty() || dst.is_empty() {
            return Err(RunnerError::invalid_mount(spec, "empty path"));
        }
        Ok(Self::new(src, dst, access))
    }

    /// Validate both sides of the mount
    ///
    /// # Errors
    /// - InvalidMount if a path is relative, not UTF-8, or contains `,` `:` `\`
    pub fn validate(&self) -> Result<()> {
        let host = host_path_str(&self.host_path)?;
        if !self.host_path.is_absolute() {
            return Err(RunnerError::invalid_mount(host, "host path must be absolute"));
        }
        if !self.container_path.starts_with('/') {
            return Err(RunnerError::invalid_mount(
                &self.container_path,
                "container path must be absolute",
            ));
        }
        for path in [host, self.container_path.as_str()] {
            if path.contains(ILLEGAL_BIND_CHARS) {
                return Err(RunnerError::invalid_mount(
                    path,
                    "illegal character in path (',', ':' and '\\' are not allowed)",
                ));
            }
        }
        Ok(())
    }

    /// Render as `HOST:CONTAINER[:ro]`
    pub fn to_bind_spec(&self) -> Result<String> {
        self.validate()?;
        let host = host_path_str(&self.host_path)?;
        let suffix = if self.is_read_only() { ":ro" } else { "" };
        Ok(format!("{}:{}{}", host, self.container_path, suffix))
    }

    /// Whether a container-side path is at or below this mount's target
    ///
    /// `.` and `..` are resolved first, so `/data/../etc` is not under `/data`.
    pub fn covers(&self, container_path: &str) -> bool {
        normalize_lexically(Path::new(container_path)).starts_with(&self.container_path)
    }
}

/// Resolve `.` and `..` without touching the filesystem
///
/// `..` at the root stays at the root, as the kernel does.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if normalized.parent().is_some() {
                    normalized.pop();
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn host_path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| RunnerError::invalid_mount(path.to_string_lossy(), "host path is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_bind_spec() {
        let input = Mount::read_only("/data/in.nii", "/styx_input/0/in.nii");
        let output = Mount::read_write("/data/out", "/styx_output");

        assert_eq!(input.to_bind_spec().unwrap(), "/data/in.nii:/styx_input/0/in.nii:ro");
        assert_eq!(output.to_bind_spec().unwrap(), "/data/out:/styx_output");
    }

    #[test]
    fn test_illegal_characters_rejected() {
        for mount in [
            Mount::read_only("/data/a,b", "/in"),
            Mount::read_only("/data/a:b", "/in"),
            Mount::read_only("/data/a\\b", "/in"),
            Mount::read_only("/data/in", "/in,other"),
        ] {
            let err = mount.to_bind_spec().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidMount, "{:?}", mount);
        }
    }

    #[test]
    fn test_relative_paths_rejected() {
        assert!(Mount::read_only("data/in", "/in").validate().is_err());
        assert!(Mount::read_only("/data/in", "in").validate().is_err());
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            Mount::parse("/data").unwrap(),
            Mount::read_write("/data", "/data")
        );
        assert_eq!(
            Mount::parse("/data:/mnt").unwrap(),
            Mount::read_write("/data", "/mnt")
        );
        assert_eq!(
            Mount::parse("/data:/mnt:ro").unwrap(),
            Mount::read_only("/data", "/mnt")
        );
        assert!(Mount::parse("/data:/mnt:xx").is_err());
        assert!(Mount::parse("/a:/b:ro:extra").is_err());
        assert!(Mount::parse(":/mnt").is_err());
    }

    #[test]
    fn test_covers_is_component_wise() {
        let mount = Mount::read_only("/host", "/styx_input");

        assert!(mount.covers("/styx_input"));
        assert!(mount.covers("/styx_input/0/file.txt"));
        assert!(!mount.covers("/styx_input_other/file.txt"));
        assert!(!mount.covers("/etc/passwd"));
    }

    #[test]
    fn test_covers_resolves_parent_components() {
        let mount = Mount::read_only("/host", "/data");

        assert!(!mount.covers("/data/../etc/shadow"));
        assert!(!mount.covers("/data/x/../../etc"));
        assert!(mount.covers("/data/x/../y.txt"));
        assert!(mount.covers("/data/./y.txt"));
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(normalize_lexically(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize_lexically(Path::new("/../../etc")), PathBuf::from("/etc"));
        assert_eq!(normalize_lexically(Path::new("/dev/..")), PathBuf::from("/"));
    }
}
