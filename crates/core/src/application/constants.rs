// Runner constants (no magic values)

/// Runtime binaries probed on PATH, in preference order
pub const RUNTIME_EXECUTABLES: [&str; 2] = ["singularity", "apptainer"];

/// Workspace root directory name under the platform temp dir
pub const DEFAULT_WORKSPACE_DIR: &str = "styx_tmp";

/// Container-internal prefixes that never need a bind mount
pub const DEFAULT_CONTAINER_PATHS: [&str; 2] = ["/dev", "/proc"];

/// Parent of staged input files inside the container
/// Each input lands in its own numbered subdirectory: /styx_input/<n>/<name>
pub const INPUT_MOUNT_ROOT: &str = "/styx_input";

/// Container path at which a session's workspace is bound
pub const OUTPUT_MOUNT_POINT: &str = "/styx_output";
