//! Default configuration values

/// Namespace prefix for configuration environment variables (`KBUILD_<FIELD>`)
pub const ENV_PREFIX: &str = "KBUILD";

/// Profile selected when none is requested
pub const DEFAULT_PROFILE: &str = "default";

/// Base configuration target
pub const DEFAULT_BASE_CONFIG: &str = "defconfig";

/// Privilege wrapper for install steps
pub const DEFAULT_INSTALL_WRAPPER: &str = "sudo";

/// Kconfig artifact written into the build directory
pub const CONFIG_ARTIFACT: &str = ".config";

/// Fragment merge script, relative to the source tree
pub const MERGE_CONFIG_SCRIPT: &str = "scripts/kconfig/merge_config.sh";

/// Build tool
pub const MAKE: &str = "make";

/// Lines buffered between the pipe readers and the output sink
pub const LINE_QUEUE_DEPTH: usize = 64;

/// Length of the abbreviated revision used for detached-HEAD build directories
pub const SHORT_REVISION_LEN: usize = 12;

/// Default number of parallel jobs: half the CPUs, at least one
pub fn default_jobs() -> usize {
    (num_cpus::get() / 2).max(1)
}
