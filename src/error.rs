//! Error types for kbuild
//!
//! Domain-specific error types using thiserror. Each pipeline concern owns
//! one enum; [`KbuildError`] ties them together for the orchestrator and
//! the command layer.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration resolution errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Requested profile is not in the profile store
    #[error("Profile '{name}' not found. Available profiles: [{}]", available.join(", "))]
    ProfileNotFound {
        name: String,
        available: Vec<String>,
    },

    /// Failed to read the profile store
    #[error("Failed to read profile store '{path}': {error}")]
    ReadStore { path: PathBuf, error: String },

    /// Failed to parse the profile store
    #[error("Failed to parse profile store '{path}': {error}")]
    ParseStore { path: PathBuf, error: String },

    /// Environment variable holds a value of the wrong type
    #[error("Invalid value '{value}' in {var}: {reason}")]
    InvalidEnv {
        var: String,
        value: String,
        reason: String,
    },

    /// Malformed `KEY=VALUE` environment override
    #[error("Invalid environment override '{0}': expected KEY=VALUE")]
    InvalidEnvOverride(String),

    /// Home directory could not be determined for `~` expansion
    #[error("Cannot expand '{path}': home directory is unknown")]
    NoHomeDir { path: String },

    /// Current directory could not be determined
    #[error("Cannot determine current directory: {error}")]
    CurrentDir { error: String },

    /// A required external tool is missing
    #[error("Required program '{program}' not found in PATH")]
    MissingProgram { program: String },
}

/// Build directory errors
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// Explicit build directory name is not a single path segment
    #[error("Build directory '{name}' must be a plain name, not a path")]
    NotASingleSegment { name: String },

    /// Failed to create the build directory
    #[error("Failed to create build directory '{path}': {error}")]
    Create { path: PathBuf, error: String },

    /// Source directory does not exist
    #[error("Source directory '{path}' does not exist or is not a directory")]
    SourceMissing { path: PathBuf },
}

/// Version control errors
#[derive(Error, Debug)]
pub enum VcsError {
    /// Failed to open the repository
    #[error("Failed to open repository at '{path}': {error}")]
    Open { path: PathBuf, error: String },

    /// Failed to read HEAD
    #[error("Failed to read HEAD in '{path}': {error}")]
    Head { path: PathBuf, error: String },

    /// Failed to compute worktree status
    #[error("Failed to read worktree status in '{path}': {error}")]
    Status { path: PathBuf, error: String },

    /// HEAD is not on a branch, so there is nothing to pull into
    #[error("HEAD is detached in '{path}'; cannot pull")]
    DetachedHead { path: PathBuf },

    /// No remote configured for fetching
    #[error("No default remote configured in '{path}'")]
    NoRemote { path: PathBuf },

    /// Fetch from the remote failed
    #[error("Failed to fetch '{remote}': {error}")]
    Fetch { remote: String, error: String },

    /// Upstream branch missing after fetch
    #[error("Upstream ref '{reference}' not found")]
    UpstreamNotFound { reference: String },

    /// Local branch has diverged from upstream
    #[error("Branch '{branch}' cannot be fast-forwarded to '{upstream}'")]
    NotFastForward { branch: String, upstream: String },

    /// Updating the worktree would destroy untracked content
    #[error("Pull would overwrite untracked content at '{path}'")]
    WouldClobber { path: PathBuf },

    /// Failed to update the worktree to the fetched commit
    #[error("Failed to update worktree '{path}': {error}")]
    Checkout { path: PathBuf, error: String },

    /// Failed to move the branch ref
    #[error("Failed to update ref '{reference}': {error}")]
    UpdateRef { reference: String, error: String },
}

/// External process errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Process could not be started
    #[error("Failed to start '{command}': {error}")]
    Spawn { command: String, error: String },

    /// Output pipe was not available after spawn
    #[error("Failed to capture {stream} of '{command}'")]
    Pipe {
        command: String,
        stream: &'static str,
    },

    /// Waiting for the process failed
    #[error("Failed to wait for '{command}': {error}")]
    Wait { command: String, error: String },

    /// Process exited with a nonzero code
    #[error("'{command}' exited with code {code}")]
    Exited { command: String, code: i32 },

    /// Process was killed by a signal
    #[error("'{command}' was terminated by a signal")]
    Terminated { command: String },
}

impl ProcessError {
    /// Exit code carried by the error, if the process ran to completion
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exited { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Pipeline step names used in failure reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Clean,
    Configure,
    MergeConfig,
    ResolveConfig,
    Build,
    BuildModule,
    InstallModule,
    Install,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Clean => "clean",
            Self::Configure => "configure",
            Self::MergeConfig => "merge config fragments",
            Self::ResolveConfig => "resolve config defaults",
            Self::Build => "build",
            Self::BuildModule => "build module",
            Self::InstallModule => "install module",
            Self::Install => "install",
        };
        f.write_str(name)
    }
}

/// Top-level kbuild error type
#[derive(Error, Debug)]
pub enum KbuildError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Build directory error
    #[error("Build directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Version control error
    #[error("Source tree error: {0}")]
    Vcs(#[from] VcsError),

    /// Process error outside a named step
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// A pipeline step failed
    #[error("Step '{step}' failed: {source}")]
    Step {
        step: Step,
        #[source]
        source: ProcessError,
    },
}

impl KbuildError {
    /// Exit code of the wrapped command, when the failure came from one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Process(e) | Self::Step { source: e, .. } => e.exit_code(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_not_found_lists_available() {
        let err = ConfigError::ProfileNotFound {
            name: "foo".to_string(),
            available: vec!["arm64".to_string(), "x86".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'foo'"));
        assert!(msg.contains("arm64, x86"));
    }

    #[test]
    fn test_step_error_carries_exit_code() {
        let err = KbuildError::Step {
            step: Step::Build,
            source: ProcessError::Exited {
                command: "make".to_string(),
                code: 2,
            },
        };
        assert_eq!(err.exit_code(), Some(2));
        assert!(err.to_string().starts_with("Step 'build' failed"));
    }

    #[test]
    fn test_non_process_errors_have_no_exit_code() {
        let err = KbuildError::from(DirectoryError::NotASingleSegment {
            name: "a/b".to_string(),
        });
        assert_eq!(err.exit_code(), None);
    }
}
