//! Install command implementation
//!
//! Implements `kbuild install`: install out-of-tree modules, then the
//! kernel and its in-tree modules, through the install wrapper.

use anyhow::Result;
use std::path::PathBuf;

use crate::cli::output;
use crate::core::builder::{BuildOrchestrator, InstallOptions, Mode};
use crate::core::kernel::InstallTarget;
use crate::core::resolver::BuildConfig;
use crate::error::ConfigError;
use crate::infra::dirs::{absolute_path, current_dir};
use crate::infra::git::GitTree;
use crate::infra::process::{DryRunRunner, ProcessRunner};

/// Install options
pub struct InstallArgs {
    /// Skip the kernel install step
    pub modules_only: bool,
    /// Alternative root for installed files
    pub install_root: Option<String>,
    /// Announce commands without running them
    pub dry_run: bool,
}

/// Execute the install command
pub async fn execute(config: BuildConfig, args: InstallArgs, json: bool) -> Result<()> {
    if !args.dry_run {
        check_wrapper(config.install_wrapper.as_deref())?;
    }

    let root = args
        .install_root
        .as_deref()
        .map(|r| -> Result<PathBuf, ConfigError> { absolute_path(r, &current_dir()?) })
        .transpose()?;
    let mode = Mode::Install(InstallOptions {
        modules_only: args.modules_only,
        target: InstallTarget { root },
    });

    let tree = GitTree::new(&config.srcdir);
    let sink = output::command_sink(json);
    let report = if args.dry_run {
        BuildOrchestrator::new(config, DryRunRunner::with_sink(sink), tree)
            .run(&mode)
            .await?
    } else {
        BuildOrchestrator::new(config, ProcessRunner::with_sink(sink), tree)
            .run(&mode)
            .await?
    };

    output::print_report(&report, json)
}

/// Fail early when the install wrapper is not on PATH
pub fn check_wrapper(wrapper: Option<&str>) -> Result<(), ConfigError> {
    let Some(program) = wrapper.and_then(|w| w.split_whitespace().next()) else {
        return Ok(());
    };
    which::which(program).map_err(|_| ConfigError::MissingProgram {
        program: program.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_wrapper_needs_no_check() {
        assert!(check_wrapper(None).is_ok());
        assert!(check_wrapper(Some("  ")).is_ok());
    }

    #[test]
    fn test_missing_wrapper_is_config_error() {
        let err = check_wrapper(Some("kbuild-no-such-wrapper -E")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingProgram { program } if program == "kbuild-no-such-wrapper"));
    }

    #[test]
    fn test_present_wrapper_passes() {
        // `sh` is on PATH wherever the process tests run
        assert!(check_wrapper(Some("sh -c")).is_ok());
    }
}
