//! Build command implementation
//!
//! Implements `kbuild build`: update the source tree, clean and configure
//! when needed, then run `make` in the build directory.

use anyhow::Result;

use crate::cli::output;
use crate::core::builder::{BuildOrchestrator, BuildReport, Mode};
use crate::core::resolver::BuildConfig;
use crate::infra::git::GitTree;
use crate::infra::process::{DryRunRunner, ProcessRunner};

/// Execute the build command
pub async fn execute(config: BuildConfig, args: Vec<String>, dry_run: bool, json: bool) -> Result<()> {
    tracing::info!(profile = %config.profile, srcdir = %config.srcdir.display(), "building kernel");

    let tree = GitTree::new(&config.srcdir);
    let sink = output::command_sink(json);
    let mode = Mode::Build { args };
    let report: BuildReport = if dry_run {
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
