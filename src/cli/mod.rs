//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser};

use crate::core::resolver::CliOverrides;
use commands::Commands;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("VERGEN_GIT_SHA"),
    "\ndirty: ",
    env!("VERGEN_GIT_DIRTY"),
    "\ntarget: ",
    env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

/// kbuild - Linux kernel build helper
///
/// Builds a kernel source tree into a per-branch, per-architecture build
/// directory. Pulls the tree first when it is clean, and cleans and
/// reconfigures when the pull moved it.
#[derive(Parser, Debug)]
#[command(name = "kbuild")]
#[command(author, version, long_version = LONG_VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub options: BuildArgs,

    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Profile to use
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Kernel source directory
    #[arg(short, long, global = true, value_name = "DIR")]
    pub srcdir: Option<String>,

    /// Root under which build directories are created
    #[arg(short, long, global = true, value_name = "DIR")]
    pub buildpath: Option<String>,

    /// Build directory name, replacing the derived one
    #[arg(short = 'o', long, global = true, value_name = "NAME")]
    pub builddir: Option<String>,

    /// Kernel architecture (ARCH)
    #[arg(short, long, global = true)]
    pub arch: Option<String>,

    /// Parallel make jobs
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,

    /// Directory prepended to PATH for every command
    #[arg(long, global = true, value_name = "DIR")]
    pub toolchain: Option<String>,

    /// Cross-compiler prefix (CROSS_COMPILE)
    #[arg(long, global = true, value_name = "PREFIX")]
    pub cross_compile: Option<String>,

    /// Base configuration target
    #[arg(long, global = true, value_name = "TARGET")]
    pub baseconfig: Option<String>,

    /// Do not pull the source tree
    #[arg(long, global = true)]
    pub skip_pull: bool,

    /// Configure even when the build directory has a configuration
    #[arg(long, global = true)]
    pub reconfigure: bool,

    /// Extra environment for build commands (repeatable)
    #[arg(short, long = "env", global = true, value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Profile store file
    #[arg(long, global = true, env = "KBUILD_PROFILE_STORE", value_name = "FILE")]
    pub profile_store: Option<PathBuf>,

    /// Print commands instead of running them; never pulls
    #[arg(long, global = true)]
    pub dry_run: bool,
}

impl BuildArgs {
    /// Explicit values for configuration resolution
    ///
    /// Switches that are off stay unset so the environment and the profile
    /// can still turn them on.
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            profile: self.profile.clone(),
            srcdir: self.srcdir.clone(),
            buildpath: self.buildpath.clone(),
            builddir: self.builddir.clone(),
            arch: self.arch.clone(),
            toolchain: self.toolchain.clone(),
            cross_compile: self.cross_compile.clone(),
            jobs: self.jobs,
            skip_pull: (self.skip_pull || self.dry_run).then_some(true),
            reconfigure: self.reconfigure.then_some(true),
            baseconfig: self.baseconfig.clone(),
            configs: None,
            modules: None,
            env: self.env.clone(),
            install_wrapper: None,
        }
    }
}

impl Cli {
    /// Execute the CLI command; no subcommand means `build`
    pub async fn run(self) -> Result<()> {
        let command = self.command.unwrap_or(Commands::Build { args: Vec::new() });
        command.run(&self.options, self.json).await
    }
}
