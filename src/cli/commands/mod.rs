//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod install;
pub mod path;
pub mod profiles;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::BuildArgs;
use crate::core::profile::ProfileStore;
use crate::core::resolver::{BuildConfig, ConfigResolver};
use crate::infra::dirs::{current_dir, KbuildDirs};

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Update, configure and build the kernel (default)
    Build {
        /// Arguments appended to the make command line
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Install modules and the kernel from the build directory
    Install {
        /// Install declared out-of-tree modules only
        #[arg(short = 'M', long)]
        modules_only: bool,

        /// Install below this directory instead of the running system
        #[arg(long, value_name = "DIR")]
        install_root: Option<String>,
    },

    /// Print the build directory
    Path {
        /// Print the kernel image path instead
        #[arg(short = 'z', long, conflicts_with = "config")]
        bzimage: bool,

        /// Print the configuration file path instead
        #[arg(short, long)]
        config: bool,
    },

    /// List stored profiles
    Profiles,
}

impl Commands {
    /// Execute the command
    pub async fn run(self, options: &BuildArgs, json: bool) -> Result<()> {
        match self {
            Self::Build { args } => {
                let config = resolve_config(options)?;
                build::execute(config, args, options.dry_run, json).await
            }
            Self::Install {
                modules_only,
                install_root,
            } => {
                let config = resolve_config(options)?;
                let install_options = install::InstallArgs {
                    modules_only,
                    install_root,
                    dry_run: options.dry_run,
                };
                install::execute(config, install_options, json).await
            }
            Self::Path { bzimage, config } => {
                let build_config = resolve_config(options)?;
                let kind = if bzimage {
                    path::PathKind::Image
                } else if config {
                    path::PathKind::Config
                } else {
                    path::PathKind::BuildDir
                };
                path::execute(&build_config, kind, json)
            }
            Self::Profiles => {
                let store = load_store(options)?;
                profiles::execute(&store, json)
            }
        }
    }
}

fn store_path(options: &BuildArgs) -> PathBuf {
    options
        .profile_store
        .clone()
        .unwrap_or_else(|| KbuildDirs::new().profile_store_path())
}

/// Load the profile store named on the command line, or the default one
pub fn load_store(options: &BuildArgs) -> Result<ProfileStore> {
    let path = store_path(options);
    tracing::debug!(path = %path.display(), "loading profile store");
    Ok(ProfileStore::load_from_path(&path)?)
}

/// Resolve the build configuration from flags, environment and profile store
pub fn resolve_config(options: &BuildArgs) -> Result<BuildConfig> {
    let store = load_store(options)?;
    let cwd = current_dir()?;
    ConfigResolver::from_process(cwd)
        .resolve(&options.overrides(), &store)
        .context("Failed to resolve build configuration")
}
