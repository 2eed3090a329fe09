//! Configuration resolution
//!
//! Every field of a [`BuildConfig`] is resolved with the precedence
//!
//! 1. explicit command-line value
//! 2. `KBUILD_<FIELD>` environment variable
//! 3. stored profile value (profile, then `Common`)
//! 4. built-in default
//!
//! Boolean environment variables are true whenever they are set to a
//! non-empty value; their content is not inspected.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::defaults::{
    default_jobs, DEFAULT_BASE_CONFIG, DEFAULT_INSTALL_WRAPPER, DEFAULT_PROFILE, ENV_PREFIX,
};
use crate::core::kernel::host_kernel_arch;
use crate::core::profile::ProfileStore;
use crate::error::ConfigError;
use crate::infra::dirs::{absolute_path, KbuildDirs};

/// Values given explicitly on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub profile: Option<String>,
    pub srcdir: Option<String>,
    pub buildpath: Option<String>,
    pub builddir: Option<String>,
    pub arch: Option<String>,
    pub toolchain: Option<String>,
    pub cross_compile: Option<String>,
    pub jobs: Option<usize>,
    pub skip_pull: Option<bool>,
    pub reconfigure: Option<bool>,
    pub baseconfig: Option<String>,
    pub configs: Option<Vec<String>>,
    pub modules: Option<Vec<String>>,
    /// `KEY=VALUE` overrides layered over the profile's `env`
    pub env: Vec<String>,
    pub install_wrapper: Option<String>,
}

/// One fully-resolved build request
///
/// Path fields are absolute and `jobs` is at least one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub profile: String,
    pub srcdir: PathBuf,
    pub buildpath: PathBuf,
    pub builddir: Option<String>,
    pub arch: String,
    pub toolchain: Option<PathBuf>,
    pub cross_compile: Option<String>,
    pub jobs: usize,
    pub skip_pull: bool,
    pub reconfigure: bool,
    pub baseconfig: String,
    pub configs: Vec<PathBuf>,
    pub modules: Vec<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub install_wrapper: Option<String>,
}

/// Merges command line, environment and profile store into a [`BuildConfig`]
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    env: BTreeMap<String, String>,
    cwd: PathBuf,
    default_build_root: PathBuf,
}

/// Name of the environment variable backing `field`
pub fn env_var_name(field: &str) -> String {
    format!("{ENV_PREFIX}_{}", field.to_uppercase())
}

fn first<T>(cli: Option<T>, env: Option<T>, stored: Option<T>) -> Option<T> {
    cli.or(env).or(stored)
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

impl ConfigResolver {
    /// Resolver over an explicit variable set, anchoring relative paths at `cwd`
    pub fn new(env: BTreeMap<String, String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            env,
            cwd: cwd.into(),
            default_build_root: KbuildDirs::new().build_root(),
        }
    }

    /// Resolver over this process's `KBUILD_*` variables and current directory
    pub fn from_process(cwd: impl Into<PathBuf>) -> Self {
        let prefix = format!("{ENV_PREFIX}_");
        let env = std::env::vars()
            .filter(|(k, _)| k.starts_with(&prefix))
            .collect();
        Self::new(env, cwd)
    }

    /// Override the build root used when nothing else sets one
    #[must_use]
    pub fn with_default_build_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.default_build_root = root.into();
        self
    }

    fn env_string(&self, field: &str) -> Option<String> {
        self.env
            .get(&env_var_name(field))
            .cloned()
            .and_then(non_empty)
    }

    fn env_flag(&self, field: &str) -> Option<bool> {
        self.env_string(field).map(|_| true)
    }

    fn env_usize(&self, field: &str) -> Result<Option<usize>, ConfigError> {
        let Some(value) = self.env_string(field) else {
            return Ok(None);
        };
        value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: std::num::ParseIntError| ConfigError::InvalidEnv {
                var: env_var_name(field),
                value,
                reason: e.to_string(),
            })
    }

    fn env_list(&self, field: &str) -> Option<Vec<String>> {
        self.env_string(field).map(|value| {
            std::env::split_paths(&value)
                .map(|p| p.to_string_lossy().into_owned())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }

    fn path(&self, value: &str) -> Result<PathBuf, ConfigError> {
        absolute_path(value, &self.cwd)
    }

    fn paths(&self, values: &[String]) -> Result<Vec<PathBuf>, ConfigError> {
        values.iter().map(|v| self.path(v)).collect()
    }

    /// Name of the profile to use
    pub fn profile_name(&self, cli: &CliOverrides) -> String {
        cli.profile
            .clone()
            .or_else(|| self.env_string("profile"))
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
    }

    /// Resolve every field
    pub fn resolve(
        &self,
        cli: &CliOverrides,
        store: &ProfileStore,
    ) -> Result<BuildConfig, ConfigError> {
        let profile = self.profile_name(cli);
        let stored = store.select(&profile)?;

        let srcdir = match first(cli.srcdir.clone(), self.env_string("srcdir"), stored.srcdir) {
            Some(dir) => self.path(&dir)?,
            None => self.cwd.clone(),
        };
        let buildpath = match first(
            cli.buildpath.clone(),
            self.env_string("buildpath"),
            stored.buildpath,
        ) {
            Some(dir) => self.path(&dir)?,
            None => self.default_build_root.clone(),
        };
        let builddir = first(
            cli.builddir.clone(),
            self.env_string("builddir"),
            stored.builddir,
        )
        .and_then(non_empty);
        let arch = first(cli.arch.clone(), self.env_string("arch"), stored.arch)
            .and_then(non_empty)
            .unwrap_or_else(|| host_kernel_arch().to_string());
        let toolchain = first(
            cli.toolchain.clone(),
            self.env_string("toolchain"),
            stored.toolchain,
        )
        .and_then(non_empty)
        .map(|t| self.path(&t))
        .transpose()?;
        let cross_compile = first(
            cli.cross_compile.clone(),
            self.env_string("cross_compile"),
            stored.cross_compile,
        )
        .and_then(non_empty);
        let jobs = first(cli.jobs, self.env_usize("jobs")?, stored.jobs)
            .unwrap_or_else(default_jobs)
            .max(1);
        let skip_pull = first(cli.skip_pull, self.env_flag("skip_pull"), stored.skip_pull)
            .unwrap_or(false);
        let reconfigure = first(
            cli.reconfigure,
            self.env_flag("reconfigure"),
            stored.reconfigure,
        )
        .unwrap_or(false);
        let baseconfig = first(
            cli.baseconfig.clone(),
            self.env_string("baseconfig"),
            stored.baseconfig,
        )
        .and_then(non_empty)
        .unwrap_or_else(|| DEFAULT_BASE_CONFIG.to_string());
        let configs = first(cli.configs.clone(), self.env_list("configs"), stored.configs)
            .unwrap_or_default();
        let modules = first(cli.modules.clone(), self.env_list("modules"), stored.modules)
            .unwrap_or_default();
        let install_wrapper = first(
            cli.install_wrapper.clone(),
            self.env_string("install_wrapper"),
            stored.install_wrapper,
        )
        .unwrap_or_else(|| DEFAULT_INSTALL_WRAPPER.to_string());

        let mut env = stored.env;
        for entry in &cli.env {
            let (key, value) = entry
                .split_once('=')
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| ConfigError::InvalidEnvOverride(entry.clone()))?;
            env.insert(key.to_string(), value.to_string());
        }

        let config = BuildConfig {
            profile,
            srcdir,
            buildpath,
            builddir,
            arch,
            toolchain,
            cross_compile,
            jobs,
            skip_pull,
            reconfigure,
            baseconfig,
            configs: self.paths(&configs)?,
            modules: self.paths(&modules)?,
            env,
            install_wrapper: non_empty(install_wrapper),
        };
        debug!(?config, "resolved configuration");
        Ok(config)
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }
}
