//! Profile store
//!
//! Named build profiles read from `~/.config/kbuild`:
//!
//! ```yaml
//! Common:
//!   buildpath: ~/.cache/kbuild
//! Profiles:
//!   arm64:
//!     srcdir: ~/src/linux
//!     arch: arm64
//!     cross_compile: aarch64-linux-gnu-
//!     configs: [~/kconfig/debug.config]
//! ```
//!
//! Values missing from a profile fall back to the `Common` section.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::defaults::DEFAULT_PROFILE;
use crate::error::ConfigError;

/// Stored values for one profile; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
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
    pub env: BTreeMap<String, String>,
    pub install_wrapper: Option<String>,
}

impl Profile {
    /// Fill unset fields from `common`; `env` maps merge with `self` winning
    #[must_use]
    pub fn with_fallback(self, common: &Profile) -> Self {
        let mut env = common.env.clone();
        env.extend(self.env);
        Self {
            srcdir: self.srcdir.or_else(|| common.srcdir.clone()),
            buildpath: self.buildpath.or_else(|| common.buildpath.clone()),
            builddir: self.builddir.or_else(|| common.builddir.clone()),
            arch: self.arch.or_else(|| common.arch.clone()),
            toolchain: self.toolchain.or_else(|| common.toolchain.clone()),
            cross_compile: self.cross_compile.or_else(|| common.cross_compile.clone()),
            jobs: self.jobs.or(common.jobs),
            skip_pull: self.skip_pull.or(common.skip_pull),
            reconfigure: self.reconfigure.or(common.reconfigure),
            baseconfig: self.baseconfig.or_else(|| common.baseconfig.clone()),
            configs: self.configs.or_else(|| common.configs.clone()),
            modules: self.modules.or_else(|| common.modules.clone()),
            env,
            install_wrapper: self
                .install_wrapper
                .or_else(|| common.install_wrapper.clone()),
        }
    }
}

/// Mapping from profile name to stored profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStore {
    #[serde(rename = "Common", default)]
    pub common: Profile,

    #[serde(rename = "Profiles", default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl ProfileStore {
    /// Load the store from `path`; a missing file is an empty store
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadStore {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_yaml(&content).map_err(|e| ConfigError::ParseStore {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse a store from YAML text; empty text is an empty store
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Known profile names, sorted
    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    /// Select a profile, merged over `Common`
    ///
    /// The reserved default name yields an empty profile when the store has
    /// none; any other unknown name is an error listing the known names.
    pub fn select(&self, name: &str) -> Result<Profile, ConfigError> {
        match self.profiles.get(name) {
            Some(profile) => Ok(profile.clone().with_fallback(&self.common)),
            None if name == DEFAULT_PROFILE => Ok(Profile::default().with_fallback(&self.common)),
            None => Err(ConfigError::ProfileNotFound {
                name: name.to_string(),
                available: self.names(),
            }),
        }
    }
}
