//! Platform-specific directory management
//!
//! Provides the profile store location and the default build root, and
//! turns user-supplied paths (`~/linux`, `../frags/debug.config`) into
//! absolute paths.
//!
//! Follows XDG Base Directory Specification on Linux and standard locations on macOS.

use std::env;
use std::path::{Component, Path, PathBuf};

use crate::error::ConfigError;

/// Application name used in directory paths
const APP_NAME: &str = "kbuild";

/// Platform-specific directory provider for kbuild
#[derive(Debug, Clone)]
pub struct KbuildDirs {
    config_dir: PathBuf,
    cache_dir: PathBuf,
}

impl KbuildDirs {
    /// Create a new `KbuildDirs` instance from platform defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_dir: Self::platform_config_dir(),
            cache_dir: Self::platform_cache_dir(),
        }
    }

    /// Get the profile store path
    ///
    /// - Linux: `$XDG_CONFIG_HOME/kbuild` or `~/.config/kbuild`
    /// - macOS: `~/Library/Application Support/kbuild`
    #[must_use]
    pub fn profile_store_path(&self) -> PathBuf {
        self.config_dir.join(APP_NAME)
    }

    /// Get the default root under which build directories are created
    ///
    /// - Linux: `$XDG_CACHE_HOME/kbuild` or `~/.cache/kbuild`
    /// - macOS: `~/Library/Caches/kbuild`
    #[must_use]
    pub fn build_root(&self) -> PathBuf {
        self.cache_dir.join(APP_NAME)
    }

    fn platform_config_dir() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".config"))
                .unwrap_or_else(|| PathBuf::from(".").join(".config"))
        })
    }

    fn platform_cache_dir() -> PathBuf {
        dirs::cache_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".cache"))
                .unwrap_or_else(|| PathBuf::from(".").join(".cache"))
        })
    }
}

impl Default for KbuildDirs {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> Result<PathBuf, ConfigError> {
    let rest = if path == "~" {
        ""
    } else if let Some(rest) = path.strip_prefix("~/") {
        rest
    } else {
        return Ok(PathBuf::from(path));
    };

    let home = dirs::home_dir().ok_or_else(|| ConfigError::NoHomeDir {
        path: path.to_string(),
    })?;
    Ok(if rest.is_empty() { home } else { home.join(rest) })
}

/// Expand `~` and anchor relative paths at `base`
///
/// The result is normalized lexically, so `..` and `.` never survive into
/// a path whose last component names the directory.
pub fn absolute_path(path: &str, base: &Path) -> Result<PathBuf, ConfigError> {
    let expanded = expand_home(path)?;
    if expanded.is_absolute() {
        Ok(normalize(&expanded))
    } else {
        Ok(normalize(&base.join(expanded)))
    }
}

/// Resolve `.` and `..` components without touching the filesystem
///
/// `..` at the root stays at the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}

/// Current working directory as a `ConfigError`-typed result
pub fn current_dir() -> Result<PathBuf, ConfigError> {
    env::current_dir().map_err(|e| ConfigError::CurrentDir {
        error: e.to_string(),
    })
}
