//! Build directory layout
//!
//! Every source tree, branch, architecture and profile combination gets its
//! own output directory under the build root:
//!
//! ```text
//! <buildpath>/<source-basename>.<branch-or-revision>.<arch>[.<profile>]
//! ```
//!
//! The profile suffix is omitted for the default profile. An explicit
//! build directory name replaces the derived identity, but must be a single
//! path segment.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::config::defaults::{CONFIG_ARTIFACT, DEFAULT_PROFILE};
use crate::core::kernel::{image_name, source_arch};
use crate::core::resolver::BuildConfig;
use crate::core::tree::SourceTree;
use crate::error::{DirectoryError, KbuildError, VcsError};
use crate::infra::dirs::normalize;

/// Derives, caches and creates the build directory for one build
#[derive(Debug, Clone)]
pub struct BuildLayout {
    buildpath: PathBuf,
    srcdir: PathBuf,
    arch: String,
    profile: String,
    explicit: Option<String>,
    resolved: Option<PathBuf>,
}

impl BuildLayout {
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            buildpath: config.buildpath.clone(),
            srcdir: normalize(&config.srcdir),
            arch: config.arch.clone(),
            profile: config.profile.clone(),
            explicit: config.builddir.clone(),
            resolved: None,
        }
    }

    /// `<basename>.<branch-or-revision>.<arch>[.<profile>]`
    pub fn derive_identity<T: SourceTree>(&self, tree: &T) -> Result<String, VcsError> {
        let basename = self
            .srcdir
            .file_name()
            .map_or_else(|| "linux".into(), |n| n.to_string_lossy());
        let head = tree.head_label()?.dir_component();

        let mut identity = format!("{basename}.{head}.{}", self.arch);
        if self.profile != DEFAULT_PROFILE {
            identity.push('.');
            identity.push_str(&self.profile.replace('/', "-"));
        }
        Ok(identity)
    }

    /// Absolute build directory; computed once, then reused
    pub fn resolve_build_dir<T: SourceTree>(&mut self, tree: &T) -> Result<PathBuf, KbuildError> {
        if let Some(dir) = &self.resolved {
            return Ok(dir.clone());
        }

        let name = match &self.explicit {
            Some(name) => {
                validate_segment(name)?;
                name.clone()
            }
            None => self.derive_identity(tree)?,
        };
        let dir = self.buildpath.join(name);
        debug!(build_dir = %dir.display(), "resolved build directory");
        self.resolved = Some(dir.clone());
        Ok(dir)
    }

    /// Create the build directory and its parents; existing directories are fine
    pub fn ensure<T: SourceTree>(&mut self, tree: &T) -> Result<PathBuf, KbuildError> {
        let dir = self.resolve_build_dir(tree)?;
        fs::create_dir_all(&dir).map_err(|e| DirectoryError::Create {
            path: dir.clone(),
            error: e.to_string(),
        })?;
        Ok(dir)
    }

    /// Cached build directory, if already resolved
    pub fn build_dir(&self) -> Option<&Path> {
        self.resolved.as_deref()
    }

    /// Kconfig artifact inside the resolved build directory
    pub fn config_path(&self) -> Option<PathBuf> {
        self.build_dir().map(|d| d.join(CONFIG_ARTIFACT))
    }

    /// Boot image produced by a default build
    pub fn kernel_image_path(&self) -> Option<PathBuf> {
        self.build_dir().map(|d| {
            d.join("arch")
                .join(source_arch(&self.arch))
                .join("boot")
                .join(image_name(&self.arch))
        })
    }
}

fn validate_segment(name: &str) -> Result<(), DirectoryError> {
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if single && !name.contains('/') && !name.contains(std::path::MAIN_SEPARATOR) {
        Ok(())
    } else {
        Err(DirectoryError::NotASingleSegment {
            name: name.to_string(),
        })
    }
}
