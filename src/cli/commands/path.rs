//! Path command implementation
//!
//! Implements `kbuild path`: print where the current tree builds to.

use anyhow::Result;

use crate::cli::output;
use crate::core::layout::BuildLayout;
use crate::core::resolver::BuildConfig;
use crate::infra::git::GitTree;

/// Which path to print
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    BuildDir,
    Image,
    Config,
}

/// Execute the path command
pub fn execute(config: &BuildConfig, kind: PathKind, json: bool) -> Result<()> {
    let tree = GitTree::new(&config.srcdir);
    let mut layout = BuildLayout::new(config);
    let build_dir = layout.resolve_build_dir(&tree)?;

    let path = match kind {
        PathKind::BuildDir => Some(build_dir),
        PathKind::Image => layout.kernel_image_path(),
        PathKind::Config => layout.config_path(),
    }
    .unwrap_or_default();

    output::print_path(&path, json)
}
