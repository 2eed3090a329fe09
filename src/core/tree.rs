//! Source tree state tracking
//!
//! Decides whether a build must start from a refreshed tree. Dirty trees are
//! never pulled, so local work is never clobbered.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::defaults::SHORT_REVISION_LEN;
use crate::error::VcsError;

/// What HEAD points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadLabel {
    /// Short branch name (e.g., "master")
    Branch(String),
    /// Full revision of a detached HEAD
    Detached(String),
}

impl HeadLabel {
    /// Name used in build directory identities
    ///
    /// Branch separators become `-` so the identity stays a single path
    /// segment; detached heads use an abbreviated revision.
    pub fn dir_component(&self) -> String {
        match self {
            Self::Branch(name) => name.replace('/', "-"),
            Self::Detached(rev) => rev.chars().take(SHORT_REVISION_LEN).collect(),
        }
    }
}

/// Result of a pull attempt that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Nothing new upstream
    UpToDate,
    /// The branch moved forward
    FastForwarded { from: String, to: String },
}

/// Whether the tree changed under the build directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PullState {
    Updated,
    Unchanged,
}

impl fmt::Display for PullState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Updated => f.write_str("updated"),
            Self::Unchanged => f.write_str("unchanged"),
        }
    }
}

/// A version-controlled source directory
pub trait SourceTree {
    /// Worktree root
    fn path(&self) -> &Path;

    /// Identifier of the commit HEAD resolves to
    fn current_revision(&self) -> Result<String, VcsError>;

    /// Branch HEAD is on, or its revision when detached
    fn head_label(&self) -> Result<HeadLabel, VcsError>;

    /// True iff the worktree has no uncommitted changes to tracked files
    fn is_clean(&self) -> Result<bool, VcsError>;

    /// Fast-forward the current branch from its default remote
    fn pull(&self) -> Result<PullOutcome, VcsError>;
}

/// Per-build view of a source tree: before/after revisions and pull state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreeState {
    pub revision_before: Option<String>,
    pub revision_after: Option<String>,
    pub is_clean: Option<bool>,
    pub pull_performed: bool,
}

impl TreeState {
    /// Updated iff a pull ran on a clean tree and moved HEAD
    pub fn pull_state(&self) -> PullState {
        let moved = matches!(
            (&self.revision_before, &self.revision_after),
            (Some(before), Some(after)) if before != after
        );
        if self.pull_performed && self.is_clean == Some(true) && moved {
            PullState::Updated
        } else {
            PullState::Unchanged
        }
    }
}

/// Wraps a [`SourceTree`] with the update policy
#[derive(Debug)]
pub struct SourceTreeTracker<T> {
    tree: T,
    state: TreeState,
}

impl<T: SourceTree> SourceTreeTracker<T> {
    pub fn new(tree: T) -> Self {
        Self {
            tree,
            state: TreeState::default(),
        }
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    /// State recorded by the last [`update`](Self::update)
    pub fn state(&self) -> &TreeState {
        &self.state
    }

    pub fn current_revision(&self) -> Result<String, VcsError> {
        self.tree.current_revision()
    }

    pub fn is_clean(&self) -> Result<bool, VcsError> {
        self.tree.is_clean()
    }

    /// Bring the tree up to date unless skipped or dirty
    pub fn update(&mut self, skip: bool) -> Result<PullState, VcsError> {
        self.state = TreeState::default();
        if skip {
            info!("pull skipped");
            return Ok(PullState::Unchanged);
        }

        let before = self.tree.current_revision()?;
        self.state.revision_before = Some(before.clone());

        let clean = self.tree.is_clean()?;
        self.state.is_clean = Some(clean);
        if !clean {
            warn!(
                path = %self.tree.path().display(),
                "source tree has uncommitted changes; not pulling"
            );
            return Ok(PullState::Unchanged);
        }

        self.state.pull_performed = true;
        if self.tree.pull()? == PullOutcome::UpToDate {
            self.state.revision_after = Some(before);
            return Ok(PullState::Unchanged);
        }

        let after = self.tree.current_revision()?;
        info!(from = %before, to = %after, "source tree updated");
        self.state.revision_after = Some(after);
        Ok(self.state.pull_state())
    }
}
