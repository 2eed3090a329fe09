//! Git operations
//!
//! Reads HEAD and worktree status of a kernel source tree and fast-forwards
//! its current branch from the default remote, using the gix crate.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gix::bstr::BStr;
use gix::index::entry::Mode;
use gix::index::State;
use gix::refs::transaction::PreviousValue;
use gix::remote::Direction;
use gix::ObjectId;
use tracing::{debug, info, warn};

use crate::core::tree::{HeadLabel, PullOutcome, SourceTree};
use crate::error::VcsError;

/// Reflog identity for hosts without `user.name`/`user.email`
///
/// Only consulted when no committer is configured anywhere.
const FALLBACK_COMMITTER: [&str; 2] = [
    "gitoxide.committer.nameFallback=kbuild",
    "gitoxide.committer.emailFallback=kbuild@localhost",
];

/// A source tree backed by a git repository
///
/// The repository is reopened per operation; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct GitTree {
    path: PathBuf,
}

impl GitTree {
    /// Create a handle for the worktree at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open(&self) -> Result<gix::Repository, VcsError> {
        self.open_with(gix::open::Options::default())
    }

    /// Open the repository, adding a fallback committer if none is configured
    fn open_with(&self, options: gix::open::Options) -> Result<gix::Repository, VcsError> {
        let repo = gix::open_opts(&self.path, options.clone()).map_err(|e| self.open_error(e))?;
        if repo.committer().is_some() {
            return Ok(repo);
        }
        debug!(path = %self.path.display(), "no committer configured, using fallback identity");
        gix::open_opts(&self.path, options.config_overrides(FALLBACK_COMMITTER))
            .map_err(|e| self.open_error(e))
    }

    fn open_error(&self, e: impl ToString) -> VcsError {
        VcsError::Open {
            path: self.path.clone(),
            error: e.to_string(),
        }
    }

    fn head_error(&self, e: impl ToString) -> VcsError {
        VcsError::Head {
            path: self.path.clone(),
            error: e.to_string(),
        }
    }

    fn checkout_error(&self, e: impl ToString) -> VcsError {
        VcsError::Checkout {
            path: self.path.clone(),
            error: e.to_string(),
        }
    }

    fn head_id(&self, repo: &gix::Repository) -> Result<ObjectId, VcsError> {
        repo.head_id()
            .map(gix::Id::detach)
            .map_err(|e| self.head_error(e))
    }

    /// Fetch from the default remote, returning the remote's name
    fn fetch(&self, repo: &gix::Repository) -> Result<String, VcsError> {
        let remote = repo
            .find_default_remote(Direction::Fetch)
            .ok_or_else(|| VcsError::NoRemote {
                path: self.path.clone(),
            })?
            .map_err(|e| fetch_error("default", e))?;
        let name = remote
            .name()
            .map_or_else(|| "origin".to_string(), |n| n.as_bstr().to_string());
        debug!(remote = %name, "fetching");
        remote
            .connect(Direction::Fetch)
            .map_err(|e| fetch_error(&name, e))?
            .prepare_fetch(gix::progress::Discard, Default::default())
            .map_err(|e| fetch_error(&name, e))?
            .receive(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
            .map_err(|e| fetch_error(&name, e))?;

        Ok(name)
    }

    /// Best common ancestor of `one` and `two`, if the histories meet
    fn merge_base(
        &self,
        repo: &gix::Repository,
        one: ObjectId,
        two: ObjectId,
    ) -> Result<Option<ObjectId>, VcsError> {
        match repo.merge_base(one, two) {
            Ok(id) => Ok(Some(id.detach())),
            Err(gix::repository::merge_base::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(self.head_error(e)),
        }
    }

    /// Index for the tree of commit `target`
    fn index_for(&self, repo: &gix::Repository, target: ObjectId) -> Result<gix::index::File, VcsError> {
        let tree_id = repo
            .find_object(target)
            .map_err(|e| self.checkout_error(e))?
            .try_into_commit()
            .map_err(|e| self.checkout_error(e))?
            .tree_id()
            .map_err(|e| self.checkout_error(e))?;
        repo.index_from_tree(&tree_id)
            .map_err(|e| self.checkout_error(e))
    }

    /// Refuse plans that would overwrite content git does not track
    ///
    /// Runs before anything on disk changes.
    fn check_plan(&self, repo: &gix::Repository, plan: &WorktreePlan) -> Result<(), VcsError> {
        let removed: HashSet<&Path> = plan.remove.iter().map(PathBuf::as_path).collect();
        for (rel, id, _) in &plan.write {
            if !repo.has_object(id) {
                return Err(self.checkout_error(format!("object {id} for '{}' is missing", rel.display())));
            }
            // A file where a directory must go
            for ancestor in rel.ancestors().skip(1) {
                if ancestor.as_os_str().is_empty() {
                    break;
                }
                let path = self.path.join(ancestor);
                if let Ok(meta) = fs::symlink_metadata(&path) {
                    if !meta.is_dir() && !removed.contains(ancestor) {
                        return Err(VcsError::WouldClobber { path });
                    }
                }
            }
            // A directory where a file must go
            let path = self.path.join(rel);
            if let Ok(meta) = fs::symlink_metadata(&path) {
                let only_tracked = meta.is_dir()
                    && tracked_only_below(&self.path, rel, &removed)
                        .map_err(|e| self.checkout_error(e))?;
                if meta.is_dir() && !only_tracked {
                    return Err(VcsError::WouldClobber { path });
                }
            }
        }
        Ok(())
    }

    /// Delete, then write
    ///
    /// Deleting first clears paths whose kind changes between file and
    /// directory.
    fn apply(&self, repo: &gix::Repository, plan: &WorktreePlan) -> Result<(), VcsError> {
        for rel in &plan.remove {
            match fs::remove_file(self.path.join(rel)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(self.checkout_error(e)),
            }
            prune_empty_parents(&self.path, rel);
        }
        for (rel, id, mode) in &plan.write {
            let object = repo.find_object(*id).map_err(|e| self.checkout_error(e))?;
            write_entry(&self.path.join(rel), *mode, &object.data)
                .map_err(|e| self.checkout_error(format!("{}: {e}", rel.display())))?;
        }
        debug!(
            written = plan.write.len(),
            removed = plan.remove.len(),
            "worktree updated"
        );
        Ok(())
    }

    /// Undo a partially applied update
    ///
    /// Best effort: failures are logged, and the caller reports the error
    /// that caused the rollback.
    fn restore(
        &self,
        repo: &gix::Repository,
        applied: &State,
        mut previous: gix::index::File,
        rewrite_index: bool,
    ) {
        let back = WorktreePlan::between(applied, &previous);
        if let Err(e) = self.apply(repo, &back) {
            warn!(error = %e, "failed to restore worktree after aborted pull");
        }
        if rewrite_index {
            if let Err(e) = previous.write(gix::index::write::Options::default()) {
                warn!(error = %e, "failed to restore index after aborted pull");
            }
        }
    }

    /// Move worktree, index and branch ref to `target`
    ///
    /// Only valid on a clean worktree. Any failure after the first write
    /// puts the worktree back as it was.
    fn fast_forward(
        &self,
        repo: &gix::Repository,
        reference: &str,
        before: ObjectId,
        target: ObjectId,
    ) -> Result<(), VcsError> {
        let previous = repo.index_or_empty().map_err(|e| self.checkout_error(e))?;
        let previous = gix::index::File::clone(&previous);
        let mut next = self.index_for(repo, target)?;

        let plan = WorktreePlan::between(&previous, &next);
        self.check_plan(repo, &plan)?;

        if let Err(e) = self.apply(repo, &plan) {
            self.restore(repo, &next, previous, false);
            return Err(e);
        }
        if let Err(e) = next.write(gix::index::write::Options::default()) {
            self.restore(repo, &next, previous, false);
            return Err(self.checkout_error(e));
        }
        if let Err(e) = repo.reference(
            reference,
            target,
            PreviousValue::MustExistAndMatch(before.into()),
            format!("pull: fast-forward {before} -> {target}"),
        ) {
            self.restore(repo, &next, previous, true);
            return Err(VcsError::UpdateRef {
                reference: reference.to_string(),
                error: e.to_string(),
            });
        }
        Ok(())
    }
}

/// Worktree edits that turn one index into another
#[derive(Debug, Default)]
struct WorktreePlan {
    /// Tracked paths to delete
    remove: Vec<PathBuf>,
    /// Paths to write, with their blob and mode
    write: Vec<(PathBuf, ObjectId, Mode)>,
}

impl WorktreePlan {
    fn between(from: &State, to: &State) -> Self {
        let mut old: HashMap<&BStr, (ObjectId, Mode)> = from
            .entries()
            .iter()
            .map(|e| (e.path(from), (e.id, e.mode)))
            .collect();

        let mut plan = Self::default();
        for entry in to.entries() {
            let rel = entry.path(to);
            let unchanged = old.remove(rel) == Some((entry.id, entry.mode));
            // Submodules are left to the user
            if unchanged || entry.mode == Mode::COMMIT {
                continue;
            }
            plan.write.push((worktree_path(rel), entry.id, entry.mode));
        }
        plan.remove = old
            .into_iter()
            .filter(|(_, (_, mode))| *mode != Mode::COMMIT)
            .map(|(rel, _)| worktree_path(rel))
            .collect();
        plan.remove.sort();
        plan
    }
}

fn worktree_path(rel: &BStr) -> PathBuf {
    gix::path::from_bstr(rel).into_owned()
}

/// True if every file below `rel` is about to be removed
fn tracked_only_below(root: &Path, rel: &Path, removed: &HashSet<&Path>) -> io::Result<bool> {
    for entry in fs::read_dir(root.join(rel))? {
        let entry = entry?;
        let child = rel.join(entry.file_name());
        let tracked = if entry.file_type()?.is_dir() {
            tracked_only_below(root, &child, removed)?
        } else {
            removed.contains(child.as_path())
        };
        if !tracked {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Remove directories emptied by deleting `rel`, innermost first
fn prune_empty_parents(root: &Path, rel: &Path) {
    for dir in rel.ancestors().skip(1) {
        if dir.as_os_str().is_empty() {
            break;
        }
        match fs::remove_dir(root.join(dir)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            // Not empty; nothing above it can be either
            Err(_) => break,
        }
    }
}

fn fetch_error(remote: &str, e: impl ToString) -> VcsError {
    VcsError::Fetch {
        remote: remote.to_string(),
        error: e.to_string(),
    }
}

fn write_entry(dest: &Path, mode: Mode, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    // Replace, never write through an old symlink
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => fs::remove_dir(dest)?,
        Ok(_) => fs::remove_file(dest)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    if mode == Mode::SYMLINK {
        #[cfg(unix)]
        {
            use std::os::unix::ffi::OsStrExt;
            let target = std::ffi::OsStr::from_bytes(data);
            return std::os::unix::fs::symlink(target, dest);
        }
    }
    fs::write(dest, data)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = if mode == Mode::FILE_EXECUTABLE { 0o755 } else { 0o644 };
        fs::set_permissions(dest, fs::Permissions::from_mode(perms))?;
    }
    Ok(())
}

impl SourceTree for GitTree {
    fn path(&self) -> &Path {
        &self.path
    }

    fn current_revision(&self) -> Result<String, VcsError> {
        let repo = self.open()?;
        Ok(self.head_id(&repo)?.to_string())
    }

    fn head_label(&self) -> Result<HeadLabel, VcsError> {
        let repo = self.open()?;
        match repo.head_name().map_err(|e| self.head_error(e))? {
            Some(name) => Ok(HeadLabel::Branch(name.shorten().to_string())),
            None => Ok(HeadLabel::Detached(self.head_id(&repo)?.to_string())),
        }
    }

    fn is_clean(&self) -> Result<bool, VcsError> {
        let repo = self.open()?;
        let dirty = repo.is_dirty().map_err(|e| VcsError::Status {
            path: self.path.clone(),
            error: e.to_string(),
        })?;
        Ok(!dirty)
    }

    fn pull(&self) -> Result<PullOutcome, VcsError> {
        let repo = self.open()?;
        let head_name = repo
            .head_name()
            .map_err(|e| self.head_error(e))?
            .ok_or_else(|| VcsError::DetachedHead {
                path: self.path.clone(),
            })?;
        let branch = head_name.shorten().to_string();
        let before = self.head_id(&repo)?;

        let remote = self.fetch(&repo)?;

        let upstream = format!("refs/remotes/{remote}/{branch}");
        let after = repo
            .find_reference(upstream.as_str())
            .map_err(|_| VcsError::UpstreamNotFound {
                reference: upstream.clone(),
            })?
            .peel_to_commit()
            .map_err(|e| self.head_error(e))?
            .id;

        if after == before {
            debug!(%branch, "already up to date");
            return Ok(PullOutcome::UpToDate);
        }
        let base = self.merge_base(&repo, before, after)?;
        if base == Some(after) {
            debug!(%branch, "local branch is ahead of upstream");
            return Ok(PullOutcome::UpToDate);
        }
        if base != Some(before) {
            return Err(VcsError::NotFastForward { branch, upstream });
        }

        let reference = head_name.as_bstr().to_string();
        self.fast_forward(&repo, &reference, before, after)?;

        info!(%branch, from = %before, to = %after, "fast-forwarded");
        Ok(PullOutcome::FastForwarded {
            from: before.to_string(),
            to: after.to_string(),
        })
    }
}
