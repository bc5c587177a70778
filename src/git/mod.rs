//! Git operations for workstream isolation
//!
//! This module provides:
//! - Worktree creation/removal for parallel workstream execution
//! - Branch helpers for workstream isolation
//! - Merge operations for integrating completed work

pub mod branch;
pub mod merge;
pub mod worktree;

use anyhow::Result;
use std::path::PathBuf;

pub use branch::{
    branch_exists, current_branch, delete_branch, has_uncommitted_changes, is_branch_merged,
};
pub use merge::{merge_branch, MergeOutcome};
pub use worktree::{Worktree, WorktreeManager};

/// Seam between the scheduler/merge coordinator and the version-control
/// worktree capability. Tests substitute an in-memory implementation.
pub trait WorkspaceProvider: Send + Sync {
    /// Create the isolated branch + checkout for a workstream. Fails if the
    /// workstream's branch already exists.
    fn provision(&self, workstream_id: &str) -> Result<Worktree>;

    /// Remove a workstream's worktree. Refuses on uncommitted changes
    /// unless `force`; deletes the branch only when merged, unless forced.
    fn remove(&self, workstream_id: &str, force: bool) -> Result<()>;

    /// Whether the workstream's checkout has uncommitted changes.
    fn has_uncommitted_changes(&self, workstream_id: &str) -> Result<bool>;

    /// Merge the workstream's branch into the currently checked-out branch.
    /// Conflicts abort the merge and leave the repository clean.
    fn merge(&self, workstream_id: &str) -> Result<MergeOutcome>;
}

/// Check that git is installed and usable.
pub fn check_git_available() -> Result<PathBuf> {
    which::which("git").map_err(|_| {
        anyhow::anyhow!("git is not installed or not on PATH; it is required for worktree isolation")
    })
}
