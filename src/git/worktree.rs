//! Worktree lifecycle for workstream isolation.
//!
//! Each workstream gets a branch `feat/<workstream_id>` and a checkout
//! under `<work_dir>/worktrees/<workstream_id>`, so one agent's changes
//! never touch another's working copy.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

use super::branch::{branch_exists, delete_branch, has_uncommitted_changes, is_branch_merged};
use super::merge::{merge_branch, MergeOutcome};
use super::WorkspaceProvider;

/// An isolated filesystem checkout bound to a dedicated branch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worktree {
    pub workstream_id: String,
    pub path: PathBuf,
    pub branch: String,
}

pub struct WorktreeManager {
    repo_root: PathBuf,
    worktrees_dir: PathBuf,
    /// Branch new worktrees are created from; `None` means HEAD.
    base_branch: Option<String>,
}

pub fn branch_name_for(workstream_id: &str) -> String {
    format!("feat/{workstream_id}")
}

impl WorktreeManager {
    pub fn new(repo_root: PathBuf, work_dir: &Path, base_branch: Option<String>) -> Self {
        Self {
            worktrees_dir: work_dir.join("worktrees"),
            repo_root,
            base_branch,
        }
    }

    pub fn worktree_path(&self, workstream_id: &str) -> PathBuf {
        self.worktrees_dir.join(workstream_id)
    }

    /// Create a new branch and checkout for a workstream.
    ///
    /// Runs: git worktree add -b feat/{workstream} <path> [base]
    /// Fails if the branch already exists: a pre-existing branch means a
    /// previous agent's work would be silently reused.
    pub fn create(&self, workstream_id: &str) -> Result<Worktree> {
        let branch = branch_name_for(workstream_id);
        let path = self.worktree_path(workstream_id);

        if branch_exists(&branch, &self.repo_root)? {
            bail!("branch '{branch}' already exists; remove it before re-running this workstream");
        }
        if path.exists() {
            bail!("worktree already exists at {}", path.display());
        }

        if !self.worktrees_dir.exists() {
            std::fs::create_dir_all(&self.worktrees_dir)
                .context("Failed to create worktrees directory")?;
        }
        self.ensure_work_dir_excluded()?;

        let path_str = path.to_string_lossy().to_string();
        let mut args = vec!["worktree", "add", "-b", branch.as_str(), path_str.as_str()];
        if let Some(base) = &self.base_branch {
            args.push(base);
        }

        let output = Command::new("git")
            .args(&args)
            .current_dir(&self.repo_root)
            .output()
            .context("Failed to execute git worktree add")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git worktree add failed: {stderr}");
        }

        tracing::debug!(workstream_id, branch, path = %path.display(), "created worktree");

        Ok(Worktree {
            workstream_id: workstream_id.to_string(),
            path,
            branch,
        })
    }

    /// Write the work dir into `.git/info/exclude` so the worktree
    /// checkouts and state files never show up as untracked changes at
    /// the repository root. No-op when the work dir lives outside the
    /// repository or the entry is already present.
    fn ensure_work_dir_excluded(&self) -> Result<()> {
        let Some(work_dir) = self.worktrees_dir.parent() else {
            return Ok(());
        };
        let (root, work) = match (self.repo_root.canonicalize(), work_dir.canonicalize()) {
            (Ok(root), Ok(work)) => (root, work),
            _ => return Ok(()),
        };
        let Ok(rel) = work.strip_prefix(&root) else {
            return Ok(());
        };
        let pattern = format!("/{}/", rel.display());

        let exclude = root.join(".git").join("info").join("exclude");
        if let Ok(existing) = std::fs::read_to_string(&exclude) {
            if existing.lines().any(|line| line.trim() == pattern) {
                return Ok(());
            }
        }
        if let Some(parent) = exclude.parent() {
            std::fs::create_dir_all(parent).context("Failed to create .git/info")?;
        }
        let mut contents = std::fs::read_to_string(&exclude).unwrap_or_default();
        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }
        contents.push_str(&pattern);
        contents.push('\n');
        std::fs::write(&exclude, contents).context("Failed to update .git/info/exclude")?;
        tracing::debug!(%pattern, "excluded work dir from repository status");
        Ok(())
    }

    /// Remove a workstream's worktree and, where safe, its branch.
    ///
    /// Refuses to remove a worktree with uncommitted changes unless
    /// forced. The branch is deleted only if merged into the current
    /// branch, unless forced.
    pub fn remove_worktree(&self, workstream_id: &str, force: bool) -> Result<()> {
        let path = self.worktree_path(workstream_id);
        let branch = branch_name_for(workstream_id);

        if !path.exists() {
            bail!("worktree does not exist: {}", path.display());
        }

        if !force && has_uncommitted_changes(&path)? {
            bail!(
                "worktree '{workstream_id}' has uncommitted changes; commit them or pass --force"
            );
        }

        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }

        let output = Command::new("git")
            .args(&args)
            .arg(&path)
            .current_dir(&self.repo_root)
            .output()
            .context("Failed to execute git worktree remove")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git worktree remove failed: {stderr}");
        }

        if branch_exists(&branch, &self.repo_root)? {
            let merged = is_branch_merged(&branch, "HEAD", &self.repo_root).unwrap_or(false);
            if merged || force {
                delete_branch(&branch, &self.repo_root, force)?;
            } else {
                tracing::warn!(branch, "branch left in place: not merged and not forced");
            }
        }

        Ok(())
    }

    /// Drop stale worktree bookkeeping after manual directory removal.
    pub fn prune(&self) -> Result<()> {
        let output = Command::new("git")
            .args(["worktree", "prune"])
            .current_dir(&self.repo_root)
            .output()
            .context("Failed to execute git worktree prune")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git worktree prune failed: {stderr}");
        }

        Ok(())
    }
}

impl WorkspaceProvider for WorktreeManager {
    fn provision(&self, workstream_id: &str) -> Result<Worktree> {
        self.create(workstream_id)
    }

    fn remove(&self, workstream_id: &str, force: bool) -> Result<()> {
        self.remove_worktree(workstream_id, force)
    }

    fn has_uncommitted_changes(&self, workstream_id: &str) -> Result<bool> {
        has_uncommitted_changes(&self.worktree_path(workstream_id))
    }

    fn merge(&self, workstream_id: &str) -> Result<MergeOutcome> {
        merge_branch(&branch_name_for(workstream_id), &self.repo_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_name_format() {
        assert_eq!(branch_name_for("auth-api"), "feat/auth-api");
    }

    #[test]
    fn test_worktree_path_layout() {
        let manager =
            WorktreeManager::new(PathBuf::from("/repo"), Path::new("/repo/.weft"), None);
        assert_eq!(
            manager.worktree_path("auth"),
            PathBuf::from("/repo/.weft/worktrees/auth")
        );
    }
}
