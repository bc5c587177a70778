//! Branch-level git helpers used by the worktree manager and merge path.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;

/// Check if a branch exists locally.
pub fn branch_exists(branch: &str, repo_root: &Path) -> Result<bool> {
    let output = Command::new("git")
        .args(["rev-parse", "--verify", "--quiet"])
        .arg(format!("refs/heads/{branch}"))
        .current_dir(repo_root)
        .output()
        .context("Failed to execute git rev-parse")?;

    Ok(output.status.success())
}

/// Name of the currently checked-out branch.
pub fn current_branch(repo_root: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["branch", "--show-current"])
        .current_dir(repo_root)
        .output()
        .context("Failed to execute git branch --show-current")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git branch --show-current failed: {stderr}");
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Whether `branch` has been merged into `into`.
pub fn is_branch_merged(branch: &str, into: &str, repo_root: &Path) -> Result<bool> {
    let output = Command::new("git")
        .args(["merge-base", "--is-ancestor", branch, into])
        .current_dir(repo_root)
        .output()
        .context("Failed to execute git merge-base")?;

    Ok(output.status.success())
}

/// Delete a local branch. `force` uses `-D` (unmerged work is discarded).
pub fn delete_branch(branch: &str, repo_root: &Path, force: bool) -> Result<()> {
    let flag = if force { "-D" } else { "-d" };
    let output = Command::new("git")
        .args(["branch", flag, branch])
        .current_dir(repo_root)
        .output()
        .context("Failed to execute git branch delete")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git branch {flag} {branch} failed: {stderr}");
    }

    Ok(())
}

/// Whether a working copy has uncommitted changes (staged, unstaged, or
/// untracked).
pub fn has_uncommitted_changes(work_dir: &Path) -> Result<bool> {
    let output = Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(work_dir)
        .output()
        .context("Failed to execute git status")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git status failed: {stderr}");
    }

    Ok(!output.stdout.is_empty())
}
