//! Merging workstream branches into the checked-out base branch.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;

use super::branch::branch_exists;

/// Result of one merge attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Merge commit created.
    Merged {
        files_changed: u32,
        insertions: u32,
        deletions: u32,
    },
    /// Branch was a descendant; no merge commit needed.
    FastForward,
    /// Nothing to merge.
    AlreadyUpToDate,
    /// Merge hit conflicts and was aborted; the repository is left clean.
    Conflict { files: Vec<String> },
}

impl MergeOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, MergeOutcome::Conflict { .. })
    }
}

/// Merge `branch` into the currently checked-out branch. Fast-forwards
/// when the branch is a strict descendant; otherwise creates a merge
/// commit.
///
/// On conflict the merge is aborted before returning, so a conflicting
/// branch never leaves a half-merged tree behind. The caller decides
/// whether to retry manually.
pub fn merge_branch(branch: &str, repo_root: &Path) -> Result<MergeOutcome> {
    if !branch_exists(branch, repo_root)? {
        bail!("branch '{branch}' does not exist");
    }

    let output = Command::new("git")
        .args(["merge", "-m"])
        .arg(format!("Merge {branch}"))
        .arg(branch)
        .current_dir(repo_root)
        .output()
        .context("Failed to execute git merge")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if output.status.success() {
        if stdout.contains("Already up to date") || stdout.contains("Already up-to-date") {
            return Ok(MergeOutcome::AlreadyUpToDate);
        }
        if stdout.contains("Fast-forward") {
            return Ok(MergeOutcome::FastForward);
        }
        let (files_changed, insertions, deletions) = parse_merge_stats(&stdout);
        return Ok(MergeOutcome::Merged {
            files_changed,
            insertions,
            deletions,
        });
    }

    if stdout.contains("CONFLICT") || stderr.contains("CONFLICT") {
        let files = conflicting_files(repo_root)?;
        abort_merge(repo_root).ok();
        return Ok(MergeOutcome::Conflict { files });
    }

    bail!("git merge failed: {stderr}");
}

/// Abort a merge in progress, restoring the pre-merge tree.
pub fn abort_merge(repo_root: &Path) -> Result<()> {
    let output = Command::new("git")
        .args(["merge", "--abort"])
        .current_dir(repo_root)
        .output()
        .context("Failed to execute git merge --abort")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git merge --abort failed: {stderr}");
    }

    Ok(())
}

fn conflicting_files(repo_root: &Path) -> Result<Vec<String>> {
    let output = Command::new("git")
        .args(["diff", "--name-only", "--diff-filter=U"])
        .current_dir(repo_root)
        .output()
        .context("Failed to list conflicting files")?;

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Parse "N files changed, M insertions(+), K deletions(-)" from merge output.
fn parse_merge_stats(output: &str) -> (u32, u32, u32) {
    let mut files_changed = 0u32;
    let mut insertions = 0u32;
    let mut deletions = 0u32;

    for line in output.lines() {
        if line.contains("file changed") || line.contains("files changed") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            for (i, part) in parts.iter().enumerate() {
                if (*part == "file" || *part == "files") && i > 0 {
                    files_changed = parts[i - 1].parse().unwrap_or(0);
                }
                if part.contains("insertion") && i > 0 {
                    insertions = parts[i - 1].parse().unwrap_or(0);
                }
                if part.contains("deletion") && i > 0 {
                    deletions = parts[i - 1].parse().unwrap_or(0);
                }
            }
        }
    }

    (files_changed, insertions, deletions)
}
