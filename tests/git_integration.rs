//! Worktree and merge behavior against real git repositories.
//!
//! Each test builds its own repository in a TempDir; nothing touches the
//! host checkout.

use serial_test::serial;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use weft::git::{
    branch_exists, has_uncommitted_changes, merge_branch, MergeOutcome, WorktreeManager,
};

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git should run");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

fn init_repo() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir(&repo).unwrap();

    git(&repo, &["init", "-b", "main"]);
    git(&repo, &["config", "user.email", "test@example.com"]);
    git(&repo, &["config", "user.name", "Test"]);

    std::fs::write(repo.join("shared.txt"), "base\n").unwrap();
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-m", "initial"]);

    (dir, repo)
}

fn manager(repo: &Path) -> WorktreeManager {
    WorktreeManager::new(repo.to_path_buf(), &repo.join(".weft"), None)
}

fn commit_file(dir: &Path, name: &str, content: &str, message: &str) {
    std::fs::write(dir.join(name), content).unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", message]);
}

#[test]
#[serial]
fn test_create_worktree_makes_branch_and_checkout() {
    let (_dir, repo) = init_repo();
    let manager = manager(&repo);

    let worktree = manager.create("auth").unwrap();
    assert_eq!(worktree.branch, "feat/auth");
    assert!(worktree.path.join("shared.txt").exists());
    assert!(branch_exists("feat/auth", &repo).unwrap());

    // A second create for the same workstream must refuse: the branch
    // already carries (potentially stale) work.
    assert!(manager.create("auth").is_err());
}

#[test]
#[serial]
fn test_remove_refuses_uncommitted_changes_unless_forced() {
    let (_dir, repo) = init_repo();
    let manager = manager(&repo);

    let worktree = manager.create("auth").unwrap();
    std::fs::write(worktree.path.join("wip.txt"), "half-done\n").unwrap();
    assert!(has_uncommitted_changes(&worktree.path).unwrap());

    let err = manager.remove_worktree("auth", false).unwrap_err();
    assert!(err.to_string().contains("uncommitted"));
    assert!(worktree.path.exists());

    manager.remove_worktree("auth", true).unwrap();
    assert!(!worktree.path.exists());
    assert!(!branch_exists("feat/auth", &repo).unwrap());
}

#[test]
#[serial]
fn test_merge_creates_merge_commit_with_stats() {
    let (_dir, repo) = init_repo();
    let manager = manager(&repo);

    let worktree = manager.create("auth").unwrap();
    commit_file(&worktree.path, "auth.txt", "auth module\n", "add auth");
    // Main moves on independently, so the histories diverge.
    commit_file(&repo, "docs.txt", "notes\n", "add docs");

    let outcome = merge_branch("feat/auth", &repo).unwrap();
    let MergeOutcome::Merged { files_changed, .. } = outcome else {
        panic!("expected a merge commit, got {outcome:?}");
    };
    assert_eq!(files_changed, 1);
    assert!(repo.join("auth.txt").exists());
}

#[test]
#[serial]
fn test_merge_fast_forwards_a_descendant_branch() {
    let (_dir, repo) = init_repo();
    let manager = manager(&repo);

    let worktree = manager.create("auth").unwrap();
    commit_file(&worktree.path, "auth.txt", "auth module\n", "add auth");

    // Main has not moved, so the branch tip merges without a commit.
    let outcome = merge_branch("feat/auth", &repo).unwrap();
    assert_eq!(outcome, MergeOutcome::FastForward);
    assert!(repo.join("auth.txt").exists());
}

#[test]
#[serial]
fn test_state_dir_is_excluded_from_repo_status() {
    let (_dir, repo) = init_repo();
    let manager = manager(&repo);

    manager.create("auth").unwrap();
    // The worktree checkout lives inside the repository but must not show
    // up as untracked changes at the root.
    assert!(!has_uncommitted_changes(&repo).unwrap());

    let exclude_path = repo.join(".git").join("info").join("exclude");
    let exclude = std::fs::read_to_string(&exclude_path).unwrap();
    assert_eq!(
        exclude.lines().filter(|l| l.trim() == "/.weft/").count(),
        1
    );

    // A second worktree does not duplicate the entry.
    manager.create("billing").unwrap();
    let exclude = std::fs::read_to_string(&exclude_path).unwrap();
    assert_eq!(
        exclude.lines().filter(|l| l.trim() == "/.weft/").count(),
        1
    );
}

#[test]
#[serial]
fn test_merge_missing_branch_is_an_error() {
    let (_dir, repo) = init_repo();
    assert!(merge_branch("feat/ghost", &repo).is_err());
}

#[test]
#[serial]
fn test_conflict_aborts_cleanly_and_siblings_still_merge() {
    let (_dir, repo) = init_repo();
    let manager = manager(&repo);

    // Two workstreams branch from the same base and both rewrite
    // shared.txt; a third touches an unrelated file.
    let a = manager.create("alpha").unwrap();
    let b = manager.create("beta").unwrap();
    let c = manager.create("gamma").unwrap();
    commit_file(&a.path, "shared.txt", "alpha version\n", "alpha edit");
    commit_file(&b.path, "shared.txt", "beta version\n", "beta edit");
    commit_file(&c.path, "extra.txt", "gamma\n", "gamma add");

    // Main has not moved yet, so alpha's branch fast-forwards in.
    assert_eq!(
        merge_branch("feat/alpha", &repo).unwrap(),
        MergeOutcome::FastForward
    );

    // Beta now conflicts with alpha's merged change.
    let outcome = merge_branch("feat/beta", &repo).unwrap();
    let MergeOutcome::Conflict { files } = outcome else {
        panic!("expected a conflict, got {outcome:?}");
    };
    assert_eq!(files, vec!["shared.txt".to_string()]);

    // The aborted merge leaves a clean tree, so the next merge proceeds.
    assert!(!has_uncommitted_changes(&repo).unwrap());
    assert!(matches!(
        merge_branch("feat/gamma", &repo).unwrap(),
        MergeOutcome::Merged { .. }
    ));
    assert!(repo.join("extra.txt").exists());

    // Beta's work is untouched on its branch.
    assert!(branch_exists("feat/beta", &repo).unwrap());
    assert_eq!(
        std::fs::read_to_string(b.path.join("shared.txt")).unwrap(),
        "beta version\n"
    );
}

#[test]
#[serial]
fn test_merge_already_up_to_date() {
    let (_dir, repo) = init_repo();
    let manager = manager(&repo);

    manager.create("noop").unwrap();
    // No commits on the branch: nothing to merge.
    let outcome = merge_branch("feat/noop", &repo).unwrap();
    assert_eq!(outcome, MergeOutcome::AlreadyUpToDate);
}
