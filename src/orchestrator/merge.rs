//! Integrating completed workstream branches.
//!
//! Merges run sequentially in wave order, so a branch never merges before
//! the branches it depended on. A conflicting branch is recorded and left
//! unmerged, the repository is restored to a clean tree, and the remaining
//! branches still get their attempt.

use anyhow::Result;

use crate::error::WeftError;
use crate::git::{MergeOutcome, WorkspaceProvider};
use crate::models::{NodeStatus, OrchestrationSession};
use crate::plan::Dag;

#[derive(Debug, Clone)]
pub struct MergedBranch {
    pub workstream_id: String,
    pub branch: String,
    pub outcome: MergeOutcome,
}

#[derive(Debug, Clone)]
pub struct ConflictedBranch {
    pub workstream_id: String,
    pub branch: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SkippedBranch {
    pub workstream_id: String,
    pub reason: String,
}

/// What one merge pass did (or, for a dry run, would do).
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub merged: Vec<MergedBranch>,
    pub conflicts: Vec<ConflictedBranch>,
    pub skipped: Vec<SkippedBranch>,
    /// Branches a dry run would merge, in order.
    pub planned: Vec<String>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Restrict the pass to one wave.
    pub wave_filter: Option<usize>,
    /// Report the plan without touching the repository.
    pub dry_run: bool,
    /// Merge even when the workstream's worktree has uncommitted changes.
    pub force: bool,
}

/// Merge the branches of completed nodes, wave by wave.
///
/// Only nodes whose status is `Complete` are merged; anything else is
/// reported as skipped, as is a worktree with uncommitted changes unless
/// forced (the agent may not have committed everything it claims done).
pub fn merge_completed(
    session: &OrchestrationSession,
    dag: &Dag,
    workspace: &dyn WorkspaceProvider,
    options: MergeOptions,
) -> Result<MergeReport> {
    let mut report = MergeReport::default();

    for wave in &session.waves {
        if let Some(only) = options.wave_filter {
            if wave.wave_number != only {
                continue;
            }
        }

        for node_id in &wave.nodes {
            let Some(node) = dag.get(node_id) else {
                report.skipped.push(SkippedBranch {
                    workstream_id: node_id.clone(),
                    reason: "unknown node".to_string(),
                });
                continue;
            };

            if node.status != NodeStatus::Complete {
                report.skipped.push(SkippedBranch {
                    workstream_id: node.workstream_id.clone(),
                    reason: format!("node status is {}", node.status),
                });
                continue;
            }

            if !options.force {
                match workspace.has_uncommitted_changes(&node.workstream_id) {
                    Ok(true) => {
                        report.skipped.push(SkippedBranch {
                            workstream_id: node.workstream_id.clone(),
                            reason: "worktree has uncommitted changes (use --force)".to_string(),
                        });
                        continue;
                    }
                    Ok(false) => {}
                    // A missing worktree is not a blocker: the branch may
                    // outlive its checkout.
                    Err(e) => {
                        tracing::debug!(workstream = %node.workstream_id, error = %e,
                            "could not check worktree for uncommitted changes");
                    }
                }
            }

            if options.dry_run {
                report.planned.push(node.branch_name());
                continue;
            }

            match workspace.merge(&node.workstream_id) {
                Ok(MergeOutcome::Conflict { files }) => {
                    let err = WeftError::MergeConflict {
                        branch: node.branch_name(),
                        files: files.clone(),
                    };
                    tracing::warn!(workstream = %node.workstream_id, error = %err,
                        "branch left unmerged");
                    report.conflicts.push(ConflictedBranch {
                        workstream_id: node.workstream_id.clone(),
                        branch: node.branch_name(),
                        files,
                    });
                }
                Ok(outcome) => {
                    report.merged.push(MergedBranch {
                        workstream_id: node.workstream_id.clone(),
                        branch: node.branch_name(),
                        outcome,
                    });
                }
                Err(e) => {
                    tracing::warn!(workstream = %node.workstream_id, error = %e, "merge attempt failed");
                    report.skipped.push(SkippedBranch {
                        workstream_id: node.workstream_id.clone(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::Worktree;
    use crate::models::{Node, Wave};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Workspace stub scripting per-workstream merge outcomes.
    struct StubWorkspace {
        outcomes: BTreeMap<String, MergeOutcome>,
        merged_order: Mutex<Vec<String>>,
        dirty: Vec<String>,
    }

    impl WorkspaceProvider for StubWorkspace {
        fn provision(&self, workstream_id: &str) -> Result<Worktree> {
            Ok(Worktree {
                workstream_id: workstream_id.to_string(),
                path: PathBuf::from("/tmp"),
                branch: format!("feat/{workstream_id}"),
            })
        }

        fn remove(&self, _workstream_id: &str, _force: bool) -> Result<()> {
            Ok(())
        }

        fn has_uncommitted_changes(&self, workstream_id: &str) -> Result<bool> {
            Ok(self.dirty.iter().any(|w| w == workstream_id))
        }

        fn merge(&self, workstream_id: &str) -> Result<MergeOutcome> {
            self.merged_order
                .lock()
                .unwrap()
                .push(workstream_id.to_string());
            Ok(self
                .outcomes
                .get(workstream_id)
                .cloned()
                .unwrap_or(MergeOutcome::FastForward))
        }
    }

    fn node(id: &str, status: NodeStatus) -> Node {
        Node {
            id: id.to_string(),
            task: "t".to_string(),
            agent_type: "backend".to_string(),
            workstream_id: id.to_string(),
            dependencies: vec![],
            deliverables: vec![],
            status,
        }
    }

    fn fixture(statuses: &[(&str, NodeStatus)], waves: Vec<Wave>) -> (OrchestrationSession, Dag) {
        let mut nodes = BTreeMap::new();
        for (id, status) in statuses {
            nodes.insert(id.to_string(), node(id, *status));
        }
        let total = nodes.len();
        let session = OrchestrationSession::new(waves, total, 4, None);
        (session, Dag { nodes })
    }

    #[test]
    fn test_conflict_does_not_block_siblings() {
        let (session, dag) = fixture(
            &[("a", NodeStatus::Complete), ("b", NodeStatus::Complete)],
            vec![Wave::new(1, vec!["a".to_string(), "b".to_string()])],
        );
        let workspace = StubWorkspace {
            outcomes: BTreeMap::from([(
                "a".to_string(),
                MergeOutcome::Conflict {
                    files: vec!["src/shared.rs".to_string()],
                },
            )]),
            merged_order: Mutex::new(Vec::new()),
            dirty: vec![],
        };

        let report = merge_completed(&session, &dag, &workspace, MergeOptions::default()).unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].workstream_id, "a");
        assert_eq!(report.merged.len(), 1);
        assert_eq!(report.merged[0].workstream_id, "b");
        assert!(!report.is_clean());
    }

    #[test]
    fn test_incomplete_nodes_are_skipped() {
        let (session, dag) = fixture(
            &[("a", NodeStatus::Complete), ("b", NodeStatus::Failed)],
            vec![Wave::new(1, vec!["a".to_string(), "b".to_string()])],
        );
        let workspace = StubWorkspace {
            outcomes: BTreeMap::new(),
            merged_order: Mutex::new(Vec::new()),
            dirty: vec![],
        };

        let report = merge_completed(&session, &dag, &workspace, MergeOptions::default()).unwrap();
        assert_eq!(report.merged.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].workstream_id, "b");
    }

    #[test]
    fn test_merges_follow_wave_order() {
        let (session, dag) = fixture(
            &[
                ("base", NodeStatus::Complete),
                ("api", NodeStatus::Complete),
            ],
            vec![
                Wave::new(1, vec!["base".to_string()]),
                Wave::new(2, vec!["api".to_string()]),
            ],
        );
        let workspace = StubWorkspace {
            outcomes: BTreeMap::new(),
            merged_order: Mutex::new(Vec::new()),
            dirty: vec![],
        };

        merge_completed(&session, &dag, &workspace, MergeOptions::default()).unwrap();
        assert_eq!(
            *workspace.merged_order.lock().unwrap(),
            vec!["base".to_string(), "api".to_string()]
        );
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let (session, dag) = fixture(
            &[("a", NodeStatus::Complete)],
            vec![Wave::new(1, vec!["a".to_string()])],
        );
        let workspace = StubWorkspace {
            outcomes: BTreeMap::new(),
            merged_order: Mutex::new(Vec::new()),
            dirty: vec![],
        };

        let report = merge_completed(
            &session,
            &dag,
            &workspace,
            MergeOptions {
                dry_run: true,
                ..MergeOptions::default()
            },
        ).unwrap();
        assert!(workspace.merged_order.lock().unwrap().is_empty());
        assert_eq!(report.planned, vec!["feat/a".to_string()]);
    }

    #[test]
    fn test_dirty_worktree_is_skipped_unless_forced() {
        let (session, dag) = fixture(
            &[("a", NodeStatus::Complete)],
            vec![Wave::new(1, vec!["a".to_string()])],
        );
        let workspace = StubWorkspace {
            outcomes: BTreeMap::new(),
            merged_order: Mutex::new(Vec::new()),
            dirty: vec!["a".to_string()],
        };

        let report = merge_completed(&session, &dag, &workspace, MergeOptions::default()).unwrap();
        assert!(report.merged.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].reason.contains("uncommitted"));

        let report = merge_completed(
            &session,
            &dag,
            &workspace,
            MergeOptions {
                force: true,
                ..MergeOptions::default()
            },
        )
        .unwrap();
        assert_eq!(report.merged.len(), 1);
    }

    #[test]
    fn test_wave_filter_restricts_the_pass() {
        let (session, dag) = fixture(
            &[
                ("base", NodeStatus::Complete),
                ("api", NodeStatus::Complete),
            ],
            vec![
                Wave::new(1, vec!["base".to_string()]),
                Wave::new(2, vec!["api".to_string()]),
            ],
        );
        let workspace = StubWorkspace {
            outcomes: BTreeMap::new(),
            merged_order: Mutex::new(Vec::new()),
            dirty: vec![],
        };

        let report = merge_completed(
            &session,
            &dag,
            &workspace,
            MergeOptions {
                wave_filter: Some(2),
                ..MergeOptions::default()
            },
        ).unwrap();
        assert_eq!(report.merged.len(), 1);
        assert_eq!(report.merged[0].workstream_id, "api");
    }
}
