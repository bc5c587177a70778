use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::node::{Node, NodeId};

/// Metadata for one spawned agent process.
///
/// Owned by the orchestration session; status and cost are mutated by the
/// scheduler's poll loop. Archived (moved to cold storage, metadata
/// retained) after session completion or explicit cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    /// Back-reference to the DAG node, non-owning.
    pub node_id: NodeId,
    pub workstream_id: String,
    pub worktree_dir: PathBuf,
    /// Branch the agent commits to, `feat/<workstream_id>`.
    pub branch: String,
    /// Name of the tmux session hosting the agent process.
    pub tmux_session: String,
    pub status: AgentStatus,
    /// Observed spend. Monotonically non-decreasing: scrapes that no longer
    /// show the figure never lower the recorded value.
    pub cost_usd: f64,
    pub spawned_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    /// When the agent was first observed idle in the current idle stretch.
    pub idle_since: Option<DateTime<Utc>>,
    /// Opaque resume handle, if one was discovered. May be empty.
    pub transcript_path: Option<PathBuf>,
    pub pid: Option<u32>,
    pub close_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Idle,
    Complete,
    Failed,
    Killed,
    Orphaned,
    Archived,
    Resumed,
}

impl AgentStatus {
    /// Terminal states are never re-classified from captured output.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentStatus::Complete
                | AgentStatus::Failed
                | AgentStatus::Killed
                | AgentStatus::Orphaned
                | AgentStatus::Archived
                | AgentStatus::Resumed
        )
    }

    /// Whether this status counts as a failure for wave-outcome purposes.
    /// A forced idle-kill is treated the same as a detected failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, AgentStatus::Failed | AgentStatus::Killed)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Active => "active",
            AgentStatus::Idle => "idle",
            AgentStatus::Complete => "complete",
            AgentStatus::Failed => "failed",
            AgentStatus::Killed => "killed",
            AgentStatus::Orphaned => "orphaned",
            AgentStatus::Archived => "archived",
            AgentStatus::Resumed => "resumed",
        };
        write!(f, "{s}")
    }
}

impl Agent {
    pub fn new(node: &Node, worktree_dir: PathBuf, branch: String, tmux_session: String) -> Self {
        let now = Utc::now();
        Self {
            id: Self::generate_id(&node.workstream_id),
            node_id: node.id.clone(),
            workstream_id: node.workstream_id.clone(),
            worktree_dir,
            branch,
            tmux_session,
            status: AgentStatus::Active,
            cost_usd: 0.0,
            spawned_at: now,
            last_active: now,
            idle_since: None,
            transcript_path: None,
            pid: None,
            close_reason: None,
        }
    }

    /// Placeholder record for a node whose spawn failed. No tmux session
    /// exists; the launcher guarantees no partial agent survives a failed
    /// launch.
    pub fn failed_spawn(node: &Node, reason: String) -> Self {
        let now = Utc::now();
        Self {
            id: Self::generate_id(&node.workstream_id),
            node_id: node.id.clone(),
            workstream_id: node.workstream_id.clone(),
            worktree_dir: PathBuf::new(),
            branch: node.branch_name(),
            tmux_session: String::new(),
            status: AgentStatus::Failed,
            cost_usd: 0.0,
            spawned_at: now,
            last_active: now,
            idle_since: None,
            transcript_path: None,
            pid: None,
            close_reason: Some(reason),
        }
    }

    /// Globally unique: workstream + spawn timestamp + uuid fragment.
    fn generate_id(workstream_id: &str) -> String {
        let timestamp = Utc::now().timestamp();
        let uuid_short = uuid::Uuid::new_v4()
            .to_string()
            .split('-')
            .next()
            .unwrap_or("")
            .to_string();
        format!("agent-{workstream_id}-{timestamp}-{uuid_short}")
    }

    /// Fold one observed status into the record, maintaining the
    /// idle-stretch bookkeeping used by the idle-timeout policy.
    pub fn observe_status(&mut self, observed: AgentStatus, now: DateTime<Utc>) {
        match observed {
            AgentStatus::Idle => {
                if self.idle_since.is_none() {
                    self.idle_since = Some(now);
                }
            }
            _ => {
                self.idle_since = None;
                self.last_active = now;
            }
        }
        self.status = observed;
    }

    /// How long the agent has been continuously idle, if it is idle.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Option<ChronoDuration> {
        self.idle_since.map(|since| now.signed_duration_since(since))
    }

    /// Record an observed cost figure. Keeps the running maximum: cost
    /// extraction is best-effort and a scrape may miss the status line.
    pub fn record_cost(&mut self, cost: f64) {
        if cost > self.cost_usd {
            self.cost_usd = cost;
        }
    }

    pub fn mark_killed(&mut self, reason: String) {
        self.status = AgentStatus::Killed;
        self.close_reason = Some(reason);
    }

    /// Whether this record is a failed-spawn placeholder: the launch never
    /// produced a tmux session, so the node can be spawned again.
    pub fn never_launched(&self) -> bool {
        self.status == AgentStatus::Failed && self.tmux_session.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::node::NodeStatus;

    fn test_node() -> Node {
        Node {
            id: "a".to_string(),
            task: "task".to_string(),
            agent_type: "backend".to_string(),
            workstream_id: "auth".to_string(),
            dependencies: vec![],
            deliverables: vec![],
            status: NodeStatus::Pending,
        }
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let node = test_node();
        let a = Agent::new(&node, PathBuf::new(), "feat/auth".into(), "s".into());
        let b = Agent::new(&node, PathBuf::new(), "feat/auth".into(), "s".into());
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("agent-auth-"));
    }

    #[test]
    fn test_cost_is_monotonic() {
        let node = test_node();
        let mut agent = Agent::new(&node, PathBuf::new(), "feat/auth".into(), "s".into());
        agent.record_cost(1.25);
        agent.record_cost(0.50);
        assert_eq!(agent.cost_usd, 1.25);
        agent.record_cost(2.00);
        assert_eq!(agent.cost_usd, 2.00);
    }

    #[test]
    fn test_idle_stretch_tracking() {
        let node = test_node();
        let mut agent = Agent::new(&node, PathBuf::new(), "feat/auth".into(), "s".into());
        let t0 = Utc::now();

        agent.observe_status(AgentStatus::Idle, t0);
        let t1 = t0 + ChronoDuration::seconds(10);
        agent.observe_status(AgentStatus::Idle, t1);
        // idle_since pins to the first idle observation
        assert_eq!(agent.idle_for(t1), Some(ChronoDuration::seconds(10)));

        // Activity resets the stretch
        agent.observe_status(AgentStatus::Active, t1);
        assert!(agent.idle_for(t1).is_none());
    }

    #[test]
    fn test_terminal_and_failure_predicates() {
        assert!(AgentStatus::Killed.is_terminal());
        assert!(AgentStatus::Killed.is_failure());
        assert!(AgentStatus::Complete.is_terminal());
        assert!(!AgentStatus::Complete.is_failure());
        assert!(!AgentStatus::Idle.is_terminal());
    }
}
