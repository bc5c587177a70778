//! Session registry: the audit log plus orphan recovery operations.
//!
//! An orphaned agent is one whose supervising tmux session died without
//! the agent reaching a terminal status — typically an orchestrator or
//! machine crash. The registry finds them, marks them, and can relaunch
//! one as a fresh agent in the same worktree.

use anyhow::{Context, Result};
use chrono::Utc;

use crate::launcher::{AgentLauncher, SpawnRequest};
use crate::models::{Agent, AgentStatus, EventKind, RegistryEvent};

use super::StateStore;

pub struct SessionRegistry<'a> {
    store: &'a dyn StateStore,
    launcher: &'a dyn AgentLauncher,
}

impl<'a> SessionRegistry<'a> {
    pub fn new(store: &'a dyn StateStore, launcher: &'a dyn AgentLauncher) -> Self {
        Self { store, launcher }
    }

    /// Append one event. Append-only: a failed write surfaces; it is never
    /// retried with mutation and never overwrites a prior line.
    pub fn record_event(&self, event: RegistryEvent) -> Result<()> {
        self.store.append_event(&event)
    }

    /// Agents whose tmux session is dead but whose status is not yet
    /// terminal-or-handled — candidates for recovery.
    pub fn list_orphaned(&self) -> Result<Vec<Agent>> {
        let agents = self.store.list_agents()?;
        Ok(agents
            .into_iter()
            .filter(|a| {
                !matches!(
                    a.status,
                    AgentStatus::Complete | AgentStatus::Archived | AgentStatus::Orphaned
                )
            })
            .filter(|a| !a.tmux_session.is_empty() && !self.launcher.is_alive(&a.tmux_session))
            .collect())
    }

    pub fn mark_orphaned(&self, agent_id: &str, reason: &str) -> Result<()> {
        let mut agent = self.store.load_agent(agent_id)?;
        agent.status = AgentStatus::Orphaned;
        agent.close_reason = Some(reason.to_string());
        self.store.save_agent(&agent)?;

        self.record_event(
            RegistryEvent::new(EventKind::Orphaned, agent_id, "").with_detail(reason),
        )
    }

    /// Move an agent's metadata to cold storage and log it. The record is
    /// relocated, never deleted.
    pub fn archive(&self, agent_id: &str) -> Result<()> {
        self.store.archive_agent(agent_id)?;
        self.record_event(RegistryEvent::new(EventKind::Archived, agent_id, ""))
    }

    /// Best-effort relaunch of a dead agent as a fresh one in the same
    /// worktree. Uses the transcript handle when one was recorded; without
    /// it the new agent starts cold with a continue instruction.
    pub fn resume(&self, agent_id: &str) -> Result<String> {
        let mut old = self.store.load_agent(agent_id)?;

        if self.launcher.is_alive(&old.tmux_session) {
            anyhow::bail!(
                "agent '{agent_id}' session '{}' is still running; nothing to resume",
                old.tmux_session
            );
        }

        let mut replacement = old.clone();
        replacement.id = format!(
            "{}-r{}",
            agent_id,
            Utc::now().timestamp()
        );
        replacement.tmux_session = format!("weft-{}", replacement.id);
        replacement.status = AgentStatus::Active;
        replacement.spawned_at = Utc::now();
        replacement.last_active = Utc::now();
        replacement.idle_since = None;
        replacement.pid = None;
        replacement.close_reason = None;

        let request = SpawnRequest {
            session_name: replacement.tmux_session.clone(),
            work_dir: replacement.worktree_dir.clone(),
            task: format!(
                "Continue the interrupted workstream '{}'. Review the worktree state, \
                 finish the remaining deliverables, and commit to branch {}.",
                replacement.workstream_id, replacement.branch
            ),
            agent_type: String::new(),
            resume_transcript: old.transcript_path.clone(),
        };

        let launched = self
            .launcher
            .spawn(&request)
            .with_context(|| format!("failed to relaunch agent '{agent_id}'"))?;
        replacement.pid = launched.pid;

        old.status = AgentStatus::Resumed;
        self.store.save_agent(&old)?;
        self.store.save_agent(&replacement)?;

        self.record_event(
            RegistryEvent::new(EventKind::Resumed, agent_id, "")
                .with_linked_agent(replacement.id.clone()),
        )?;

        Ok(replacement.id)
    }
}
