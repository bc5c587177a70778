use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::agent::Agent;
use super::node::NodeId;
use super::wave::{Wave, WaveStatus};

/// Top-level orchestration state: a DAG, a wave cursor, the agent map and a
/// running cost total. This is the single source of truth; it is persisted
/// after every state transition so a crashed orchestrator can resume from
/// the last consistent snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationSession {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
    /// 1-based wave cursor; 0 before any wave has started.
    pub current_wave: usize,
    pub total_waves: usize,
    pub total_nodes: usize,
    pub max_concurrent: usize,
    pub agents: BTreeMap<String, Agent>,
    /// Derived: sum of agent costs, recomputed on every poll tick.
    pub total_cost_usd: f64,
    /// Budget ceiling; `None` means unlimited.
    pub budget_usd: Option<f64>,
    pub waves: Vec<Wave>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Complete => write!(f, "complete"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl OrchestrationSession {
    pub fn new(
        waves: Vec<Wave>,
        total_nodes: usize,
        max_concurrent: usize,
        budget_usd: Option<f64>,
    ) -> Self {
        Self {
            session_id: Self::generate_id(),
            created_at: Utc::now(),
            status: SessionStatus::Pending,
            current_wave: 0,
            total_waves: waves.len(),
            total_nodes,
            max_concurrent,
            agents: BTreeMap::new(),
            total_cost_usd: 0.0,
            budget_usd,
            waves,
        }
    }

    fn generate_id() -> String {
        let timestamp = Utc::now().timestamp();
        let uuid_short = uuid::Uuid::new_v4()
            .to_string()
            .split('-')
            .next()
            .unwrap_or("")
            .to_string();
        format!("session-{uuid_short}-{timestamp}")
    }

    pub fn wave(&self, wave_number: usize) -> Option<&Wave> {
        self.waves.iter().find(|w| w.wave_number == wave_number)
    }

    pub fn wave_mut(&mut self, wave_number: usize) -> Option<&mut Wave> {
        self.waves.iter_mut().find(|w| w.wave_number == wave_number)
    }

    /// The most recently spawned agent for a node, if any. Earlier failed
    /// spawn attempts for the same node are superseded by later ones.
    pub fn agent_for_node(&self, node_id: &str) -> Option<&Agent> {
        self.agents
            .values()
            .filter(|a| a.node_id == node_id)
            .max_by_key(|a| a.spawned_at)
    }

    /// Agent ids (latest per node) belonging to one wave, in stable order.
    pub fn agent_ids_in_wave(&self, wave_number: usize) -> Vec<String> {
        let Some(wave) = self.wave(wave_number) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = wave
            .nodes
            .iter()
            .filter_map(|node_id| self.agent_for_node(node_id))
            .map(|a| a.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Recompute the derived cost total from the agent map.
    pub fn recompute_total_cost(&mut self) -> f64 {
        self.total_cost_usd = self.agents.values().map(|a| a.cost_usd).sum();
        self.total_cost_usd
    }

    /// Whether observed spend has met or exceeded the ceiling.
    pub fn budget_exhausted(&self) -> bool {
        match self.budget_usd {
            Some(budget) => self.total_cost_usd >= budget,
            None => false,
        }
    }

    /// Highest wave number whose status is `Complete`, with every wave
    /// below it also complete. Resume starts at the wave after this one.
    pub fn last_completed_wave(&self) -> usize {
        let mut last = 0;
        for wave in &self.waves {
            if wave.status == WaveStatus::Complete && wave.wave_number == last + 1 {
                last = wave.wave_number;
            } else {
                break;
            }
        }
        last
    }

    pub fn register_agent(&mut self, agent: Agent) {
        self.agents.insert(agent.id.clone(), agent);
    }

    pub fn mark_running(&mut self) {
        self.status = SessionStatus::Running;
    }

    pub fn mark_complete(&mut self) {
        self.status = SessionStatus::Complete;
    }

    pub fn mark_failed(&mut self) {
        self.status = SessionStatus::Failed;
    }

    /// Node ids in a wave that have no live agent yet (initial spawn, or
    /// re-spawn after the earlier attempt failed before launch).
    pub fn unspawned_nodes(&self, wave_number: usize) -> Vec<NodeId> {
        let Some(wave) = self.wave(wave_number) else {
            return Vec::new();
        };
        wave.nodes
            .iter()
            .filter(|node_id| match self.agent_for_node(node_id) {
                None => true,
                // A new spawn supersedes the placeholder record.
                Some(agent) => agent.never_launched(),
            })
            .cloned()
            .collect()
    }
}
