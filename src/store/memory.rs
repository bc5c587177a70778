//! In-memory state store for tests and dry runs.

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::WeftError;
use crate::models::{Agent, AgentStatus, OrchestrationSession, RegistryEvent};
use crate::plan::Dag;

use super::StateStore;

#[derive(Default)]
struct Inner {
    sessions: BTreeMap<String, OrchestrationSession>,
    dags: BTreeMap<String, Dag>,
    agents: BTreeMap<String, Agent>,
    archived: BTreeMap<String, Agent>,
    events: Vec<RegistryEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of recorded events, for assertions.
    pub fn events(&self) -> Vec<RegistryEvent> {
        self.lock().events.clone()
    }

    /// Archived agents, for assertions.
    pub fn archived_agents(&self) -> Vec<Agent> {
        self.lock().archived.values().cloned().collect()
    }
}

impl StateStore for MemoryStore {
    fn save_session(&self, session: &OrchestrationSession) -> Result<()> {
        self.lock()
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    fn load_session(&self, session_id: &str) -> Result<OrchestrationSession> {
        self.lock()
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| WeftError::Persistence(format!("no session '{session_id}'")).into())
    }

    fn save_dag(&self, session_id: &str, dag: &Dag) -> Result<()> {
        self.lock().dags.insert(session_id.to_string(), dag.clone());
        Ok(())
    }

    fn load_dag(&self, session_id: &str) -> Result<Dag> {
        self.lock()
            .dags
            .get(session_id)
            .cloned()
            .ok_or_else(|| WeftError::Persistence(format!("no dag for '{session_id}'")).into())
    }

    fn save_agent(&self, agent: &Agent) -> Result<()> {
        self.lock().agents.insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    fn load_agent(&self, agent_id: &str) -> Result<Agent> {
        self.lock()
            .agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| WeftError::Persistence(format!("no agent '{agent_id}'")).into())
    }

    fn list_agents(&self) -> Result<Vec<Agent>> {
        Ok(self.lock().agents.values().cloned().collect())
    }

    fn archive_agent(&self, agent_id: &str) -> Result<()> {
        let mut inner = self.lock();
        let mut agent = inner
            .agents
            .remove(agent_id)
            .ok_or_else(|| WeftError::Persistence(format!("no agent '{agent_id}'")))?;
        agent.status = AgentStatus::Archived;
        inner.archived.insert(agent_id.to_string(), agent);
        Ok(())
    }

    fn append_event(&self, event: &RegistryEvent) -> Result<()> {
        self.lock().events.push(event.clone());
        Ok(())
    }

    fn read_events(&self) -> Result<Vec<RegistryEvent>> {
        Ok(self.lock().events.clone())
    }
}
