//! Durable orchestration state.
//!
//! All components receive an explicit `StateStore` rather than reaching
//! for ambient directories; tests inject the in-memory implementation.
//! Live state lives in the session/agent records; the event log is
//! append-only and used for audit and recovery only.

pub mod fs;
pub mod memory;
pub mod registry;

use anyhow::Result;

use crate::models::{Agent, OrchestrationSession, RegistryEvent};
use crate::plan::Dag;

pub use fs::FsStateStore;
pub use memory::MemoryStore;
pub use registry::SessionRegistry;

pub trait StateStore: Send + Sync {
    /// Atomically replace the persisted session snapshot.
    fn save_session(&self, session: &OrchestrationSession) -> Result<()>;
    fn load_session(&self, session_id: &str) -> Result<OrchestrationSession>;

    /// Atomically replace the persisted DAG snapshot for a session.
    fn save_dag(&self, session_id: &str, dag: &Dag) -> Result<()>;
    fn load_dag(&self, session_id: &str) -> Result<Dag>;

    /// Upsert one agent's metadata record in the active store.
    fn save_agent(&self, agent: &Agent) -> Result<()>;
    fn load_agent(&self, agent_id: &str) -> Result<Agent>;
    /// All agents in the active store (archived agents excluded).
    fn list_agents(&self) -> Result<Vec<Agent>>;
    /// Relocate an agent's record to cold storage. Metadata is retained,
    /// never deleted.
    fn archive_agent(&self, agent_id: &str) -> Result<()>;

    /// Append one event to the log. Never overwrites a prior line; a
    /// failed append surfaces as a persistence error.
    fn append_event(&self, event: &RegistryEvent) -> Result<()>;
    fn read_events(&self) -> Result<Vec<RegistryEvent>>;
}
