//! Launching and controlling opaque agent processes.
//!
//! The agent collaborator has no structured IPC channel: tasks go in as
//! literal terminal input and state comes back by pattern-matching the
//! captured terminal buffer. Both sides of that limitation live behind
//! traits so a structured-IPC agent can be substituted without touching
//! the scheduler.

pub mod status;
pub mod tmux;

use anyhow::Result;
use std::path::PathBuf;

pub use status::{AgentStatusClassifier, ObservedStatus, PatternClassifier};
pub use tmux::TmuxLauncher;

/// Everything needed to start one agent.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Terminal-multiplexer session name to create.
    pub session_name: String,
    /// Directory the agent process starts in (the workstream's worktree).
    pub work_dir: PathBuf,
    /// Task text, delivered as literal input after readiness.
    pub task: String,
    /// Capability tag; recorded but opaque to the launcher.
    pub agent_type: String,
    /// Resume handle from a previous agent, if relaunching.
    pub resume_transcript: Option<PathBuf>,
}

/// Details of a successfully started agent.
#[derive(Debug, Clone)]
pub struct LaunchedAgent {
    pub session_name: String,
    pub pid: Option<u32>,
}

/// Seam to the external agent-launcher capability.
pub trait AgentLauncher: Send + Sync {
    /// Start the agent, block until it signals readiness (bounded by the
    /// readiness timeout), then deliver the task. On failure no partial
    /// agent session is left running.
    fn spawn(&self, request: &SpawnRequest) -> Result<LaunchedAgent>;

    /// Current visible terminal buffer. Non-blocking, best-effort: `None`
    /// when the session cannot be captured.
    fn capture_output(&self, session_name: &str) -> Option<String>;

    /// Whether the multiplexer session still exists.
    fn is_alive(&self, session_name: &str) -> bool;

    /// Terminate the session. Idempotent: a no-op if already dead.
    fn kill(&self, session_name: &str);
}
