//! Orchestrator configuration.
//!
//! Defaults here are overridable from the plan file's `config` block and
//! from CLI flags. The status-detection phrase lists are deliberately plain
//! data: the agent collaborator only exposes a terminal text stream, so the
//! phrases are a replaceable heuristic, not load-bearing logic.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default cap on concurrently spawning/running agents within a wave.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// How long the launcher waits for a freshly spawned agent to become ready.
/// Distinct from the orchestration-level idle timeout.
pub const READINESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the wave scheduler and launcher.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Admission limit for concurrent spawns (and running agents per wave).
    pub max_concurrent: usize,
    /// Period of the monitoring poll loop.
    pub poll_interval: Duration,
    /// An agent continuously idle for longer than this is force-killed.
    pub idle_timeout: Duration,
    /// Spawn-time readiness wait; hard failure for that node on expiry.
    pub readiness_timeout: Duration,
    /// Wall-clock ceiling for one monitoring call. Soft stop, not failure.
    pub monitor_timeout: Duration,
    /// Delay between spawn starts within a wave to avoid contention bursts.
    pub spawn_stagger: Duration,
    /// State directory (sessions, dags, agents, event log, worktrees).
    pub work_dir: PathBuf,
    /// Repository root that worktrees are created from.
    pub repo_root: PathBuf,
    /// Prefix for tmux session names.
    pub session_prefix: String,
    /// Command that starts the agent process inside the tmux session.
    pub agent_command: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            poll_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(900),
            readiness_timeout: READINESS_TIMEOUT,
            monitor_timeout: Duration::from_secs(120 * 60),
            spawn_stagger: Duration::from_secs(2),
            work_dir: PathBuf::from(".weft"),
            repo_root: PathBuf::from("."),
            session_prefix: "weft".to_string(),
            agent_command: "claude".to_string(),
        }
    }
}

/// Optional `config` block of a plan file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Budget ceiling for the whole session, in USD.
    pub max_budget_usd: Option<f64>,
    /// Concurrency hint; clamped to at least 1.
    pub max_concurrent: Option<usize>,
}

/// Phrase lists driving output classification.
///
/// These key off specific phrases in the captured terminal buffer and are
/// acknowledged-fragile. Replace them wholesale to adapt to a different
/// agent frontend.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Output containing any of these means the workstream is done.
    pub completion_phrases: Vec<String>,
    /// A commit indicator followed by the prompt in the tail lines also
    /// counts as completion.
    pub commit_phrases: Vec<String>,
    /// Fatal error indicators.
    pub error_phrases: Vec<String>,
    /// Phrases that signal the agent is up and accepting input.
    pub ready_phrases: Vec<String>,
    /// Regex matched against the tail lines to detect the input prompt.
    pub prompt_pattern: String,
    /// How many trailing lines count as "the tail" for prompt detection.
    pub tail_lines: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            completion_phrases: vec![
                "WORKSTREAM COMPLETE".to_string(),
                "All deliverables complete".to_string(),
            ],
            commit_phrases: vec![
                "git commit".to_string(),
                "Committed".to_string(),
                "files changed".to_string(),
            ],
            error_phrases: vec![
                "FATAL ERROR".to_string(),
                "Credit balance is too low".to_string(),
                "command not found".to_string(),
                "Traceback (most recent call last)".to_string(),
            ],
            ready_phrases: vec!["bypass permissions".to_string(), "? for shortcuts".to_string()],
            prompt_pattern: r"^\s*(>|❯)\s?".to_string(),
            tail_lines: 5,
        }
    }
}

impl OrchestratorConfig {
    /// Apply overrides from a plan file's `config` block.
    pub fn apply_plan_config(&mut self, plan: &PlanConfig) {
        if let Some(max) = plan.max_concurrent {
            self.max_concurrent = max.max(1);
        }
    }
}
