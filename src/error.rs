//! Error taxonomy for the orchestration engine.
//!
//! Configuration and persistence errors are fatal to the operation that hit
//! them. Spawn and merge errors are node-local and reported in aggregate.
//! Agent failures and budget exhaustion stop wave progression but leave
//! running agents and their artifacts in place for inspection.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeftError {
    /// Invalid DAG or plan file (cyclic graph, missing fields, unknown
    /// dependency references). Never retried; surfaced before any spawning.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A single agent failed to launch (readiness timeout, tmux failure).
    /// Node-local: sibling spawns in the wave continue.
    #[error("spawn failed for node '{node}': {reason}")]
    Spawn { node: String, reason: String },

    /// An agent hit a fatal error pattern or was killed after idling past
    /// the idle timeout. Wave-fatal.
    #[error("agent '{agent}' failed: {reason}")]
    AgentFailure { agent: String, reason: String },

    /// Cumulative observed spend met or exceeded the session budget.
    /// Session-fatal, independent of individual agent outcomes.
    #[error("budget exceeded: ${spent:.2} / ${budget:.2}")]
    BudgetExceeded { spent: f64, budget: f64 },

    /// A branch merge hit conflicts. The merge is aborted cleanly and
    /// reported; remaining merges proceed.
    #[error("merge conflict on '{branch}' ({} file(s))", files.len())]
    MergeConflict { branch: String, files: Vec<String> },

    /// Unable to write session/registry state. Fatal to the current
    /// operation: continuing with un-persisted state would break resume.
    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Terminal outcome of an orchestration run, mapped to process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    AgentsFailed,
    InvalidDag,
    BudgetExceeded,
    Timeout,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::AgentsFailed => 1,
            Outcome::InvalidDag => 2,
            Outcome::BudgetExceeded => 3,
            Outcome::Timeout => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            Outcome::Success,
            Outcome::AgentsFailed,
            Outcome::InvalidDag,
            Outcome::BudgetExceeded,
            Outcome::Timeout,
        ]
        .map(|o| o.exit_code());
        assert_eq!(codes, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_budget_error_display() {
        let err = WeftError::BudgetExceeded {
            spent: 55.0,
            budget: 50.0,
        };
        assert_eq!(err.to_string(), "budget exceeded: $55.00 / $50.00");
    }

    #[test]
    fn test_merge_conflict_display_counts_files() {
        let err = WeftError::MergeConflict {
            branch: "feat/a".to_string(),
            files: vec!["src/lib.rs".to_string(), "README.md".to_string()],
        };
        assert!(err.to_string().contains("2 file(s)"));
    }
}
