//! Classifying captured agent output.
//!
//! The heuristic keys off specific phrase matches in the terminal buffer
//! and is inherently fragile; the phrase lists come from `ClassifierConfig`
//! and are replaceable data. Dead-session detection always overrides text
//! classification.

use regex::Regex;

use crate::config::ClassifierConfig;

/// What the poll loop concluded from one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedStatus {
    /// Still producing output.
    Active,
    /// At rest, awaiting input, not yet declared complete.
    Idle,
    Complete,
    Failed,
    /// The multiplexer session no longer exists.
    Killed,
}

pub trait AgentStatusClassifier: Send + Sync {
    /// Classify a captured buffer. `alive` is the multiplexer-session
    /// existence check; when false the classification is `Killed`
    /// regardless of the last captured text.
    fn classify(&self, output: &str, alive: bool) -> ObservedStatus;

    /// Best-effort extraction of the observed spend from the buffer.
    /// May under-report; the true spend can exceed the detected figure.
    fn extract_cost(&self, output: &str) -> Option<f64>;
}

pub struct PatternClassifier {
    config: ClassifierConfig,
    prompt_re: Regex,
    cost_re: Regex,
}

impl PatternClassifier {
    pub fn new(config: ClassifierConfig) -> anyhow::Result<Self> {
        let prompt_re = Regex::new(&config.prompt_pattern)?;
        let cost_re = Regex::new(r"\$([0-9]+(?:\.[0-9]+)?)")?;
        Ok(Self {
            config,
            prompt_re,
            cost_re,
        })
    }

    fn tail<'a>(&self, output: &'a str) -> Vec<&'a str> {
        let lines: Vec<&str> = output.lines().collect();
        let start = lines.len().saturating_sub(self.config.tail_lines);
        lines[start..].to_vec()
    }

    fn prompt_in_tail(&self, output: &str) -> bool {
        self.tail(output)
            .iter()
            .any(|line| self.prompt_re.is_match(line))
    }

    /// Whether the buffer shows the agent up and accepting input.
    pub fn is_ready(&self, output: &str) -> bool {
        self.config
            .ready_phrases
            .iter()
            .any(|p| output.contains(p.as_str()))
            || self.prompt_in_tail(output)
    }

    pub fn has_error(&self, output: &str) -> bool {
        self.config
            .error_phrases
            .iter()
            .any(|p| output.contains(p.as_str()))
    }
}

impl AgentStatusClassifier for PatternClassifier {
    fn classify(&self, output: &str, alive: bool) -> ObservedStatus {
        if !alive {
            return ObservedStatus::Killed;
        }

        if self
            .config
            .completion_phrases
            .iter()
            .any(|p| output.contains(p.as_str()))
        {
            return ObservedStatus::Complete;
        }

        // A commit indicator with the agent back at its prompt also counts
        // as done: the explicit phrase can scroll out of the buffer.
        if self
            .config
            .commit_phrases
            .iter()
            .any(|p| output.contains(p.as_str()))
            && self.prompt_in_tail(output)
        {
            return ObservedStatus::Complete;
        }

        if self.has_error(output) {
            return ObservedStatus::Failed;
        }

        if self.prompt_in_tail(output) {
            return ObservedStatus::Idle;
        }

        ObservedStatus::Active
    }

    fn extract_cost(&self, output: &str) -> Option<f64> {
        // Take the last figure on screen; cost displays update in place.
        self.cost_re
            .captures_iter(output)
            .filter_map(|c| c.get(1))
            .filter_map(|m| m.as_str().parse::<f64>().ok())
            .last()
    }
}
