use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of the append-only registry log. Immutable once written; used
/// exclusively for audit and recovery, never for live-state queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryEvent {
    pub event: EventKind,
    pub agent_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// For `resumed` events: the replacement agent's id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Spawn,
    Complete,
    Orphaned,
    Archived,
    Resumed,
}

impl RegistryEvent {
    pub fn new(event: EventKind, agent_id: &str, session_id: &str) -> Self {
        Self {
            event,
            agent_id: agent_id.to_string(),
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            detail: None,
            linked_agent: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_linked_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.linked_agent = Some(agent_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_roundtrip() {
        let event = RegistryEvent::new(EventKind::Spawn, "agent-x-1", "session-1")
            .with_detail("wave 1");
        let line = serde_json::to_string(&event).unwrap();
        let parsed: RegistryEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, event);
        // Absent optional fields stay off the wire
        assert!(!line.contains("linked_agent"));
    }
}
