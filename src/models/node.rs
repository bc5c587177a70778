use serde::{Deserialize, Serialize};

pub type NodeId = String;

/// One workstream in the DAG: a unit of work assigned to exactly one agent.
///
/// Created at plan ingestion; status mutated only by the wave scheduler as
/// the corresponding agent's observed state changes; never deleted within a
/// session's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Free-text instruction delivered to the agent.
    pub task: String,
    /// Capability tag, e.g. "backend".
    pub agent_type: String,
    pub workstream_id: String,
    #[serde(default)]
    pub dependencies: Vec<NodeId>,
    #[serde(default)]
    pub deliverables: Vec<String>,
    #[serde(default)]
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Pending,
    Active,
    Complete,
    Failed,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Active => write!(f, "active"),
            NodeStatus::Complete => write!(f, "complete"),
            NodeStatus::Failed => write!(f, "failed"),
        }
    }
}

impl Node {
    /// The branch an agent working this node commits to.
    pub fn branch_name(&self) -> String {
        format!("feat/{}", self.workstream_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_name() {
        let node = Node {
            id: "a".to_string(),
            task: "do things".to_string(),
            agent_type: "backend".to_string(),
            workstream_id: "auth-api".to_string(),
            dependencies: vec![],
            deliverables: vec![],
            status: NodeStatus::Pending,
        };
        assert_eq!(node.branch_name(), "feat/auth-api");
    }

    #[test]
    fn test_status_serde_lowercase() {
        let json = serde_json::to_string(&NodeStatus::Complete).unwrap();
        assert_eq!(json, "\"complete\"");
    }
}
