use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// A maximal set of nodes whose dependencies are all satisfied by prior
/// waves. Waves partition the node set and execute strictly in sequence;
/// nodes within a wave run concurrently with no ordering between them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wave {
    /// 1-based, monotonically increasing.
    pub wave_number: usize,
    pub nodes: Vec<NodeId>,
    #[serde(default)]
    pub status: WaveStatus,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WaveStatus {
    #[default]
    Pending,
    Active,
    Complete,
    Failed,
}

impl std::fmt::Display for WaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaveStatus::Pending => write!(f, "pending"),
            WaveStatus::Active => write!(f, "active"),
            WaveStatus::Complete => write!(f, "complete"),
            WaveStatus::Failed => write!(f, "failed"),
        }
    }
}

impl Wave {
    pub fn new(wave_number: usize, nodes: Vec<NodeId>) -> Self {
        Self {
            wave_number,
            nodes,
            status: WaveStatus::Pending,
        }
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.iter().any(|n| n == node_id)
    }
}
