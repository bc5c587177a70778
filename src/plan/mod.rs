//! Plan ingestion: parsing and validating the DAG description produced by
//! the external planning step.
//!
//! A plan file is JSON with a `nodes` array, an optional pre-computed
//! `waves` array, and an optional `config` block. Pre-computed waves are
//! accepted as input but always re-validated by recomputation; the
//! recomputed waves are authoritative.

pub mod graph;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::PlanConfig;
use crate::error::WeftError;
use crate::models::{Node, NodeStatus};

pub use graph::Dag;

/// On-disk shape of a plan file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFile {
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub waves: Option<Vec<WaveSpec>>,
    #[serde(default)]
    pub config: Option<PlanConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Defaults to the workstream id when omitted.
    #[serde(default)]
    pub id: Option<String>,
    pub task: String,
    pub agent_type: String,
    pub workstream_id: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub deliverables: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveSpec {
    pub wave_number: usize,
    pub nodes: Vec<String>,
}

/// Load a plan file and build the validated DAG plus config overrides.
pub fn load_plan(path: &Path) -> Result<(Dag, PlanConfig)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file: {}", path.display()))?;

    let plan: PlanFile = serde_json::from_str(&content)
        .map_err(|e| WeftError::Configuration(format!("invalid plan file: {e}")))?;

    let dag = build_dag(&plan)?;

    // Sanity-check any pre-computed waves against our own computation.
    // Disagreement is not fatal: the recomputed waves win.
    if let Some(declared) = &plan.waves {
        let computed = dag.compute_waves()?;
        if declared.len() != computed.len() {
            tracing::warn!(
                declared = declared.len(),
                computed = computed.len(),
                "plan file wave count disagrees with recomputation; using recomputed waves"
            );
        }
    }

    Ok((dag, plan.config.unwrap_or_default()))
}

/// Build and validate the node map from parsed specs.
pub fn build_dag(plan: &PlanFile) -> Result<Dag> {
    if plan.nodes.is_empty() {
        return Err(WeftError::Configuration("plan contains no nodes".to_string()).into());
    }

    let mut nodes = BTreeMap::new();
    for spec in &plan.nodes {
        let id = spec
            .id
            .clone()
            .unwrap_or_else(|| spec.workstream_id.clone());
        if id.is_empty() {
            return Err(WeftError::Configuration("node with empty id".to_string()).into());
        }
        if nodes
            .insert(
                id.clone(),
                Node {
                    id: id.clone(),
                    task: spec.task.clone(),
                    agent_type: spec.agent_type.clone(),
                    workstream_id: spec.workstream_id.clone(),
                    dependencies: spec.dependencies.clone(),
                    deliverables: spec.deliverables.clone(),
                    status: NodeStatus::Pending,
                },
            )
            .is_some()
        {
            return Err(WeftError::Configuration(format!("duplicate node id '{id}'")).into());
        }
    }

    // Every edge endpoint must reference an existing node.
    for node in nodes.values() {
        for dep in &node.dependencies {
            if !nodes.contains_key(dep) {
                return Err(WeftError::Configuration(format!(
                    "node '{}' depends on unknown node '{dep}'",
                    node.id
                ))
                .into());
            }
        }
    }

    Ok(Dag { nodes })
}
