//! Wave computation over the workstream DAG.
//!
//! Kahn's algorithm, layered: each iteration extracts the set of remaining
//! nodes with zero unsatisfied in-degree as the next wave. A cyclic graph is
//! a fatal configuration error, never silently worked around.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::WeftError;
use crate::models::{Node, NodeId, NodeStatus, Wave};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dag {
    pub nodes: BTreeMap<NodeId, Node>,
}

impl Dag {
    /// Group nodes into dependency-respecting execution waves.
    ///
    /// Every node lands in exactly one wave, the earliest wave in which all
    /// of its dependencies sit in prior waves. Membership within a wave is
    /// unordered (nodes run fully in parallel); we sort ids only to make
    /// output deterministic.
    pub fn compute_waves(&self) -> Result<Vec<Wave>> {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .values()
            .map(|n| (n.id.as_str(), n.dependencies.len()))
            .collect();

        // dep -> dependents
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in self.nodes.values() {
            for dep in &node.dependencies {
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(node.id.as_str());
            }
        }

        let mut waves = Vec::new();
        let mut remaining = self.nodes.len();

        while remaining > 0 {
            let mut ready: Vec<&str> = in_degree
                .iter()
                .filter(|(_, &degree)| degree == 0)
                .map(|(id, _)| *id)
                .collect();

            if ready.is_empty() {
                let stuck: Vec<&str> = {
                    let mut ids: Vec<&str> = in_degree.keys().copied().collect();
                    ids.sort_unstable();
                    ids
                };
                return Err(WeftError::Configuration(format!(
                    "cycle detected in DAG involving: {}",
                    stuck.join(", ")
                ))
                .into());
            }

            ready.sort_unstable();
            for id in &ready {
                in_degree.remove(id);
                if let Some(deps) = dependents.get(id) {
                    for dependent in deps {
                        if let Some(degree) = in_degree.get_mut(dependent) {
                            *degree -= 1;
                        }
                    }
                }
            }
            remaining -= ready.len();

            waves.push(Wave::new(
                waves.len() + 1,
                ready.into_iter().map(String::from).collect(),
            ));
        }

        Ok(waves)
    }

    /// True iff every dependency of the node has status `Complete`.
    pub fn dependencies_satisfied(&self, node_id: &str) -> bool {
        let Some(node) = self.nodes.get(node_id) else {
            return false;
        };
        node.dependencies.iter().all(|dep| {
            self.nodes
                .get(dep)
                .map(|n| n.status == NodeStatus::Complete)
                .unwrap_or(false)
        })
    }

    pub fn get(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    pub fn get_mut(&mut self, node_id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(node_id)
    }

    pub fn set_status(&mut self, node_id: &str, status: NodeStatus) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dag_from(edges: &[(&str, &[&str])]) -> Dag {
        let nodes = edges
            .iter()
            .map(|(id, deps)| {
                (
                    id.to_string(),
                    Node {
                        id: id.to_string(),
                        task: format!("do {id}"),
                        agent_type: "backend".to_string(),
                        workstream_id: id.to_string(),
                        dependencies: deps.iter().map(|d| d.to_string()).collect(),
                        deliverables: vec![],
                        status: NodeStatus::Pending,
                    },
                )
            })
            .collect();
        Dag { nodes }
    }

    #[test]
    fn test_diamond_waves() {
        // A, B independent; C depends on both.
        let dag = dag_from(&[("a", &[]), ("b", &[]), ("c", &["a", "b"])]);
        let waves = dag.compute_waves().unwrap();
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0].wave_number, 1);
        assert_eq!(waves[0].nodes, vec!["a", "b"]);
        assert_eq!(waves[1].nodes, vec!["c"]);
    }

    #[test]
    fn test_every_node_in_exactly_one_wave() {
        let dag = dag_from(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("d", &["b", "c"]),
            ("e", &[]),
        ]);
        let waves = dag.compute_waves().unwrap();
        let mut seen: Vec<&str> = waves
            .iter()
            .flat_map(|w| w.nodes.iter().map(String::as_str))
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_edges_cross_wave_boundaries_forward() {
        let dag = dag_from(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
        let waves = dag.compute_waves().unwrap();
        let wave_of = |id: &str| {
            waves
                .iter()
                .find(|w| w.contains(id))
                .map(|w| w.wave_number)
                .unwrap()
        };
        for node in dag.nodes.values() {
            for dep in &node.dependencies {
                assert!(wave_of(dep) < wave_of(&node.id));
            }
        }
    }

    #[test]
    fn test_two_node_cycle_is_configuration_error() {
        let dag = dag_from(&[("a", &["b"]), ("b", &["a"])]);
        let err = dag.compute_waves().unwrap_err();
        let weft = err.downcast_ref::<WeftError>().unwrap();
        assert!(matches!(weft, WeftError::Configuration(_)));
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_cycle_behind_valid_prefix() {
        // First wave exists, but b<->c deadlock each other.
        let dag = dag_from(&[("a", &[]), ("b", &["a", "c"]), ("c", &["b"])]);
        assert!(dag.compute_waves().is_err());
    }

    #[test]
    fn test_dependencies_satisfied() {
        let mut dag = dag_from(&[("a", &[]), ("b", &["a"])]);
        assert!(dag.dependencies_satisfied("a"));
        assert!(!dag.dependencies_satisfied("b"));
        dag.set_status("a", NodeStatus::Complete);
        assert!(dag.dependencies_satisfied("b"));
        assert!(!dag.dependencies_satisfied("missing"));
    }
}
