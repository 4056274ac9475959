//! Serialización del grafo a/desde JSON.
//!
//! El snapshot guarda los nodos en orden de arena (con su marca `light`) y el
//! log de aristas. Al deserializar se re-registran los nodos y se reproducen
//! las aristas, de modo que `starts`, profundidades y demás índices se
//! reconstruyen con las mismas reglas que en el registro original.
//! `connected_starts` se guarda aparte: tras un `absorb` incluye entradas que
//! la reproducción del registro no recupera, y se unen al deserializar.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ExperimentGraph;
use crate::constants::{SNAPSHOT_FILE, SNAPSHOT_FORMAT_VERSION};
use crate::errors::GraphError;
use crate::model::{GraphNode, NodeId};

#[derive(Debug, Serialize, Deserialize)]
struct GraphSnapshot {
    format_version: u32,
    nodes: Vec<SnapshotEntry>,
    edges: Vec<(NodeId, NodeId)>,
    #[serde(default)]
    connected_starts: Vec<(NodeId, Vec<NodeId>)>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    light: bool,
    node: GraphNode,
}

impl ExperimentGraph {
    pub fn serialize(&self) -> Result<Vec<u8>, GraphError> {
        let nodes = self.nodes
                        .iter()
                        .zip(&self.light)
                        .map(|(node, light)| {
                            let mut node = node.clone();
                            node.set_max_depth(0);
                            if let GraphNode::Action(a) = &mut node {
                                a.out_artifacts.clear();
                            }
                            SnapshotEntry { light: *light, node }
                        })
                        .collect();
        let connected_starts = (0..self.nodes.len()).map(NodeId)
                                                    .filter_map(|id| {
                                                        self.connected_starts(id)
                                                            .map(|set| (id, set.iter().copied().collect()))
                                                    })
                                                    .collect();
        let snap = GraphSnapshot { format_version: SNAPSHOT_FORMAT_VERSION,
                                   nodes,
                                   edges: self.edge_log.clone(),
                                   connected_starts };
        serde_json::to_vec_pretty(&snap).map_err(|e| GraphError::Snapshot(e.to_string()))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, GraphError> {
        let snap: GraphSnapshot = serde_json::from_slice(bytes).map_err(|e| GraphError::Snapshot(e.to_string()))?;
        if snap.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(GraphError::Snapshot(format!("unsupported format version {}", snap.format_version)));
        }
        let mut graph = ExperimentGraph::new();
        for (idx, entry) in snap.nodes.into_iter().enumerate() {
            let id = if entry.light {
                graph.light_node(entry.node)?
            } else {
                graph.register_node(entry.node)?
            };
            if id.0 != idx {
                return Err(GraphError::Snapshot(format!("node order mismatch at {idx}")));
            }
        }
        for (u, v) in snap.edges {
            graph.register_edge(u, v)?;
        }
        for (id, set) in snap.connected_starts {
            graph.merge_connected_starts(id, set)?;
        }
        Ok(graph)
    }

    /// Escribe el snapshot en `experiment_dir/0/experiment_graph.json`.
    pub fn write_snapshot(&self, experiment_dir: &Path) -> Result<PathBuf, GraphError> {
        let path = experiment_dir.join(SNAPSHOT_FILE);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, self.serialize()?)?;
        Ok(path)
    }

    pub fn read_snapshot(experiment_dir: &Path) -> Result<Self, GraphError> {
        let bytes = fs::read(experiment_dir.join(SNAPSHOT_FILE))?;
        Self::deserialize(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Resource};

    fn sample() -> ExperimentGraph {
        let mut g = ExperimentGraph::new();
        let alpha = g.register_node(Resource::literal_each("alpha", [0.0, 0.5])).unwrap();
        let data = g.register_node(Resource::artifact("data", "data.csv")).unwrap();
        let train = g.register_node(Action::new("train", [alpha, data]).pending(true)).unwrap();
        let model = g.register_node(Resource::artifact("model", "model.pkl").with_parent(train)).unwrap();
        g.register_edge(alpha, train).unwrap();
        g.register_edge(data, train).unwrap();
        g.register_edge(train, model).unwrap();
        g.light_node(Resource::pending_artifact("scratch")).unwrap();
        g
    }

    #[test]
    fn snapshot_rebuilds_same_structure() {
        let g = sample();
        let back = ExperimentGraph::deserialize(&g.serialize().unwrap()).unwrap();
        assert_eq!(back.starts_signature(), g.starts_signature());
        assert_eq!(back.edges(), g.edges());
        assert_eq!(back.len(), g.len());
        for (id, node) in g.nodes() {
            assert_eq!(back.node(id), Some(node));
        }
        assert!(!back.is_none_pending());
    }

    #[test]
    fn snapshot_file_lives_under_slot_zero() {
        let dir = tempfile::tempdir().unwrap();
        let g = sample();
        let path = g.write_snapshot(dir.path()).unwrap();
        assert!(path.ends_with("0/experiment_graph.json"));
        let back = ExperimentGraph::read_snapshot(dir.path()).unwrap();
        assert_eq!(back.starts_signature(), g.starts_signature());
    }

    #[test]
    fn absorbed_connected_starts_survive_snapshot() {
        let mut g = ExperimentGraph::new();
        let data = g.register_node(Resource::artifact("data", "data.csv")).unwrap();
        let train = g.register_node(Action::new("train", [data])).unwrap();
        let model = g.register_node(Resource::artifact("model", "model.pkl").with_parent(train)).unwrap();
        g.register_edge(data, train).unwrap();
        g.register_edge(train, model).unwrap();

        let mut sub = ExperimentGraph::new();
        let mut model_again = g.resource(model).unwrap().clone();
        model_again.parent = None;
        let shared = sub.register_node(model_again).unwrap();
        let eval = sub.register_node(Action::new("evaluate", [shared])).unwrap();
        sub.register_edge(shared, eval).unwrap();
        g.absorb(&sub).unwrap();

        let eval_id = g.nodes()
                       .find(|(_, n)| matches!(n, GraphNode::Action(a) if a.function_name == "evaluate"))
                       .map(|(id, _)| id)
                       .unwrap();
        // el modelo llega como start desde el sub-grafo absorbido
        assert!(g.connected_starts(eval_id).unwrap().contains(&model));

        let back = ExperimentGraph::deserialize(&g.serialize().unwrap()).unwrap();
        for (id, _) in g.nodes() {
            assert_eq!(back.connected_starts(id), g.connected_starts(id), "connected starts of {id}");
        }
    }

    #[test]
    fn snapshot_without_connected_starts_still_loads() {
        let g = sample();
        let mut raw: serde_json::Value = serde_json::from_slice(&g.serialize().unwrap()).unwrap();
        raw.as_object_mut().unwrap().remove("connected_starts");
        let back = ExperimentGraph::deserialize(&serde_json::to_vec(&raw).unwrap()).unwrap();
        for (id, _) in g.nodes() {
            assert_eq!(back.connected_starts(id), g.connected_starts(id));
        }
    }

    #[test]
    fn garbage_is_reported_as_snapshot_error() {
        let err = ExperimentGraph::deserialize(b"{not json").unwrap_err();
        assert!(matches!(err, GraphError::Snapshot(_)));
    }
}
