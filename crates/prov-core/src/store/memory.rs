use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};

use super::types::*;
use super::{StoreError, VersionedGraphStore};

/// Store versionado en memoria.
///
/// Ids secuenciales compartidos por todas las tablas, vectores append-only e
/// índices por clave de origen. La cabeza de un nodo es su versión creada más
/// recientemente. Puede volcarse a / cargarse desde un archivo JSON.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct InMemoryGraphStore {
    next_id: StoreId,
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeRecord>,
    node_versions: Vec<NodeVersion>,
    edge_versions: Vec<EdgeVersion>,
    lineage_edges: Vec<LineageEdge>,
    lineage_edge_versions: Vec<LineageEdgeVersion>,
    #[serde(skip)]
    index: Index,
}

#[derive(Debug, Default, Clone)]
struct Index {
    node_by_key: HashMap<String, usize>,
    node_by_id: HashMap<StoreId, usize>,
    edge_by_key: HashMap<String, usize>,
    edge_by_id: HashMap<StoreId, usize>,
    lineage_by_key: HashMap<String, usize>,
    lineage_by_id: HashMap<StoreId, usize>,
    version_by_id: HashMap<StoreId, usize>,
    heads: HashMap<StoreId, Vec<StoreId>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Carga un store volcado con `save_to`; archivo ausente = store vacío.
    pub fn load_from(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = fs::read(path).map_err(|e| StoreError::Unavailable(format!("{}: {e}", path.display())))?;
        let mut store: Self = serde_json::from_slice(&bytes).map_err(|e| {
                                                                    StoreError::Unavailable(format!("{}: {e}",
                                                                                                    path.display()))
                                                                })?;
        store.reindex();
        debug!("loaded store from {} ({} nodes)", path.display(), store.nodes.len());
        Ok(store)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        fs::write(path, bytes).map_err(|e| StoreError::Unavailable(format!("{}: {e}", path.display())))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_version_count(&self) -> usize {
        self.node_versions.len()
    }

    pub fn lineage_edge_versions(&self) -> &[LineageEdgeVersion] {
        &self.lineage_edge_versions
    }

    /// Nodos cuya clave empieza por `prefix`, en orden de creación.
    pub fn nodes_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a NodeRecord> + 'a {
        self.nodes.iter().filter(move |n| n.source_key.starts_with(prefix))
    }

    /// Todas las versiones del nodo `node_key`, en orden de creación.
    pub fn versions_of(&self, node_key: &str) -> Vec<&NodeVersion> {
        let Some(node) = self.index.node_by_key.get(node_key).map(|i| &self.nodes[*i]) else {
            return Vec::new();
        };
        self.node_versions.iter().filter(|v| v.node_id == node.id).collect()
    }

    /// Versiones de la arista de linaje `key`.
    pub fn lineage_versions_by_key(&self, key: &str) -> Vec<&LineageEdgeVersion> {
        let Some(edge) = self.index.lineage_by_key.get(key).map(|i| &self.lineage_edges[*i]) else {
            return Vec::new();
        };
        self.lineage_edge_versions.iter().filter(|v| v.lineage_edge_id == edge.id).collect()
    }

    #[cfg(test)]
    pub(crate) fn force_extra_head(&mut self, node_key: &str) -> Result<StoreId, StoreError> {
        let node_id = self.node_by_key(node_key)?.id;
        let id = self.bump();
        self.node_versions.push(NodeVersion { id,
                                              node_id,
                                              tags: Tags::new(),
                                              parent_ids: vec![],
                                              created_at: Utc::now() });
        self.index.version_by_id.insert(id, self.node_versions.len() - 1);
        self.index.heads.entry(node_id).or_default().push(id);
        Ok(id)
    }

    fn bump(&mut self) -> StoreId {
        self.next_id += 1;
        self.next_id
    }

    fn reindex(&mut self) {
        let mut index = Index::default();
        for (i, n) in self.nodes.iter().enumerate() {
            index.node_by_key.insert(n.source_key.clone(), i);
            index.node_by_id.insert(n.id, i);
        }
        for (i, e) in self.edges.iter().enumerate() {
            index.edge_by_key.insert(e.source_key.clone(), i);
            index.edge_by_id.insert(e.id, i);
        }
        for (i, l) in self.lineage_edges.iter().enumerate() {
            index.lineage_by_key.insert(l.source_key.clone(), i);
            index.lineage_by_id.insert(l.id, i);
        }
        for (i, v) in self.node_versions.iter().enumerate() {
            index.version_by_id.insert(v.id, i);
            index.heads.insert(v.node_id, vec![v.id]);
        }
        self.index = index;
    }

    #[cfg(test)]
    fn node_by_key(&self, key: &str) -> Result<&NodeRecord, StoreError> {
        self.index
            .node_by_key
            .get(key)
            .map(|i| &self.nodes[*i])
            .ok_or_else(|| StoreError::NotFound(format!("node {key}")))
    }

    fn require_node(&self, id: StoreId) -> Result<(), StoreError> {
        if self.index.node_by_id.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("node #{id}")))
        }
    }

    fn require_version(&self, id: StoreId) -> Result<(), StoreError> {
        if self.index.version_by_id.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("node version #{id}")))
        }
    }
}

impl VersionedGraphStore for InMemoryGraphStore {
    fn get_node(&self, key: &str) -> Result<Option<NodeRecord>, StoreError> {
        Ok(self.index.node_by_key.get(key).map(|i| self.nodes[*i].clone()))
    }

    fn create_node(&mut self, key: &str, name: &str, tags: Tags) -> Result<NodeRecord, StoreError> {
        if self.index.node_by_key.contains_key(key) {
            return Err(StoreError::Conflict(key.to_string()));
        }
        let rec = NodeRecord { id: self.bump(),
                               source_key: key.to_string(),
                               name: name.to_string(),
                               tags,
                               created_at: Utc::now() };
        self.index.node_by_key.insert(rec.source_key.clone(), self.nodes.len());
        self.index.node_by_id.insert(rec.id, self.nodes.len());
        self.nodes.push(rec.clone());
        debug!("node #{} {key}", rec.id);
        Ok(rec)
    }

    fn get_edge(&self, key: &str) -> Result<Option<EdgeRecord>, StoreError> {
        Ok(self.index.edge_by_key.get(key).map(|i| self.edges[*i].clone()))
    }

    fn create_edge(&mut self,
                   key: &str,
                   name: &str,
                   from_node: StoreId,
                   to_node: StoreId,
                   tags: Tags)
                   -> Result<EdgeRecord, StoreError> {
        if self.index.edge_by_key.contains_key(key) {
            return Err(StoreError::Conflict(key.to_string()));
        }
        self.require_node(from_node)?;
        self.require_node(to_node)?;
        let rec = EdgeRecord { id: self.bump(),
                               source_key: key.to_string(),
                               name: name.to_string(),
                               from_node,
                               to_node,
                               tags,
                               created_at: Utc::now() };
        self.index.edge_by_key.insert(rec.source_key.clone(), self.edges.len());
        self.index.edge_by_id.insert(rec.id, self.edges.len());
        self.edges.push(rec.clone());
        debug!("edge #{} {key}", rec.id);
        Ok(rec)
    }

    fn get_latest_node_versions(&self, node_key: &str) -> Result<Vec<StoreId>, StoreError> {
        let Some(node) = self.index.node_by_key.get(node_key).map(|i| &self.nodes[*i]) else {
            return Ok(Vec::new());
        };
        Ok(self.index.heads.get(&node.id).cloned().unwrap_or_default())
    }

    fn get_node_version(&self, id: StoreId) -> Result<NodeVersion, StoreError> {
        self.index
            .version_by_id
            .get(&id)
            .map(|i| self.node_versions[*i].clone())
            .ok_or_else(|| StoreError::NotFound(format!("node version #{id}")))
    }

    fn create_node_version(&mut self,
                           node_id: StoreId,
                           tags: Tags,
                           parent_ids: &[StoreId])
                           -> Result<NodeVersion, StoreError> {
        self.require_node(node_id)?;
        for parent in parent_ids {
            self.require_version(*parent)?;
        }
        let version = NodeVersion { id: self.bump(),
                                    node_id,
                                    tags,
                                    parent_ids: parent_ids.to_vec(),
                                    created_at: Utc::now() };
        self.index.version_by_id.insert(version.id, self.node_versions.len());
        self.index.heads.insert(node_id, vec![version.id]);
        self.node_versions.push(version.clone());
        debug!("node version #{} of node #{node_id}", version.id);
        Ok(version)
    }

    fn create_edge_version(&mut self,
                           edge_id: StoreId,
                           from_version: StoreId,
                           to_version: StoreId)
                           -> Result<EdgeVersion, StoreError> {
        if !self.index.edge_by_id.contains_key(&edge_id) {
            return Err(StoreError::NotFound(format!("edge #{edge_id}")));
        }
        self.require_version(from_version)?;
        self.require_version(to_version)?;
        let version = EdgeVersion { id: self.bump(),
                                    edge_id,
                                    from_version,
                                    to_version,
                                    created_at: Utc::now() };
        self.edge_versions.push(version.clone());
        Ok(version)
    }

    fn get_lineage_edge(&self, key: &str) -> Result<Option<LineageEdge>, StoreError> {
        Ok(self.index.lineage_by_key.get(key).map(|i| self.lineage_edges[*i].clone()))
    }

    fn create_lineage_edge(&mut self, key: &str, name: &str, tags: Tags) -> Result<LineageEdge, StoreError> {
        if self.index.lineage_by_key.contains_key(key) {
            return Err(StoreError::Conflict(key.to_string()));
        }
        let rec = LineageEdge { id: self.bump(),
                                source_key: key.to_string(),
                                name: name.to_string(),
                                tags,
                                created_at: Utc::now() };
        self.index.lineage_by_key.insert(rec.source_key.clone(), self.lineage_edges.len());
        self.index.lineage_by_id.insert(rec.id, self.lineage_edges.len());
        self.lineage_edges.push(rec.clone());
        debug!("lineage edge #{} {key}", rec.id);
        Ok(rec)
    }

    fn create_lineage_edge_version(&mut self,
                                   lineage_edge_id: StoreId,
                                   from_version: StoreId,
                                   to_version: StoreId)
                                   -> Result<LineageEdgeVersion, StoreError> {
        if !self.index.lineage_by_id.contains_key(&lineage_edge_id) {
            return Err(StoreError::NotFound(format!("lineage edge #{lineage_edge_id}")));
        }
        self.require_version(from_version)?;
        self.require_version(to_version)?;
        let version = LineageEdgeVersion { id: self.bump(),
                                           lineage_edge_id,
                                           from_version,
                                           to_version,
                                           created_at: Utc::now() };
        self.lineage_edge_versions.push(version.clone());
        Ok(version)
    }

    fn get_node_history(&self, node_key: &str) -> Result<BTreeMap<String, StoreId>, StoreError> {
        Ok(self.versions_of(node_key).into_iter().map(|v| (format!("{:020}", v.id), v.id)).collect())
    }

    fn list_edges_from(&self, node_id: StoreId) -> Result<Vec<EdgeRecord>, StoreError> {
        Ok(self.edges.iter().filter(|e| e.from_node == node_id).cloned().collect())
    }

    fn list_edge_versions(&self, edge_id: StoreId) -> Result<Vec<EdgeVersion>, StoreError> {
        Ok(self.edge_versions.iter().filter(|v| v.edge_id == edge_id).cloned().collect())
    }

    fn list_lineage_edge_versions(&self, lineage_edge_id: StoreId) -> Result<Vec<LineageEdgeVersion>, StoreError> {
        Ok(self.lineage_edge_versions
               .iter()
               .filter(|v| v.lineage_edge_id == lineage_edge_id)
               .cloned()
               .collect())
    }
}
