use std::collections::BTreeMap;

use super::types::*;
use super::{StoreError, VersionedGraphStore};

/// Envoltorio que reproduce un backend cuyas lecturas negativas fallan: una
/// búsqueda por clave inexistente devuelve `Unavailable` en vez de `None`.
/// El resto de operaciones se delega sin cambios.
#[derive(Debug, Default, Clone)]
pub struct FlakyReads<S> {
    inner: S,
}

impl<S> FlakyReads<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

fn flaky<T>(key: &str, found: Option<T>) -> Result<Option<T>, StoreError> {
    match found {
        Some(v) => Ok(Some(v)),
        None => Err(StoreError::Unavailable(format!("read timeout for {key}"))),
    }
}

impl<S: VersionedGraphStore> VersionedGraphStore for FlakyReads<S> {
    fn get_node(&self, key: &str) -> Result<Option<NodeRecord>, StoreError> {
        flaky(key, self.inner.get_node(key)?)
    }

    fn create_node(&mut self, key: &str, name: &str, tags: Tags) -> Result<NodeRecord, StoreError> {
        self.inner.create_node(key, name, tags)
    }

    fn get_edge(&self, key: &str) -> Result<Option<EdgeRecord>, StoreError> {
        flaky(key, self.inner.get_edge(key)?)
    }

    fn create_edge(&mut self,
                   key: &str,
                   name: &str,
                   from_node: StoreId,
                   to_node: StoreId,
                   tags: Tags)
                   -> Result<EdgeRecord, StoreError> {
        self.inner.create_edge(key, name, from_node, to_node, tags)
    }

    fn get_latest_node_versions(&self, node_key: &str) -> Result<Vec<StoreId>, StoreError> {
        self.inner.get_latest_node_versions(node_key)
    }

    fn get_node_version(&self, id: StoreId) -> Result<NodeVersion, StoreError> {
        self.inner.get_node_version(id)
    }

    fn create_node_version(&mut self,
                           node_id: StoreId,
                           tags: Tags,
                           parent_ids: &[StoreId])
                           -> Result<NodeVersion, StoreError> {
        self.inner.create_node_version(node_id, tags, parent_ids)
    }

    fn create_edge_version(&mut self,
                           edge_id: StoreId,
                           from_version: StoreId,
                           to_version: StoreId)
                           -> Result<EdgeVersion, StoreError> {
        self.inner.create_edge_version(edge_id, from_version, to_version)
    }

    fn get_lineage_edge(&self, key: &str) -> Result<Option<LineageEdge>, StoreError> {
        flaky(key, self.inner.get_lineage_edge(key)?)
    }

    fn create_lineage_edge(&mut self, key: &str, name: &str, tags: Tags) -> Result<LineageEdge, StoreError> {
        self.inner.create_lineage_edge(key, name, tags)
    }

    fn create_lineage_edge_version(&mut self,
                                   lineage_edge_id: StoreId,
                                   from_version: StoreId,
                                   to_version: StoreId)
                                   -> Result<LineageEdgeVersion, StoreError> {
        self.inner.create_lineage_edge_version(lineage_edge_id, from_version, to_version)
    }

    fn get_node_history(&self, node_key: &str) -> Result<BTreeMap<String, StoreId>, StoreError> {
        self.inner.get_node_history(node_key)
    }

    fn list_edges_from(&self, node_id: StoreId) -> Result<Vec<EdgeRecord>, StoreError> {
        self.inner.list_edges_from(node_id)
    }

    fn list_edge_versions(&self, edge_id: StoreId) -> Result<Vec<EdgeVersion>, StoreError> {
        self.inner.list_edge_versions(edge_id)
    }

    fn list_lineage_edge_versions(&self, lineage_edge_id: StoreId) -> Result<Vec<LineageEdgeVersion>, StoreError> {
        self.inner.list_lineage_edge_versions(lineage_edge_id)
    }
}
