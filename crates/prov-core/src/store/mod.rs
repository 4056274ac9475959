//! Contrato del store de grafo versionado y sus adaptadores en memoria.
//!
//! El store es append-only: nodos, aristas, versiones y aristas de linaje se
//! crean pero nunca se modifican ni se borran. Las claves de origen
//! (`source_key`) son únicas por tipo de registro.
mod flaky;
mod memory;
pub mod types;

use std::collections::BTreeMap;

use log::warn;
use thiserror::Error;

pub use flaky::FlakyReads;
pub use memory::InMemoryGraphStore;
pub use types::{tag_value, tags, EdgeRecord, EdgeVersion, LineageEdge, LineageEdgeVersion, NodeRecord,
                NodeVersion, StoreId, Tag, TagType, Tags};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")] NotFound(String),
    /// La clave ya existe (creación concurrente o fila previa).
    #[error("conflict on {0}")] Conflict(String),
    /// Fallo del backend ajeno a la existencia del registro.
    #[error("store unavailable: {0}")] Unavailable(String),
    #[error("{count} latest versions for {key}, expected at most one")] Ambiguous { key: String, count: usize },
}

/// Resultado de un upsert: registro ya existente o recién creado.
#[derive(Debug, Clone, PartialEq)]
pub enum Upsert<T> {
    Existing(T),
    Created(T),
}

impl<T> Upsert<T> {
    pub fn get(&self) -> &T {
        match self {
            Upsert::Existing(v) | Upsert::Created(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Upsert::Existing(v) | Upsert::Created(v) => v,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Upsert::Created(_))
    }
}

/// Superficie mínima que el grabador de procedencia necesita del store.
pub trait VersionedGraphStore {
    fn get_node(&self, key: &str) -> Result<Option<NodeRecord>, StoreError>;
    fn create_node(&mut self, key: &str, name: &str, tags: Tags) -> Result<NodeRecord, StoreError>;

    fn get_edge(&self, key: &str) -> Result<Option<EdgeRecord>, StoreError>;
    fn create_edge(&mut self,
                   key: &str,
                   name: &str,
                   from_node: StoreId,
                   to_node: StoreId,
                   tags: Tags)
                   -> Result<EdgeRecord, StoreError>;

    /// Versión(es) cabeza del nodo con clave `node_key` (0 ó 1 en un store
    /// sano). Una clave inexistente devuelve lista vacía.
    fn get_latest_node_versions(&self, node_key: &str) -> Result<Vec<StoreId>, StoreError>;
    fn get_node_version(&self, id: StoreId) -> Result<NodeVersion, StoreError>;
    fn create_node_version(&mut self,
                           node_id: StoreId,
                           tags: Tags,
                           parent_ids: &[StoreId])
                           -> Result<NodeVersion, StoreError>;

    fn create_edge_version(&mut self,
                           edge_id: StoreId,
                           from_version: StoreId,
                           to_version: StoreId)
                           -> Result<EdgeVersion, StoreError>;

    fn get_lineage_edge(&self, key: &str) -> Result<Option<LineageEdge>, StoreError>;
    fn create_lineage_edge(&mut self, key: &str, name: &str, tags: Tags) -> Result<LineageEdge, StoreError>;
    fn create_lineage_edge_version(&mut self,
                                   lineage_edge_id: StoreId,
                                   from_version: StoreId,
                                   to_version: StoreId)
                                   -> Result<LineageEdgeVersion, StoreError>;

    /// Historia completa del nodo: clave de orden opaca (ordenable) -> versión.
    fn get_node_history(&self, node_key: &str) -> Result<BTreeMap<String, StoreId>, StoreError>;

    /// Aristas estructurales que salen de `node_id`, en orden de creación.
    fn list_edges_from(&self, node_id: StoreId) -> Result<Vec<EdgeRecord>, StoreError>;
    fn list_edge_versions(&self, edge_id: StoreId) -> Result<Vec<EdgeVersion>, StoreError>;
    fn list_lineage_edge_versions(&self, lineage_edge_id: StoreId) -> Result<Vec<LineageEdgeVersion>, StoreError>;

    fn upsert_node(&mut self, key: &str, name: &str, tags: Tags) -> Result<Upsert<NodeRecord>, StoreError> {
        upsert_with(self, key, |s, k| s.get_node(k), |s| s.create_node(key, name, tags))
    }

    fn upsert_edge(&mut self,
                   key: &str,
                   name: &str,
                   from_node: StoreId,
                   to_node: StoreId,
                   tags: Tags)
                   -> Result<Upsert<EdgeRecord>, StoreError> {
        upsert_with(self,
                    key,
                    |s, k| s.get_edge(k),
                    |s| s.create_edge(key, name, from_node, to_node, tags))
    }

    fn upsert_lineage_edge(&mut self, key: &str, name: &str, tags: Tags) -> Result<Upsert<LineageEdge>, StoreError> {
        upsert_with(self, key, |s, k| s.get_lineage_edge(k), |s| s.create_lineage_edge(key, name, tags))
    }

    /// Cabeza del nodo: `None` si no tiene versiones, `Ambiguous` si hay más
    /// de una.
    fn latest_version(&self, node_key: &str) -> Result<Option<StoreId>, StoreError> {
        let latest = self.get_latest_node_versions(node_key)?;
        match latest.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(*only)),
            many => Err(StoreError::Ambiguous { key: node_key.to_string(),
                                                count: many.len() }),
        }
    }

    /// Versión única de `node`: la reutiliza si existe, si no la crea sin
    /// padres. Garantiza bindings singleton por clave.
    fn singleton_version(&mut self, node: &NodeRecord, tags: Tags) -> Result<Upsert<NodeVersion>, StoreError> {
        let existing = match self.latest_version(&node.source_key) {
            Ok(found) => found,
            Err(StoreError::Unavailable(reason)) => {
                warn!("latest versions of {} unavailable ({reason}); creating", node.source_key);
                None
            }
            Err(e) => return Err(e),
        };
        match existing {
            Some(id) => Ok(Upsert::Existing(self.get_node_version(id)?)),
            None => Ok(Upsert::Created(self.create_node_version(node.id, tags, &[])?)),
        }
    }
}

/// Lectura optimista y creación; `Unavailable` en la lectura se registra y
/// cae a la creación, `Conflict` en la creación relee.
fn upsert_with<S, T, R, C>(store: &mut S, key: &str, read: R, create: C) -> Result<Upsert<T>, StoreError>
    where S: ?Sized,
          R: Fn(&S, &str) -> Result<Option<T>, StoreError>,
          C: FnOnce(&mut S) -> Result<T, StoreError>
{
    match read(&*store, key) {
        Ok(Some(found)) => return Ok(Upsert::Existing(found)),
        Ok(None) => {}
        Err(StoreError::Unavailable(reason)) => warn!("read of {key} failed ({reason}); falling through to create"),
        Err(e) => return Err(e),
    }
    match create(store) {
        Ok(made) => Ok(Upsert::Created(made)),
        Err(StoreError::Conflict(_)) => read(&*store, key)?.map(Upsert::Existing)
                                                        .ok_or_else(|| StoreError::Conflict(key.to_string())),
        Err(e) => Err(e),
    }
}
