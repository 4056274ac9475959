//! Registro de recursos contra el store, compartido por commit, peek y fork.
use std::path::Path;

use log::debug;

use super::report::{ArtifactRecord, BindingRecord, LiteralRecord, StartRecord};
use crate::constants::{TAG_CHECKSUM, TAG_LOCATION, TAG_OUTPUT, TAG_VALUE};
use crate::errors::{GraphError, ProvenanceError};
use crate::graph::ExperimentGraph;
use crate::hashing::{file_checksum, hash_str, stringify};
use crate::keys::{LineageKey, NodeKey};
use crate::model::{GraphNode, Resource, ResourceKind};
use crate::store::{tags, NodeRecord, StoreId, Tag, Tags, VersionedGraphStore};

/// Comprueba que cada start sea un recurso con valor resuelto. Se llama
/// antes de la primera escritura en el store.
pub(crate) fn check_starts(graph: &ExperimentGraph) -> Result<(), ProvenanceError> {
    for id in graph.starts() {
        match graph.node(*id) {
            Some(GraphNode::Resource(r)) if r.is_pending() => return Err(ProvenanceError::Unresolved(r.name.clone())),
            Some(GraphNode::Resource(_)) => {}
            Some(GraphNode::Action(a)) => {
                return Err(ProvenanceError::TypeMismatch { key: a.function_name.clone(),
                                                           expected: "Literal or Artifact",
                                                           found: "Action" })
            }
            None => return Err(GraphError::UnknownNode(*id).into()),
        }
    }
    Ok(())
}

pub(crate) struct Session<'a, S: ?Sized> {
    pub store: &'a mut S,
    pub experiment: &'a str,
    pub run_dir: &'a Path,
}

impl<S: VersionedGraphStore + ?Sized> Session<'_, S> {
    /// Registra cada start del grafo y lo cuelga de la versión de spec.
    pub fn register_starts(&mut self,
                           graph: &ExperimentGraph,
                           spec_node: &NodeRecord,
                           spec_version: StoreId)
                           -> Result<Vec<StartRecord>, ProvenanceError> {
        let mut out = Vec::with_capacity(graph.starts().len());
        for id in graph.starts() {
            let resource = match graph.node(*id) {
                Some(GraphNode::Resource(r)) => r,
                Some(GraphNode::Action(a)) => {
                    return Err(ProvenanceError::TypeMismatch { key: a.function_name.clone(),
                                                               expected: "Literal or Artifact",
                                                               found: "Action" })
                }
                None => return Err(GraphError::UnknownNode(*id).into()),
            };
            let record = self.register_resource(resource)?;
            let name = record.name().to_string();
            let edge = self.store
                           .upsert_edge(record.source_key(), &name, spec_node.id, record.node_id(), Tags::new())?
                           .into_inner();
            self.store.create_edge_version(edge.id, spec_version, record.version_id())?;
            out.push(record);
        }
        debug!("registered {} starts for {}", out.len(), self.experiment);
        Ok(out)
    }

    pub fn register_resource(&mut self, resource: &Resource) -> Result<StartRecord, ProvenanceError> {
        match &resource.kind {
            ResourceKind::Literal(_) => self.register_literal(resource).map(StartRecord::Literal),
            ResourceKind::Artifact(_) => self.register_artifact(resource).map(StartRecord::Artifact),
        }
    }

    fn register_literal(&mut self, resource: &Resource) -> Result<LiteralRecord, ProvenanceError> {
        let literal = resource.as_literal()
                              .filter(|l| !l.value.is_pending())
                              .ok_or_else(|| ProvenanceError::Unresolved(resource.name.clone()))?;
        let key = NodeKey::Literal { experiment: self.experiment,
                                     name: &resource.name };
        let node = self.store.upsert_node(&key.render(), &resource.name, Tags::new())?.into_inner();
        let version = self.store.singleton_version(&node, Tags::new())?.into_inner();

        let mut bindings = Vec::new();
        for value in literal.bindings() {
            let text = stringify(value);
            let hash = hash_str(&text);
            let binding_key = NodeKey::Binding { experiment: self.experiment,
                                                 literal: &resource.name,
                                                 hash: &hash }.render();
            let value_tags = tags([Tag::string(TAG_VALUE, text.clone())]);
            let binding_node = self.store
                                   .upsert_node(&binding_key, &resource.name, value_tags.clone())?
                                   .into_inner();
            let binding = self.store.singleton_version(&binding_node, value_tags)?;
            let edge = self.store.upsert_edge(&binding_key, &resource.name, node.id, binding_node.id, Tags::new())?;
            if edge.was_created() || binding.was_created() {
                self.store.create_edge_version(edge.get().id, version.id, binding.get().id)?;
            }
            bindings.push(BindingRecord { literal: resource.name.clone(),
                                          value: text,
                                          hash,
                                          source_key: binding_key,
                                          version_id: binding.get().id,
                                          created: binding.was_created() });
        }
        Ok(LiteralRecord { name: resource.name.clone(),
                           source_key: node.source_key,
                           node_id: node.id,
                           version_id: version.id,
                           bindings })
    }

    /// El nodo de un artifact se identifica por su ubicación; el checksum
    /// del contenido va en las etiquetas de cada versión.
    fn artifact_node(&mut self, resource: &Resource) -> Result<(NodeRecord, String, String), ProvenanceError> {
        let location = resource.location()
                               .ok_or_else(|| ProvenanceError::Unresolved(resource.name.clone()))?
                               .to_string();
        let checksum = file_checksum(&location, self.run_dir).map_err(GraphError::from)?;
        let key = NodeKey::Artifact { experiment: self.experiment,
                                      location: &location }.render();
        let node = self.store
                       .upsert_node(&key, &resource.name, tags([Tag::string(TAG_LOCATION, location.clone())]))?
                       .into_inner();
        Ok((node, location, checksum))
    }

    /// Reutiliza la cabeza si el contenido no cambió; si cambió, abre una
    /// versión nueva colgada de ella.
    fn register_artifact(&mut self, resource: &Resource) -> Result<ArtifactRecord, ProvenanceError> {
        let (node, location, checksum) = self.artifact_node(resource)?;
        let version_tags = tags([Tag::string(TAG_CHECKSUM, checksum.clone()),
                                 Tag::string(TAG_LOCATION, location.clone())]);
        let version_id = match self.store.latest_version(&node.source_key)? {
            None => self.store.singleton_version(&node, version_tags)?.into_inner().id,
            Some(head) => {
                let current = self.store.get_node_version(head)?;
                if current.tag(TAG_CHECKSUM) == Some(checksum.as_str()) {
                    head
                } else {
                    debug!("artifact {location} changed, new version over #{head}");
                    self.store.create_node_version(node.id, version_tags, &[head])?.id
                }
            }
        };
        Ok(ArtifactRecord { name: resource.name.clone(),
                            location,
                            checksum,
                            source_key: node.source_key,
                            node_id: node.id,
                            version_id })
    }

    /// Salida descubierta por `peek`: versión nueva etiquetada `output`.
    pub fn register_output(&mut self, resource: &Resource) -> Result<ArtifactRecord, ProvenanceError> {
        let (node, location, checksum) = self.artifact_node(resource)?;
        let parents: Vec<StoreId> = self.store.latest_version(&node.source_key)?.into_iter().collect();
        let version_tags = tags([Tag::string(TAG_CHECKSUM, checksum.clone()),
                                 Tag::string(TAG_OUTPUT, location.clone())]);
        let version = self.store.create_node_version(node.id, version_tags, &parents)?;
        Ok(ArtifactRecord { name: resource.name.clone(),
                            location,
                            checksum,
                            source_key: node.source_key,
                            node_id: node.id,
                            version_id: version.id })
    }

    pub fn lineage(&mut self, key: LineageKey<'_>, from: StoreId, to: StoreId) -> Result<StoreId, ProvenanceError> {
        let key = key.render();
        let edge = self.store.upsert_lineage_edge(&key, "lineage", Tags::new())?.into_inner();
        let version = self.store.create_lineage_edge_version(edge.id, from, to)?;
        debug!("lineage {key}: #{from} -> #{to}");
        Ok(version.id)
    }
}
