//! Grabador de procedencia.
//!
//! Traduce el estado del `ExperimentGraph` en versiones del store:
//! - `commit`: una versión de spec por invocación + registro/deduplicación de
//!   los starts (literales, bindings, artifacts);
//! - `peek`: lo mismo en fase `Post` más acciones, un trial y las capturas
//!   intermedias del directorio de ejecución;
//! - `fork`: abre una línea nueva en fase `Pre` a partir de un commit
//!   histórico, restaurando el grafo desde el control de versiones.
//!
//! Un único mutador por experimento; el grabador no sincroniza nada.
mod commit;
mod fork;
mod peek;
pub mod report;
mod session;

use std::path::Path;

use chrono::Utc;
use log::{debug, info};

pub use report::{ActionRecord, ArtifactRecord, BindingRecord, BindingSummary, CommitReport, ExecutionPhase,
                 ForkReport, GhostLink, LiteralRecord, PeekReport, SpecTags, SpecVersionRecord, StartRecord};

use crate::config::ExperimentConfig;
use crate::constants::{SNAPSHOT_FILE, TAG_VALUE};
use crate::errors::ProvenanceError;
use crate::graph::ExperimentGraph;
use crate::keys::NodeKey;
use crate::store::{NodeRecord, StoreId, Tags, VersionedGraphStore};
use crate::vcs::VersionControl;
use session::Session;

pub struct ProvenanceRecorder<S, V> {
    config: ExperimentConfig,
    store: S,
    vcs: V,
    graph: ExperimentGraph,
}

impl<S, V> ProvenanceRecorder<S, V>
    where S: VersionedGraphStore,
          V: VersionControl
{
    pub fn new(config: ExperimentConfig, store: S, vcs: V, graph: ExperimentGraph) -> Self {
        Self { config,
               store,
               vcs,
               graph }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn graph(&self) -> &ExperimentGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut ExperimentGraph {
        &mut self.graph
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    pub fn into_parts(self) -> (S, V, ExperimentGraph) {
        (self.store, self.vcs, self.graph)
    }

    /// Escribe el snapshot del grafo en el directorio versionado y lo
    /// registra en el control de versiones. Devuelve el hash del commit.
    pub fn checkpoint(&mut self, message: &str) -> Result<String, ProvenanceError> {
        let dir = self.config.experiment_dir();
        let bytes = self.graph.serialize()?;
        self.vcs.write_file(&dir, Path::new(SNAPSHOT_FILE), &bytes)?;
        let hash = self.vcs.commit_all(&dir, message)?;
        info!("checkpoint {hash} for {}", self.config.experiment_name);
        Ok(hash)
    }

    /// Versiones de spec en orden de creación.
    pub fn history(&self) -> Result<Vec<SpecVersionRecord>, ProvenanceError> {
        let key = self.spec_key();
        let mut out = Vec::new();
        for id in self.store.get_node_history(&key)?.into_values() {
            let version = self.store.get_node_version(id)?;
            out.push(SpecVersionRecord { version_id: version.id,
                                         parent: version.parent_ids.first().copied(),
                                         tags: SpecTags::from_version(&version)? });
        }
        Ok(out)
    }

    /// Todos los valores enlazados alguna vez al literal `literal`.
    pub fn bindings_for(&self, literal: &str) -> Result<Vec<BindingSummary>, ProvenanceError> {
        let key = NodeKey::Literal { experiment: &self.config.experiment_name,
                                     name: literal }.render();
        let Some(node) = self.store.get_node(&key)? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for edge in self.store.list_edges_from(node.id)? {
            let Some(version_id) = self.store.latest_version(&edge.source_key)? else {
                continue;
            };
            let version = self.store.get_node_version(version_id)?;
            let hash = edge.source_key.rsplit('.').next().unwrap_or_default().to_string();
            out.push(BindingSummary { value: version.tag(TAG_VALUE).unwrap_or_default().to_string(),
                                      hash,
                                      version_id });
        }
        Ok(out)
    }

    fn spec_key(&self) -> String {
        NodeKey::Spec { experiment: &self.config.experiment_name }.render()
    }

    fn spec_node(&mut self) -> Result<NodeRecord, ProvenanceError> {
        let key = self.spec_key();
        Ok(self.store
               .upsert_node(&key, &self.config.experiment_name, Tags::new())?
               .into_inner())
    }

    /// Agrega una versión de spec encadenada a la cabeza actual.
    fn append_spec_version(&mut self,
                           phase: ExecutionPhase)
                           -> Result<(NodeRecord, SpecVersionRecord), ProvenanceError> {
        let node = self.spec_node()?;
        let previous = self.store.latest_version(&node.source_key)?;
        let previous_tags = match previous {
            Some(id) => Some(SpecTags::from_version(&self.store.get_node_version(id)?)?),
            None => None,
        };
        let sequence_number = previous_tags.as_ref().map_or(0, |t| t.sequence_number + 1);
        let commit_hash = self.vcs.current_commit(&self.config.experiment_dir())?;
        // la fase de un commit sólo avanza Pre -> Post
        if let Some(prev) = &previous_tags {
            if prev.commit_hash == commit_hash && prev.phase == ExecutionPhase::Post && phase == ExecutionPhase::Pre {
                return Err(ProvenanceError::InvariantViolation(format!("commit {commit_hash} already executed (Post); \
                                                                         cannot record it as Pre again")));
            }
        }
        let tags = SpecTags { timestamp: Utc::now(),
                              commit_hash,
                              sequence_number,
                              phase };
        let parents: Vec<StoreId> = previous.into_iter().collect();
        let version = self.store.create_node_version(node.id, tags.to_tags(), &parents)?;
        debug!("spec version #{} (seq {sequence_number}, {phase}) for {}",
               version.id,
               self.config.experiment_name);
        Ok((node,
            SpecVersionRecord { version_id: version.id,
                                parent: previous,
                                tags }))
    }

    fn session<'a>(store: &'a mut S, experiment: &'a str, run_dir: &'a Path) -> Session<'a, S> {
        Session { store,
                  experiment,
                  run_dir }
    }
}
