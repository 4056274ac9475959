use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde_json::Value;

use super::report::{bindings_of, ActionRecord, GhostLink, PeekReport, StartRecord};
use super::session::check_starts;
use super::{ExecutionPhase, ProvenanceRecorder};
use crate::constants::{GHOST_EXTENSION, GHOST_PREFIX, TAG_FUNCTION, TAG_TRIAL_NUMBER};
use crate::errors::ProvenanceError;
use crate::graph::ExperimentGraph;
use crate::hashing::stringify;
use crate::keys::{LineageKey, NodeKey, ResourceRole};
use crate::model::{NodeId, Resource};
use crate::store::{tags, StoreId, Tag, Tags, VersionedGraphStore};
use crate::vcs::VersionControl;

impl<S, V> ProvenanceRecorder<S, V>
    where S: VersionedGraphStore,
          V: VersionControl
{
    /// Instantánea diagnóstica de la ejecución actual.
    ///
    /// Además de la versión de spec (fase `Post`) y los starts, registra una
    /// invocación por acción no-start, un trial colgado del nodo `peek`, las
    /// salidas de la acción que produce `location`, y enlaza las capturas
    /// `ghost_literal_{n}.json` del directorio de ejecución con sus bindings.
    pub fn peek(&mut self, location: &str) -> Result<PeekReport, ProvenanceError> {
        let run_dir = self.config.run_dir();
        let ghosts = read_ghosts(&run_dir)?;
        check_starts(&self.graph)?;

        let (spec_node, spec) = self.append_spec_version(ExecutionPhase::Post)?;
        let experiment = self.config.experiment_name.as_str();
        let graph = &self.graph;
        let mut session = Self::session(&mut self.store, experiment, &run_dir);
        let starts = session.register_starts(graph, &spec_node, spec.version_id)?;

        let dummy_node = session.store
                                .upsert_node(&NodeKey::Dummy { experiment }.render(), "dummy", Tags::new())?
                                .into_inner();
        let dummy = session.store.create_node_version(dummy_node.id, Tags::new(), &[])?;
        for start in &starts {
            match start {
                StartRecord::Literal(l) => {
                    for b in &l.bindings {
                        session.lineage(LineageKey::BindingToDummy { experiment,
                                                                     literal: &l.name,
                                                                     hash: &b.hash },
                                        b.version_id,
                                        dummy.id)?;
                    }
                }
                StartRecord::Artifact(a) => {
                    session.lineage(LineageKey::ArtifactToDummy { experiment,
                                                                  hash: &a.checksum },
                                    a.version_id,
                                    dummy.id)?;
                }
            }
        }

        let mut actions = Vec::new();
        for (_, action) in graph.non_start_actions() {
            let function = action.function_name.as_str();
            let invocation = session.store.create_node_version(dummy_node.id,
                                                               tags([Tag::string(TAG_FUNCTION, function)]),
                                                               &[])?;
            let mut inputs = 0;
            for input in resources(graph, &action.in_artifacts) {
                let record = session.register_resource(input)?;
                let (role, ident) = role_and_ident(input);
                session.lineage(LineageKey::ActionInput { experiment,
                                                          function,
                                                          role,
                                                          ident },
                                record.version_id(),
                                invocation.id)?;
                inputs += 1;
            }
            let mut outputs = 0;
            for output in resources(graph, &action.out_artifacts) {
                let record = session.register_resource(output)?;
                let (role, ident) = role_and_ident(output);
                session.lineage(LineageKey::ActionOutput { experiment,
                                                           function,
                                                           role,
                                                           ident },
                                invocation.id,
                                record.version_id())?;
                outputs += 1;
            }
            actions.push(ActionRecord { function: function.to_string(),
                                        invocation_version: invocation.id,
                                        inputs,
                                        outputs });
        }

        let peek_key = NodeKey::Peek { experiment }.render();
        let trial_key = NodeKey::Trial { experiment }.render();
        let peek_node = session.store.upsert_node(&peek_key, "peek", Tags::new())?.into_inner();
        let trial_node = session.store.upsert_node(&trial_key, "trials", Tags::new())?.into_inner();
        let peek_edge = session.store
                               .upsert_edge(&peek_key, "peek", spec_node.id, peek_node.id, Tags::new())?
                               .into_inner();
        let trial_edge = session.store
                                .upsert_edge(&trial_key, "trials", peek_node.id, trial_node.id, Tags::new())?
                                .into_inner();
        let previous_peek: Vec<StoreId> = session.store.latest_version(&peek_key)?.into_iter().collect();
        let peek_version = session.store.create_node_version(peek_node.id, Tags::new(), &previous_peek)?;
        let trial = session.store
                           .create_node_version(trial_node.id, tags([Tag::int(TAG_TRIAL_NUMBER, 0)]), &[])?;
        session.store.create_edge_version(peek_edge.id, spec.version_id, peek_version.id)?;
        session.store.create_edge_version(trial_edge.id, peek_version.id, trial.id)?;

        for start in &starts {
            if let StartRecord::Artifact(a) = start {
                session.lineage(LineageKey::TrialArtifact { experiment,
                                                            hash: &a.checksum },
                                a.version_id,
                                trial.id)?;
            }
        }

        let mut outputs = Vec::new();
        for output in resources(graph, &discovered_outputs(graph, location)) {
            if output.is_pending() || !output.is_artifact() {
                warn!("output {} of {location} has no location yet; skipped", output.name);
                continue;
            }
            let record = session.register_output(output)?;
            session.lineage(LineageKey::TrialOutput { experiment,
                                                      hash: &record.checksum },
                            trial.id,
                            record.version_id)?;
            outputs.push(record);
        }

        let mut linked = Vec::new();
        let mut unmatched = Vec::new();
        for (file, value) in ghosts {
            let text = stringify(&value);
            match bindings_of(&starts).find(|b| b.value == text) {
                Some(binding) => {
                    session.lineage(LineageKey::TrialGhost { experiment,
                                                             literal: &binding.literal,
                                                             hash: &binding.hash },
                                    trial.id,
                                    binding.version_id)?;
                    linked.push(GhostLink { file,
                                            literal: binding.literal.clone(),
                                            value: text,
                                            binding_version: binding.version_id });
                }
                None => {
                    warn!("ghost capture {} ({text}) matches no binding", file.display());
                    unmatched.push(file);
                }
            }
        }

        info!("peek {} seq={} actions={} outputs={} ghosts={}/{}",
              spec.tags.commit_hash,
              spec.tags.sequence_number,
              actions.len(),
              outputs.len(),
              linked.len(),
              linked.len() + unmatched.len());
        Ok(PeekReport { spec,
                        starts,
                        dummy_version: dummy.id,
                        actions,
                        trial_version: trial.id,
                        outputs,
                        ghosts: linked,
                        unmatched_ghosts: unmatched })
    }
}

/// Recursos resueltos entre `ids`; los placeholders se omiten.
fn resources<'g>(graph: &'g ExperimentGraph, ids: &[NodeId]) -> Vec<&'g Resource> {
    ids.iter()
       .filter_map(|id| graph.resource(*id))
       .filter(|r| {
           if r.is_pending() {
               warn!("{} is still a placeholder; skipped", r.name);
               return false;
           }
           true
       })
       .collect()
}

fn role_and_ident(resource: &Resource) -> (ResourceRole, &str) {
    match resource.location() {
        Some(loc) => (ResourceRole::Artifact, loc),
        None => (ResourceRole::Literal, resource.name.as_str()),
    }
}

/// Salidas de la acción que produjo el artifact no-start en `location`.
fn discovered_outputs(graph: &ExperimentGraph, location: &str) -> Vec<NodeId> {
    graph.by_location(location)
         .filter(|id| !graph.is_start(*id))
         .and_then(|id| graph.resource(id))
         .and_then(|r| r.parent)
         .and_then(|p| graph.node(p))
         .and_then(|n| n.as_action())
         .map(|a| a.out_artifacts.clone())
         .unwrap_or_default()
}

/// Lee `ghost_literal_0.json`, `ghost_literal_1.json`, ... hasta el primer
/// hueco de la secuencia.
fn read_ghosts(run_dir: &Path) -> Result<Vec<(PathBuf, Value)>, ProvenanceError> {
    let mut out = Vec::new();
    for n in 0.. {
        let path = run_dir.join(format!("{GHOST_PREFIX}{n}.{GHOST_EXTENSION}"));
        if !path.is_file() {
            break;
        }
        let bytes = fs::read(&path).map_err(|e| ProvenanceError::Malformed { path: path.clone(),
                                                                              reason: e.to_string() })?;
        let value = serde_json::from_slice(&bytes).map_err(|e| ProvenanceError::Malformed { path: path.clone(),
                                                                                             reason: e.to_string() })?;
        out.push((path, value));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExperimentConfig;
    use crate::model::Action;
    use crate::store::InMemoryGraphStore;
    use crate::vcs::InMemoryVersionControl;

    #[test]
    fn outputs_come_from_the_producing_action() {
        let mut g = ExperimentGraph::new();
        let data = g.register_node(Resource::artifact("data", "data.csv")).unwrap();
        let fit = g.register_node(Action::new("fit", [data])).unwrap();
        let model = g.register_node(Resource::artifact("model", "model.bin").with_parent(fit)).unwrap();
        let metrics = g.register_node(Resource::artifact("metrics", "metrics.json").with_parent(fit)).unwrap();
        g.register_edge(data, fit).unwrap();
        g.register_edge(fit, model).unwrap();
        g.register_edge(fit, metrics).unwrap();
        assert_eq!(discovered_outputs(&g, "model.bin"), vec![model, metrics]);
        assert!(discovered_outputs(&g, "data.csv").is_empty());
        assert!(discovered_outputs(&g, "nowhere").is_empty());
    }

    #[test]
    fn malformed_ghost_aborts_before_any_write() {
        let run = tempfile::tempdir().unwrap();
        fs::write(run.path().join("ghost_literal_0.json"), b"{broken").unwrap();
        let mut g = ExperimentGraph::new();
        g.register_node(Resource::literal("lr", 0.1)).unwrap();
        let cfg = ExperimentConfig::new("unit", "/virtual").with_run_dir(run.path());
        let mut rec = ProvenanceRecorder::new(cfg, InMemoryGraphStore::new(), InMemoryVersionControl::new(), g);
        rec.checkpoint("init").unwrap();
        let err = rec.peek("nowhere").unwrap_err();
        assert!(matches!(err, ProvenanceError::Malformed { .. }));
        assert_eq!(rec.store().node_count(), 0);
    }

    #[test]
    fn action_start_aborts_before_any_write() {
        let run = tempfile::tempdir().unwrap();
        let mut g = ExperimentGraph::new();
        g.register_node(Resource::literal("lr", 0.1)).unwrap();
        g.light_node(Action::new("evaluate", [])).unwrap();
        let cfg = ExperimentConfig::new("unit", "/virtual").with_run_dir(run.path());
        let mut rec = ProvenanceRecorder::new(cfg, InMemoryGraphStore::new(), InMemoryVersionControl::new(), g);
        rec.checkpoint("init").unwrap();
        let err = rec.peek("nowhere").unwrap_err();
        assert!(matches!(err, ProvenanceError::TypeMismatch { ref key, .. } if key == "evaluate"));
        assert_eq!(rec.store().node_count(), 0);
        assert_eq!(rec.store().node_version_count(), 0);
    }
}
