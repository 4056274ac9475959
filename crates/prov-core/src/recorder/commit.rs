use log::info;

use super::session::check_starts;
use super::{CommitReport, ExecutionPhase, ProvenanceRecorder};
use crate::errors::ProvenanceError;
use crate::store::VersionedGraphStore;
use crate::vcs::VersionControl;

impl<S, V> ProvenanceRecorder<S, V>
    where S: VersionedGraphStore,
          V: VersionControl
{
    /// Agrega una versión de spec con el commit actual del directorio
    /// versionado y registra cada start del grafo.
    ///
    /// Falla con `TypeMismatch` si algún start es una acción y con
    /// `Unresolved` si un start sigue siendo un placeholder; en ambos casos
    /// sin escribir nada en el store. Un commit ya ejecutado (`Post`) no
    /// vuelve a `Pre`: `InvariantViolation`.
    pub fn commit(&mut self, phase: ExecutionPhase) -> Result<CommitReport, ProvenanceError> {
        check_starts(&self.graph)?;
        let (spec_node, spec) = self.append_spec_version(phase)?;
        let run_dir = self.config.run_dir();
        let mut session = Self::session(&mut self.store, &self.config.experiment_name, &run_dir);
        let starts = session.register_starts(&self.graph, &spec_node, spec.version_id)?;
        info!("commit {} seq={} phase={} starts={}",
              spec.tags.commit_hash,
              spec.tags.sequence_number,
              phase,
              starts.len());
        Ok(CommitReport { spec, starts })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use serde_json::json;

    use super::*;
    use crate::config::ExperimentConfig;
    use crate::constants::{TAG_CHECKSUM, TAG_LOCATION};
    use crate::graph::ExperimentGraph;
    use crate::model::{Action, Resource};
    use crate::recorder::{ArtifactRecord, StartRecord};
    use crate::store::{InMemoryGraphStore, VersionedGraphStore};
    use crate::vcs::InMemoryVersionControl;

    fn recorder(graph: ExperimentGraph) -> ProvenanceRecorder<InMemoryGraphStore, InMemoryVersionControl> {
        let cfg = ExperimentConfig::new("unit", "/virtual").with_run_dir("/virtual/run");
        let mut rec = ProvenanceRecorder::new(cfg, InMemoryGraphStore::new(), InMemoryVersionControl::new(), graph);
        rec.checkpoint("init").unwrap();
        rec
    }

    #[test]
    fn first_commit_starts_the_chain() {
        let mut g = ExperimentGraph::new();
        g.register_node(Resource::literal("lr", 0.1)).unwrap();
        let mut rec = recorder(g);
        let first = rec.commit(ExecutionPhase::Pre).unwrap();
        assert_eq!(first.spec.tags.sequence_number, 0);
        assert_eq!(first.spec.parent, None);
        let second = rec.commit(ExecutionPhase::Post).unwrap();
        assert_eq!(second.spec.tags.sequence_number, 1);
        assert_eq!(second.spec.parent, Some(first.spec.version_id));
        assert_eq!(rec.history().unwrap().len(), 2);
    }

    #[test]
    fn action_in_starts_is_a_type_mismatch() {
        let mut g = ExperimentGraph::new();
        g.light_node(Action::new("train", [])).unwrap();
        let mut rec = recorder(g);
        let before = rec.store().node_version_count();
        let err = rec.commit(ExecutionPhase::Pre).unwrap_err();
        assert!(matches!(err, ProvenanceError::TypeMismatch { ref key, .. } if key == "train"));
        assert_eq!(rec.store().node_version_count(), before);
        assert!(rec.history().unwrap().is_empty());
    }

    #[test]
    fn pending_start_is_unresolved() {
        let mut g = ExperimentGraph::new();
        g.register_node(Resource::pending_literal("seed")).unwrap();
        let mut rec = recorder(g);
        let before = rec.store().node_version_count();
        assert!(matches!(rec.commit(ExecutionPhase::Pre), Err(ProvenanceError::Unresolved(_))));
        assert_eq!(rec.store().node_version_count(), before);
    }

    #[test]
    fn failed_start_check_does_not_move_the_head() {
        let mut g = ExperimentGraph::new();
        g.register_node(Resource::literal("lr", 0.1)).unwrap();
        let mut rec = recorder(g);
        let first = rec.commit(ExecutionPhase::Pre).unwrap();
        rec.graph_mut().light_node(Action::new("train", [])).unwrap();
        let before = rec.store().node_version_count();
        assert!(rec.commit(ExecutionPhase::Pre).is_err());
        assert_eq!(rec.store().node_version_count(), before);
        let history = rec.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version_id, first.spec.version_id);
    }

    #[test]
    fn executed_commit_cannot_go_back_to_pre() {
        let mut g = ExperimentGraph::new();
        g.register_node(Resource::literal("lr", 0.1)).unwrap();
        let mut rec = recorder(g);
        rec.commit(ExecutionPhase::Pre).unwrap();
        rec.commit(ExecutionPhase::Post).unwrap();
        let before = rec.store().node_version_count();
        let err = rec.commit(ExecutionPhase::Pre).unwrap_err();
        assert!(matches!(err, ProvenanceError::InvariantViolation(_)));
        assert_eq!(rec.store().node_version_count(), before);
        // otro Post sobre el mismo commit sigue permitido
        rec.commit(ExecutionPhase::Post).unwrap();
        // y un checkpoint nuevo vuelve a empezar en Pre
        rec.checkpoint("next").unwrap();
        rec.commit(ExecutionPhase::Pre).unwrap();
        assert_eq!(rec.history().unwrap().len(), 4);
    }

    fn artifacts(report: &CommitReport) -> Vec<&ArtifactRecord> {
        report.starts
              .iter()
              .filter_map(|s| match s {
                  StartRecord::Artifact(a) => Some(a),
                  StartRecord::Literal(_) => None,
              })
              .collect()
    }

    #[test]
    fn artifacts_are_identified_by_location() {
        let run = tempfile::tempdir().unwrap();
        fs::write(run.path().join("train.csv"), "same").unwrap();
        fs::write(run.path().join("test.csv"), "same").unwrap();
        let mut g = ExperimentGraph::new();
        g.register_node(Resource::artifact("train", "train.csv")).unwrap();
        g.register_node(Resource::artifact("test", "test.csv")).unwrap();
        let cfg = ExperimentConfig::new("unit", "/virtual").with_run_dir(run.path());
        let mut rec = ProvenanceRecorder::new(cfg, InMemoryGraphStore::new(), InMemoryVersionControl::new(), g);
        rec.checkpoint("init").unwrap();

        let first = rec.commit(ExecutionPhase::Pre).unwrap();
        let arts = artifacts(&first);
        assert_eq!(arts.len(), 2);
        assert_eq!(arts[0].checksum, arts[1].checksum);
        assert_ne!(arts[0].node_id, arts[1].node_id);
        for a in &arts {
            let version = rec.store().get_node_version(a.version_id).unwrap();
            assert_eq!(version.tag(TAG_LOCATION), Some(a.location.as_str()));
        }
        let train = arts.iter().find(|a| a.location == "train.csv").unwrap();
        let (train_node, train_version) = (train.node_id, train.version_id);

        // mismo contenido: misma versión
        let again = rec.commit(ExecutionPhase::Pre).unwrap();
        let train_again = artifacts(&again).into_iter().find(|a| a.location == "train.csv").unwrap();
        assert_eq!(train_again.version_id, train_version);

        // contenido nuevo: mismo nodo, versión nueva sobre la anterior
        fs::write(run.path().join("train.csv"), "changed").unwrap();
        let edited = rec.commit(ExecutionPhase::Pre).unwrap();
        let train_edited = artifacts(&edited).into_iter().find(|a| a.location == "train.csv").unwrap();
        assert_eq!(train_edited.node_id, train_node);
        assert_ne!(train_edited.version_id, train_version);
        let version = rec.store().get_node_version(train_edited.version_id).unwrap();
        assert_eq!(version.parent_ids, vec![train_version]);
        assert_eq!(version.tag(TAG_CHECKSUM), Some(train_edited.checksum.as_str()));
    }

    #[test]
    fn literal_values_become_bindings() {
        let mut g = ExperimentGraph::new();
        g.register_node(Resource::literal("opt", json!({"name": "adam", "beta": 0.9}))).unwrap();
        let mut rec = recorder(g);
        let report = rec.commit(ExecutionPhase::Pre).unwrap();
        let bindings: Vec<_> = report.bindings().collect();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].value, r#"{"beta":0.9,"name":"adam"}"#);
        let listed = rec.bindings_for("opt").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].version_id, bindings[0].version_id);
        assert!(rec.vcs().read_file(Path::new("/virtual/unit"), Path::new("0/experiment_graph.json")).is_ok());
    }
}
