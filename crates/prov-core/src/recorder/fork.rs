use std::path::Path;

use chrono::Utc;
use log::info;

use super::session::check_starts;
use super::{ExecutionPhase, ForkReport, ProvenanceRecorder, SpecTags, SpecVersionRecord};
use crate::constants::{SNAPSHOT_FILE, TAG_COMMIT_HASH};
use crate::errors::ProvenanceError;
use crate::graph::ExperimentGraph;
use crate::keys::LineageKey;
use crate::store::{NodeVersion, VersionedGraphStore};
use crate::vcs::{CheckedOutRef, VersionControl};

impl<S, V> ProvenanceRecorder<S, V>
    where S: VersionedGraphStore,
          V: VersionControl
{
    /// Abre una línea nueva en fase `Pre` desde el commit `commit_hash`.
    ///
    /// Sólo es legal si la versión de spec más reciente con ese commit está en
    /// `Pre`. El grafo se restaura desde el control de versiones antes de
    /// escribir nada en el store; si falla cualquier precondición el store
    /// queda intacto.
    pub fn fork(&mut self, commit_hash: &str) -> Result<ForkReport, ProvenanceError> {
        let key = self.spec_key();
        let spec_node = self.store.get_node(&key)?.ok_or_else(|| {
                                                      ProvenanceError::NotFound(format!("cannot fork to node that does \
                                                                                         not exist: {key}"))
                                                  })?;

        let mut matched: Option<(NodeVersion, SpecTags)> = None;
        for id in self.store.get_node_history(&key)?.into_values().rev() {
            let version = self.store.get_node_version(id)?;
            if version.tag(TAG_COMMIT_HASH) == Some(commit_hash) {
                let tags = SpecTags::from_version(&version)?;
                matched = Some((version, tags));
                break;
            }
        }
        let (matched, matched_tags) = matched.ok_or_else(|| {
                                                 ProvenanceError::NotFound(format!("cannot fork to node that does \
                                                                                    not exist: {commit_hash}"))
                                             })?;
        if matched_tags.phase == ExecutionPhase::Post {
            return Err(ProvenanceError::InvariantViolation("cannot fork from a Post-execution state".into()));
        }

        let mut previous_latest: Option<(NodeVersion, SpecTags)> = None;
        for id in self.store.get_latest_node_versions(&key)? {
            let version = self.store.get_node_version(id)?;
            let tags = SpecTags::from_version(&version)?;
            if previous_latest.as_ref().map_or(true, |(_, best)| tags.timestamp > best.timestamp) {
                previous_latest = Some((version, tags));
            }
        }

        let restored = self.restore_graph(commit_hash)?;
        check_starts(&restored)?;

        let tags = SpecTags { timestamp: Utc::now(),
                              commit_hash: commit_hash.to_string(),
                              sequence_number: matched_tags.sequence_number + 1,
                              phase: ExecutionPhase::Pre };
        let version = self.store.create_node_version(spec_node.id, tags.to_tags(), &[matched.id])?;
        let experiment = self.config.experiment_name.as_str();
        let run_dir = self.config.run_dir();
        let mut session = Self::session(&mut self.store, experiment, &run_dir);
        if let Some((prev, _)) = &previous_latest {
            session.lineage(LineageKey::ForkOrigin { experiment }, prev.id, matched.id)?;
        }

        self.graph = restored;
        let starts = session.register_starts(&self.graph, &spec_node, version.id)?;
        info!("fork {commit_hash} seq={} from #{} starts={}",
              tags.sequence_number,
              matched.id,
              starts.len());
        Ok(ForkReport { spec: SpecVersionRecord { version_id: version.id,
                                                  parent: Some(matched.id),
                                                  tags },
                        forked_from: matched.id,
                        previous_latest: previous_latest.map(|(v, _)| v.id),
                        starts })
    }

    /// Grafo serializado en `commit_hash`; el checkout se revierte al salir.
    fn restore_graph(&mut self, commit_hash: &str) -> Result<ExperimentGraph, ProvenanceError> {
        let dir = self.config.experiment_dir();
        let guard = CheckedOutRef::new(&mut self.vcs, &dir, commit_hash)?;
        let bytes = guard.read_file(Path::new(SNAPSHOT_FILE))?;
        guard.restore()?;
        ExperimentGraph::deserialize(&bytes).map_err(|e| ProvenanceError::Malformed { path: dir.join(SNAPSHOT_FILE),
                                                                                       reason: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExperimentConfig;
    use crate::errors::ErrorClass;
    use crate::model::Resource;
    use crate::store::InMemoryGraphStore;
    use crate::vcs::{InMemoryVersionControl, VcsError};

    fn recorder() -> ProvenanceRecorder<InMemoryGraphStore, InMemoryVersionControl> {
        let mut g = ExperimentGraph::new();
        g.register_node(Resource::literal_each("alpha", [0.0, 0.5])).unwrap();
        let cfg = ExperimentConfig::new("unit", "/virtual");
        ProvenanceRecorder::new(cfg, InMemoryGraphStore::new(), InMemoryVersionControl::new(), g)
    }

    #[test]
    fn fork_without_history_is_not_found() {
        let mut rec = recorder();
        let err = rec.fork("abc").unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);
        assert_eq!(rec.store().node_count(), 0);
    }

    #[test]
    fn fork_from_post_is_rejected_without_writes() {
        let mut rec = recorder();
        let hash = rec.checkpoint("run").unwrap();
        rec.commit(ExecutionPhase::Post).unwrap();
        let versions = rec.store().node_version_count();
        let err = rec.fork(&hash).unwrap_err();
        assert_eq!(err.class(), ErrorClass::InvariantViolation);
        assert!(err.to_string().contains("Post-execution"));
        assert_eq!(rec.store().node_version_count(), versions);
    }

    #[test]
    fn fork_from_pre_bumps_sequence() {
        let mut rec = recorder();
        let hash = rec.checkpoint("run").unwrap();
        let pre = rec.commit(ExecutionPhase::Pre).unwrap();
        let report = rec.fork(&hash).unwrap();
        assert_eq!(report.spec.tags.sequence_number, pre.spec.tags.sequence_number + 1);
        assert_eq!(report.spec.tags.phase, ExecutionPhase::Pre);
        assert_eq!(report.forked_from, pre.spec.version_id);
        assert_eq!(report.previous_latest, Some(pre.spec.version_id));
        assert_eq!(report.starts.len(), 1);
    }

    /// Deja extraer el commit histórico pero no volver a la rama.
    struct NoWayBack {
        inner: InMemoryVersionControl,
        checkouts: usize,
    }

    impl VersionControl for NoWayBack {
        fn current_commit(&self, dir: &Path) -> Result<String, VcsError> {
            self.inner.current_commit(dir)
        }
        fn current_ref(&self, dir: &Path) -> Result<String, VcsError> {
            self.inner.current_ref(dir)
        }
        fn checkout(&mut self, dir: &Path, reference: &str) -> Result<(), VcsError> {
            self.checkouts += 1;
            if self.checkouts > 1 {
                return Err(VcsError::Command { command: format!("git checkout {reference}"),
                                               stderr: "local changes would be overwritten".into() });
            }
            self.inner.checkout(dir, reference)
        }
        fn read_file(&self, dir: &Path, rel: &Path) -> Result<Vec<u8>, VcsError> {
            self.inner.read_file(dir, rel)
        }
        fn write_file(&mut self, dir: &Path, rel: &Path, bytes: &[u8]) -> Result<(), VcsError> {
            self.inner.write_file(dir, rel, bytes)
        }
        fn commit_all(&mut self, dir: &Path, message: &str) -> Result<String, VcsError> {
            self.inner.commit_all(dir, message)
        }
    }

    #[test]
    fn failed_return_checkout_aborts_fork() {
        let mut g = ExperimentGraph::new();
        g.register_node(Resource::literal("alpha", 0.5)).unwrap();
        let vcs = NoWayBack { inner: InMemoryVersionControl::new(),
                              checkouts: 0 };
        let cfg = ExperimentConfig::new("unit", "/virtual");
        let mut rec = ProvenanceRecorder::new(cfg, InMemoryGraphStore::new(), vcs, g);
        let hash = rec.checkpoint("run").unwrap();
        rec.commit(ExecutionPhase::Pre).unwrap();
        let versions = rec.store().node_version_count();

        let err = rec.fork(&hash).unwrap_err();
        assert!(matches!(err, ProvenanceError::Vcs(VcsError::Command { .. })), "{err:?}");
        assert_eq!(rec.store().node_version_count(), versions);
        assert_eq!(rec.history().unwrap().len(), 1);
    }

    #[test]
    fn fork_returns_to_the_branch() {
        let mut rec = recorder();
        let first = rec.checkpoint("first").unwrap();
        rec.commit(ExecutionPhase::Pre).unwrap();
        let tip = rec.checkpoint("second").unwrap();
        rec.fork(&first).unwrap();
        let dir = rec.config().experiment_dir();
        assert_eq!(rec.vcs().current_commit(&dir).unwrap(), tip);
    }
}
