
use prov_core::model::Resource;
use prov_core::{ExecutionPhase, ExperimentConfig, ExperimentGraph, InMemoryVersionControl, ProvenanceRecorder};
use test_support::{pg_store, unique_experiment};

#[test]
fn commit_and_fork_over_postgres() {
    let Some(store) = pg_store() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let mut graph = ExperimentGraph::new();
    graph.register_node(Resource::literal_each("alpha", [0.0, 0.5])).expect("alpha");
    let cfg = ExperimentConfig::new(unique_experiment("pgrec"), "/virtual");
    let mut rec = ProvenanceRecorder::new(cfg, store, InMemoryVersionControl::new(), graph);

    let c1 = rec.checkpoint("first").expect("checkpoint");
    let pre = rec.commit(ExecutionPhase::Pre).expect("pre");
    assert_eq!(pre.spec.tags.sequence_number, 0);
    assert_eq!(pre.bindings().count(), 2);

    let again = rec.commit(ExecutionPhase::Pre).expect("recommit");
    let ids = |r: &prov_core::CommitReport| r.bindings().map(|b| b.version_id).collect::<Vec<_>>();
    assert_eq!(ids(&pre), ids(&again));

    let fork = rec.fork(&c1).expect("fork");
    assert_eq!(fork.spec.tags.sequence_number, again.spec.tags.sequence_number + 1);
    assert_eq!(fork.previous_latest, Some(again.spec.version_id));
    assert_eq!(rec.history().expect("history").len(), 3);
}
