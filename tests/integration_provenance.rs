use provflow::core::model::Resource;
use provflow::{ExecutionPhase, ExperimentConfig, ExperimentGraph, InMemoryGraphStore, InMemoryVersionControl,
               ProvenanceRecorder};

fn grid(values: [f64; 2]) -> ExperimentGraph {
    let mut g = ExperimentGraph::new();
    g.register_node(Resource::literal_each("alpha", values)).expect("alpha");
    g
}

/// Un store guardado en disco continúa la cadena de specs y reutiliza los
/// bindings al reabrirse en otra sesión.
#[test]
fn saved_store_continues_the_spec_chain() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store_file = tmp.path().join("store.json");
    let cfg = ExperimentConfig::new("persisted", tmp.path().join("versions"));
    let mut vcs = InMemoryVersionControl::new();

    let first = {
        let store = InMemoryGraphStore::load_from(&store_file).expect("empty store");
        let mut rec = ProvenanceRecorder::new(cfg.clone(), store, vcs, grid([0.0, 0.5]));
        rec.checkpoint("first grid").expect("checkpoint");
        let report = rec.commit(ExecutionPhase::Pre).expect("first commit");
        rec.store().save_to(&store_file).expect("save");
        let (_, back, _) = rec.into_parts();
        vcs = back;
        report
    };

    let store = InMemoryGraphStore::load_from(&store_file).expect("reload");
    let mut rec = ProvenanceRecorder::new(cfg, store, vcs, grid([0.0, 0.9]));
    rec.checkpoint("second grid").expect("checkpoint");
    let second = rec.commit(ExecutionPhase::Post).expect("second commit");

    assert_eq!(second.spec.tags.sequence_number, first.spec.tags.sequence_number + 1);
    assert_eq!(second.spec.parent, Some(first.spec.version_id));
    let zero_first = first.bindings().find(|b| b.value == "0.0").expect("0.0 in first");
    let zero_second = second.bindings().find(|b| b.value == "0.0").expect("0.0 in second");
    assert_eq!(zero_first.version_id, zero_second.version_id);
    assert!(!zero_second.created);

    let values: Vec<String> = rec.bindings_for("alpha").expect("bindings").into_iter().map(|b| b.value).collect();
    assert_eq!(values.len(), 3);
    assert!(values.contains(&"0.9".to_string()));
}
