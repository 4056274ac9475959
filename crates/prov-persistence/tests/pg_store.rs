
use prov_core::store::{tags, Tag, Tags};
use prov_core::{StoreError, VersionedGraphStore};
use test_support::{pg_store, unique_experiment};

#[test]
fn upsert_node_is_idempotent_per_key() {
    let Some(mut store) = pg_store() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let key = format!("{}.spec", unique_experiment("pgup"));
    let first = store.upsert_node(&key, "spec", Tags::new()).expect("first upsert");
    let second = store.upsert_node(&key, "spec", Tags::new()).expect("second upsert");
    assert!(first.was_created());
    assert!(!second.was_created());
    assert_eq!(first.get().id, second.get().id);
}

#[test]
fn duplicate_create_is_a_conflict() {
    let Some(mut store) = pg_store() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let key = format!("{}.dup", unique_experiment("pgdup"));
    store.create_node(&key, "dup", Tags::new()).expect("create");
    let err = store.create_node(&key, "dup", Tags::new()).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn head_tracks_newest_version_and_history_is_ordered() {
    let Some(mut store) = pg_store() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let key = format!("{}.spec", unique_experiment("pghead"));
    assert_eq!(store.latest_version(&key).expect("latest of missing"), None);
    let node = store.create_node(&key, "spec", Tags::new()).expect("node");
    let v1 = store.create_node_version(node.id, tags([Tag::int("sequenceNumber", 0)]), &[])
                  .expect("v1");
    let v2 = store.create_node_version(node.id, tags([Tag::int("sequenceNumber", 1)]), &[v1.id])
                  .expect("v2");
    assert_eq!(store.latest_version(&key).expect("latest"), Some(v2.id));
    let history: Vec<i64> = store.get_node_history(&key).expect("history").into_values().collect();
    assert_eq!(history, vec![v1.id, v2.id]);
    let back = store.get_node_version(v2.id).expect("read back");
    assert_eq!(back.parent_ids, vec![v1.id]);
    assert_eq!(back.tag("sequenceNumber"), Some("1"));
}

#[test]
fn edges_and_lineage_versions_are_listed() {
    let Some(mut store) = pg_store() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let xp = unique_experiment("pgedge");
    let a = store.create_node(&format!("{xp}.a"), "a", Tags::new()).expect("a");
    let b = store.create_node(&format!("{xp}.b"), "b", Tags::new()).expect("b");
    let va = store.create_node_version(a.id, Tags::new(), &[]).expect("va");
    let vb = store.create_node_version(b.id, Tags::new(), &[]).expect("vb");
    let edge = store.upsert_edge(&format!("{xp}.b"), "b", a.id, b.id, Tags::new())
                    .expect("edge")
                    .into_inner();
    store.create_edge_version(edge.id, va.id, vb.id).expect("edge version");
    assert_eq!(store.list_edges_from(a.id).expect("edges").len(), 1);
    let versions = store.list_edge_versions(edge.id).expect("edge versions");
    assert_eq!((versions[0].from_version, versions[0].to_version), (va.id, vb.id));

    let lineage = store.upsert_lineage_edge(&format!("{xp}.lineage"), "lineage", Tags::new())
                       .expect("lineage")
                       .into_inner();
    store.create_lineage_edge_version(lineage.id, vb.id, va.id).expect("lineage version");
    let lv = store.list_lineage_edge_versions(lineage.id).expect("lineage versions");
    assert_eq!(lv.len(), 1);
    assert_eq!(lv[0].lineage_edge_id, lineage.id);
}

#[test]
fn version_of_missing_node_is_not_found() {
    let Some(mut store) = pg_store() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let err = store.get_node_version(i64::MAX).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    let fk = store.create_node_version(i64::MAX, Tags::new(), &[]).unwrap_err();
    assert!(matches!(fk, StoreError::NotFound(_)));
}
