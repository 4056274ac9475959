use prov_core::model::{Action, Resource};
use prov_core::{ExperimentGraph, GraphError, NodeId};
use proptest::prelude::*;

/// Construye un grafo con `kinds[i] == true` => acción y aplica las aristas
/// en orden, ignorando las que el grafo rechaza.
fn build(kinds: &[bool], edges: &[(usize, usize)]) -> (ExperimentGraph, Vec<NodeId>) {
    let mut g = ExperimentGraph::new();
    let ids: Vec<NodeId> = kinds.iter()
                                .enumerate()
                                .map(|(i, is_action)| {
                                    if *is_action {
                                        g.register_node(Action::new(format!("f{i}"), [])).unwrap()
                                    } else {
                                        g.register_node(Resource::artifact(format!("r{i}"), format!("loc{i}")))
                                         .unwrap()
                                    }
                                })
                                .collect();
    for (u, v) in edges {
        if *u < ids.len() && *v < ids.len() {
            match g.register_edge(ids[*u], ids[*v]) {
                Ok(()) | Err(GraphError::SelfLoop(_)) | Err(GraphError::Cycle { .. }) => {}
                Err(other) => panic!("unexpected error {other}"),
            }
        }
    }
    (g, ids)
}

proptest! {
    #[test]
    fn starts_are_exactly_resources_without_predecessors(
        kinds in proptest::collection::vec(any::<bool>(), 1..16),
        edges in proptest::collection::vec((0..16usize, 0..16usize), 0..40)
    ) {
        let (g, ids) = build(&kinds, &edges);
        for id in ids {
            let no_preds = g.predecessors(id).map_or(true, |p| p.is_empty());
            let is_resource = !g.node(id).unwrap().is_action();
            prop_assert_eq!(g.is_start(id), no_preds && is_resource);
        }
    }

    #[test]
    fn depth_is_longest_path_and_buckets_match(
        kinds in proptest::collection::vec(any::<bool>(), 1..16),
        edges in proptest::collection::vec((0..16usize, 0..16usize), 0..40)
    ) {
        let (g, ids) = build(&kinds, &edges);
        for &(u, v) in g.edges() {
            prop_assert!(g.node(v).unwrap().max_depth() >= g.node(u).unwrap().max_depth() + 1);
        }
        for id in ids {
            let node = g.node(id).unwrap();
            let expected = g.predecessors(id)
                            .into_iter()
                            .flatten()
                            .map(|p| g.node(*p).unwrap().max_depth() + 1)
                            .max()
                            .unwrap_or(0);
            prop_assert_eq!(node.max_depth(), expected);
            let in_bucket = g.actions_at_depth()
                             .get(&node.max_depth())
                             .map_or(false, |b| b.contains(&id));
            prop_assert_eq!(in_bucket, node.is_action());
            let buckets_holding = g.actions_at_depth().values().filter(|b| b.contains(&id)).count();
            prop_assert!(buckets_holding <= 1);
        }
    }

    #[test]
    fn snapshot_preserves_structure(
        kinds in proptest::collection::vec(any::<bool>(), 1..12),
        edges in proptest::collection::vec((0..12usize, 0..12usize), 0..30)
    ) {
        let (g, _) = build(&kinds, &edges);
        let back = ExperimentGraph::deserialize(&g.serialize().unwrap()).unwrap();
        prop_assert_eq!(back.starts_signature(), g.starts_signature());
        prop_assert_eq!(back.edges(), g.edges());
        prop_assert_eq!(back.actions_at_depth(), g.actions_at_depth());
    }
}

#[test]
fn accepted_edges_never_close_a_cycle() {
    let (mut g, ids) = build(&[false, true, false, true, false], &[(0, 1), (1, 2), (2, 3), (3, 4)]);
    assert_eq!(g.register_edge(ids[4], ids[0]),
               Err(GraphError::Cycle { from: ids[4], to: ids[0] }));
    assert_eq!(g.register_edge(ids[2], ids[2]), Err(GraphError::SelfLoop(ids[2])));
    assert_eq!(g.node(ids[4]).unwrap().max_depth(), 4);
}
