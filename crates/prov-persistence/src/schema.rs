//! Esquema Diesel escrito a mano; debe coincidir con `migrations/`.

diesel::table! {
    prov_nodes (id) {
        id -> BigInt,
        source_key -> Text,
        name -> Text,
        tags -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    prov_edges (id) {
        id -> BigInt,
        source_key -> Text,
        name -> Text,
        from_node -> BigInt,
        to_node -> BigInt,
        tags -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    prov_node_versions (id) {
        id -> BigInt,
        node_id -> BigInt,
        tags -> Jsonb,
        parent_ids -> Array<BigInt>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    prov_edge_versions (id) {
        id -> BigInt,
        edge_id -> BigInt,
        from_version -> BigInt,
        to_version -> BigInt,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    prov_lineage_edges (id) {
        id -> BigInt,
        source_key -> Text,
        name -> Text,
        tags -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    prov_lineage_edge_versions (id) {
        id -> BigInt,
        lineage_edge_id -> BigInt,
        from_version -> BigInt,
        to_version -> BigInt,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(prov_node_versions -> prov_nodes (node_id));
diesel::joinable!(prov_edge_versions -> prov_edges (edge_id));
diesel::joinable!(prov_lineage_edge_versions -> prov_lineage_edges (lineage_edge_id));

diesel::allow_tables_to_appear_in_same_query!(
    prov_nodes,
    prov_edges,
    prov_node_versions,
    prov_edge_versions,
    prov_lineage_edges,
    prov_lineage_edge_versions,
);
