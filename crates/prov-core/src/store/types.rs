//! Registros del store versionado (append-only).
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type StoreId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TagType {
    String,
    Int,
    Float,
    Bool,
    Json,
}

/// Tag `{key, value, type}`; el valor siempre se guarda como texto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub tag_type: TagType,
}

impl Tag {
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(),
               value: value.into(),
               tag_type: TagType::String }
    }

    pub fn int(key: impl Into<String>, value: i64) -> Self {
        Self { key: key.into(),
               value: value.to_string(),
               tag_type: TagType::Int }
    }
}

pub type Tags = BTreeMap<String, Tag>;

/// Construye un mapa de tags indexado por `Tag::key`.
pub fn tags<I>(items: I) -> Tags
    where I: IntoIterator<Item = Tag>
{
    items.into_iter().map(|t| (t.key.clone(), t)).collect()
}

pub fn tag_value<'a>(tags: &'a Tags, key: &str) -> Option<&'a str> {
    tags.get(key).map(|t| t.value.as_str())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: StoreId,
    pub source_key: String,
    pub name: String,
    pub tags: Tags,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: StoreId,
    pub source_key: String,
    pub name: String,
    pub from_node: StoreId,
    pub to_node: StoreId,
    pub tags: Tags,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeVersion {
    pub id: StoreId,
    pub node_id: StoreId,
    pub tags: Tags,
    pub parent_ids: Vec<StoreId>,
    pub created_at: DateTime<Utc>,
}

impl NodeVersion {
    pub fn tag(&self, key: &str) -> Option<&str> {
        tag_value(&self.tags, key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeVersion {
    pub id: StoreId,
    pub edge_id: StoreId,
    pub from_version: StoreId,
    pub to_version: StoreId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub id: StoreId,
    pub source_key: String,
    pub name: String,
    pub tags: Tags,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageEdgeVersion {
    pub id: StoreId,
    pub lineage_edge_id: StoreId,
    pub from_version: StoreId,
    pub to_version: StoreId,
    pub created_at: DateTime<Utc>,
}
