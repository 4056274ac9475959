//! Tipos de resultado del grabador: tags de versión de spec y reportes de
//! `commit`, `peek` y `fork`.
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::constants::{TAG_COMMIT_HASH, TAG_EXECUTION_PHASE, TAG_SEQUENCE_NUMBER, TAG_TIMESTAMP};
use crate::errors::ProvenanceError;
use crate::store::{tags, NodeVersion, StoreId, Tag, Tags};

/// Fase de ejecución de una versión de spec. Sólo avanza `Pre -> Post`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionPhase {
    Pre,
    Post,
}

impl ExecutionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPhase::Pre => "Pre",
            ExecutionPhase::Post => "Post",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pre" => Some(ExecutionPhase::Pre),
            "Post" => Some(ExecutionPhase::Post),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tags de una versión de spec, ya tipados.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecTags {
    pub timestamp: DateTime<Utc>,
    pub commit_hash: String,
    pub sequence_number: u64,
    pub phase: ExecutionPhase,
}

impl SpecTags {
    pub fn to_tags(&self) -> Tags {
        tags([Tag::string(TAG_TIMESTAMP, self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)),
              Tag::string(TAG_COMMIT_HASH, self.commit_hash.clone()),
              Tag::int(TAG_SEQUENCE_NUMBER, self.sequence_number as i64),
              Tag::string(TAG_EXECUTION_PHASE, self.phase.as_str())])
    }

    pub fn from_version(version: &NodeVersion) -> Result<Self, ProvenanceError> {
        let get = |key: &str| {
            version.tag(key).ok_or_else(|| {
                                ProvenanceError::InvariantViolation(format!("spec version #{} has no {key} tag",
                                                                            version.id))
                            })
        };
        let bad = |key: &str, raw: &str| {
            ProvenanceError::InvariantViolation(format!("spec version #{}: invalid {key} {raw:?}", version.id))
        };
        let raw_ts = get(TAG_TIMESTAMP)?;
        let timestamp = DateTime::parse_from_rfc3339(raw_ts).map_err(|_| bad(TAG_TIMESTAMP, raw_ts))?
                                                           .with_timezone(&Utc);
        let raw_seq = get(TAG_SEQUENCE_NUMBER)?;
        let sequence_number = raw_seq.parse().map_err(|_| bad(TAG_SEQUENCE_NUMBER, raw_seq))?;
        let raw_phase = get(TAG_EXECUTION_PHASE)?;
        let phase = ExecutionPhase::parse(raw_phase).ok_or_else(|| bad(TAG_EXECUTION_PHASE, raw_phase))?;
        Ok(Self { timestamp,
                  commit_hash: get(TAG_COMMIT_HASH)?.to_string(),
                  sequence_number,
                  phase })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecVersionRecord {
    pub version_id: StoreId,
    pub parent: Option<StoreId>,
    pub tags: SpecTags,
}

/// Un valor concreto de un literal, con su versión singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingRecord {
    pub literal: String,
    pub value: String,
    pub hash: String,
    pub source_key: String,
    pub version_id: StoreId,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiteralRecord {
    pub name: String,
    pub source_key: String,
    pub node_id: StoreId,
    pub version_id: StoreId,
    pub bindings: Vec<BindingRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    pub name: String,
    pub location: String,
    pub checksum: String,
    pub source_key: String,
    pub node_id: StoreId,
    pub version_id: StoreId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StartRecord {
    Literal(LiteralRecord),
    Artifact(ArtifactRecord),
}

impl StartRecord {
    pub fn name(&self) -> &str {
        match self {
            StartRecord::Literal(l) => &l.name,
            StartRecord::Artifact(a) => &a.name,
        }
    }

    pub fn source_key(&self) -> &str {
        match self {
            StartRecord::Literal(l) => &l.source_key,
            StartRecord::Artifact(a) => &a.source_key,
        }
    }

    pub fn node_id(&self) -> StoreId {
        match self {
            StartRecord::Literal(l) => l.node_id,
            StartRecord::Artifact(a) => a.node_id,
        }
    }

    pub fn version_id(&self) -> StoreId {
        match self {
            StartRecord::Literal(l) => l.version_id,
            StartRecord::Artifact(a) => a.version_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub spec: SpecVersionRecord,
    pub starts: Vec<StartRecord>,
}

impl CommitReport {
    pub fn bindings(&self) -> impl Iterator<Item = &BindingRecord> {
        bindings_of(&self.starts)
    }

    /// `(nombre, checksum)` de los artifacts start, en orden.
    pub fn checksums(&self) -> Vec<(&str, &str)> {
        self.starts
            .iter()
            .filter_map(|s| match s {
                StartRecord::Artifact(a) => Some((a.name.as_str(), a.checksum.as_str())),
                StartRecord::Literal(_) => None,
            })
            .collect()
    }
}

pub(crate) fn bindings_of(starts: &[StartRecord]) -> impl Iterator<Item = &BindingRecord> {
    starts.iter()
          .filter_map(|s| match s {
              StartRecord::Literal(l) => Some(l),
              StartRecord::Artifact(_) => None,
          })
          .flat_map(|l| l.bindings.iter())
}

/// Invocación de una acción registrada por `peek`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRecord {
    pub function: String,
    pub invocation_version: StoreId,
    pub inputs: usize,
    pub outputs: usize,
}

/// Captura intermedia enlazada a un binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GhostLink {
    pub file: PathBuf,
    pub literal: String,
    pub value: String,
    pub binding_version: StoreId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeekReport {
    pub spec: SpecVersionRecord,
    pub starts: Vec<StartRecord>,
    pub dummy_version: StoreId,
    pub actions: Vec<ActionRecord>,
    pub trial_version: StoreId,
    pub outputs: Vec<ArtifactRecord>,
    pub ghosts: Vec<GhostLink>,
    /// Capturas cuyo valor no coincide con ningún binding.
    pub unmatched_ghosts: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForkReport {
    pub spec: SpecVersionRecord,
    pub forked_from: StoreId,
    pub previous_latest: Option<StoreId>,
    pub starts: Vec<StartRecord>,
}

/// Valor histórico de un literal (ver `ProvenanceRecorder::bindings_for`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingSummary {
    pub value: String,
    pub hash: String,
    pub version_id: StoreId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn spec_tags_survive_the_tag_map() {
        let tags = SpecTags { timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
                              commit_hash: "abc123".into(),
                              sequence_number: 4,
                              phase: ExecutionPhase::Post };
        let version = NodeVersion { id: 9,
                                    node_id: 1,
                                    tags: tags.to_tags(),
                                    parent_ids: vec![],
                                    created_at: Utc::now() };
        assert_eq!(version.tag(TAG_SEQUENCE_NUMBER), Some("4"));
        assert_eq!(version.tag(TAG_EXECUTION_PHASE), Some("Post"));
        assert_eq!(SpecTags::from_version(&version).unwrap(), tags);
    }

    #[test]
    fn missing_tags_are_invariant_violations() {
        let version = NodeVersion { id: 3,
                                    node_id: 1,
                                    tags: Tags::new(),
                                    parent_ids: vec![],
                                    created_at: Utc::now() };
        let err = SpecTags::from_version(&version).unwrap_err();
        assert!(matches!(err, ProvenanceError::InvariantViolation(_)));
    }
}
