//! Errores del core: grafo de experimento y protocolo de procedencia.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::model::NodeId;
use crate::store::StoreError;
use crate::vcs::VcsError;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum GraphError {
    #[error("node {0} already registered")] DuplicateNode(Uuid),
    #[error("unknown node {0}")] UnknownNode(NodeId),
    #[error("no resource registered as {name}#{instance}")] UnknownInstance { name: String, instance: Uuid },
    #[error("self loop on {0}")] SelfLoop(NodeId),
    #[error("edge {from} -> {to} would close a cycle")] Cycle { from: NodeId, to: NodeId },
    #[error("type mismatch for {key}: {reason}")] TypeMismatch { key: String, reason: String },
    #[error("{0} already resolved")] AlreadyResolved(String),
    #[error("snapshot: {0}")] Snapshot(String),
    #[error("io: {0}")] Io(String),
}

impl From<std::io::Error> for GraphError {
    fn from(e: std::io::Error) -> Self {
        GraphError::Io(e.to_string())
    }
}

/// Clasificación de errores expuesta a los llamadores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Nodo/arista/versión requerido ausente.
    NotFound,
    /// Más de una versión "latest" o precondición de fase incumplida.
    InvariantViolation,
    /// Un miembro del grafo no es del tipo requerido.
    TypeMismatch,
    /// Fallo del backend no relacionado con existencia.
    StoreUnavailable,
    /// Snapshot o captura ilegible.
    Malformed,
}

#[derive(Debug, Error)]
pub enum ProvenanceError {
    #[error("not found: {0}")] NotFound(String),
    #[error("invariant violation: {0}")] InvariantViolation(String),
    #[error("type mismatch for {key}: expected {expected}, found {found}")]
    TypeMismatch { key: String, expected: &'static str, found: &'static str },
    #[error("resource {0} has no resolved value")] Unresolved(String),
    #[error("malformed {}: {reason}", .path.display())] Malformed { path: PathBuf, reason: String },
    #[error(transparent)] Store(#[from] StoreError),
    #[error(transparent)] Vcs(#[from] VcsError),
    #[error(transparent)] Graph(#[from] GraphError),
}

impl ProvenanceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProvenanceError::NotFound(_) => ErrorClass::NotFound,
            ProvenanceError::InvariantViolation(_) | ProvenanceError::Unresolved(_) => ErrorClass::InvariantViolation,
            ProvenanceError::TypeMismatch { .. } => ErrorClass::TypeMismatch,
            ProvenanceError::Malformed { .. } => ErrorClass::Malformed,
            ProvenanceError::Store(e) => match e {
                StoreError::NotFound(_) => ErrorClass::NotFound,
                StoreError::Ambiguous { .. } => ErrorClass::InvariantViolation,
                StoreError::Conflict(_) | StoreError::Unavailable(_) => ErrorClass::StoreUnavailable,
            },
            ProvenanceError::Vcs(e) => match e {
                VcsError::UnknownRef(_) | VcsError::MissingFile(_) | VcsError::NoCommits => ErrorClass::NotFound,
                VcsError::Spawn(_) | VcsError::Command { .. } | VcsError::Io(_) => ErrorClass::StoreUnavailable,
            },
            ProvenanceError::Graph(e) => match e {
                GraphError::UnknownNode(_) | GraphError::UnknownInstance { .. } => ErrorClass::NotFound,
                GraphError::TypeMismatch { .. } => ErrorClass::TypeMismatch,
                GraphError::Snapshot(_) => ErrorClass::Malformed,
                GraphError::Io(_) => ErrorClass::StoreUnavailable,
                GraphError::DuplicateNode(_)
                | GraphError::SelfLoop(_)
                | GraphError::Cycle { .. }
                | GraphError::AlreadyResolved(_) => ErrorClass::InvariantViolation,
            },
        }
    }
}
