//! Modelo de recursos (Literal, Artifact, Action) y nodo genérico del grafo.

pub mod action;
pub mod resource;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use action::Action;
pub use resource::{Artifact, Literal, Resource, ResourceKind, Slot};

/// Índice de un nodo dentro de la arena de un `ExperimentGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphNode {
    Resource(Resource),
    Action(Action),
}

impl GraphNode {
    pub fn identity(&self) -> Uuid {
        match self {
            GraphNode::Resource(r) => r.identity,
            GraphNode::Action(a) => a.identity,
        }
    }

    /// Nombre de cara al usuario: nombre del recurso o función de la acción.
    pub fn label(&self) -> &str {
        match self {
            GraphNode::Resource(r) => &r.name,
            GraphNode::Action(a) => &a.function_name,
        }
    }

    pub fn max_depth(&self) -> usize {
        match self {
            GraphNode::Resource(r) => r.max_depth,
            GraphNode::Action(a) => a.max_depth,
        }
    }

    pub(crate) fn set_max_depth(&mut self, depth: usize) {
        match self {
            GraphNode::Resource(r) => r.max_depth = depth,
            GraphNode::Action(a) => a.max_depth = depth,
        }
    }

    pub fn is_action(&self) -> bool {
        matches!(self, GraphNode::Action(_))
    }

    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            GraphNode::Resource(r) => Some(r),
            GraphNode::Action(_) => None,
        }
    }

    pub fn as_action(&self) -> Option<&Action> {
        match self {
            GraphNode::Action(a) => Some(a),
            GraphNode::Resource(_) => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            GraphNode::Resource(r) if r.is_literal() => "Literal",
            GraphNode::Resource(_) => "Artifact",
            GraphNode::Action(_) => "Action",
        }
    }
}

impl From<Resource> for GraphNode {
    fn from(r: Resource) -> Self {
        GraphNode::Resource(r)
    }
}

impl From<Action> for GraphNode {
    fn from(a: Action) -> Self {
        GraphNode::Action(a)
    }
}
