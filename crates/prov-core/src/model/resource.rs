//! Recursos del experimento: `Literal` (valores de parámetros) y `Artifact`
//! (recursos respaldados por archivo).
//!
//! Un recurso puede declararse sin valor (placeholder) y materializarse más
//! tarde vía `ExperimentGraph::update_value`. Esa transición es la única
//! mutación permitida después del registro y sólo ocurre una vez.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::NodeId;

/// Estado de materialización de un valor declarado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Slot<T> {
    Pending,
    Resolved(T),
}

impl<T> Slot<T> {
    pub fn resolved(&self) -> Option<&T> {
        match self {
            Slot::Resolved(v) => Some(v),
            Slot::Pending => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Slot::Pending)
    }

    /// Transición `Pending -> Resolved`. Devuelve el valor rechazado si el
    /// slot ya estaba resuelto.
    pub fn resolve(&mut self, value: T) -> Result<(), T> {
        match self {
            Slot::Pending => {
                *self = Slot::Resolved(value);
                Ok(())
            }
            Slot::Resolved(_) => Err(value),
        }
    }
}

/// Valor de parámetro. Con `one_by_one = true` el valor es una secuencia y
/// cada elemento es un binding independiente.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    pub value: Slot<Value>,
    pub one_by_one: bool,
}

impl Literal {
    /// Valores que se registran como bindings (vacío si está pendiente).
    pub fn bindings(&self) -> Vec<&Value> {
        match (&self.value, self.one_by_one) {
            (Slot::Pending, _) => vec![],
            (Slot::Resolved(Value::Array(items)), true) => items.iter().collect(),
            (Slot::Resolved(v), _) => vec![v],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub location: Slot<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResourceKind {
    Literal(Literal),
    Artifact(Artifact),
}

/// Recurso con identidad propia, nombre y (opcionalmente) el nodo que lo
/// produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub identity: Uuid,
    pub name: String,
    pub parent: Option<NodeId>,
    pub max_depth: usize,
    pub kind: ResourceKind,
}

impl Resource {
    fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self { identity: Uuid::new_v4(),
               name: name.into(),
               parent: None,
               max_depth: 0,
               kind }
    }

    pub fn literal(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name,
                  ResourceKind::Literal(Literal { value: Slot::Resolved(value.into()),
                                                  one_by_one: false }))
    }

    /// Literal cuyos valores se enlazan uno a uno.
    pub fn literal_each<I, V>(name: impl Into<String>, values: I) -> Self
        where I: IntoIterator<Item = V>,
              V: Into<Value>
    {
        let items: Vec<Value> = values.into_iter().map(Into::into).collect();
        Self::new(name,
                  ResourceKind::Literal(Literal { value: Slot::Resolved(Value::Array(items)),
                                                  one_by_one: true }))
    }

    pub fn artifact(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self::new(name,
                  ResourceKind::Artifact(Artifact { location: Slot::Resolved(location.into()) }))
    }

    pub fn pending_literal(name: impl Into<String>) -> Self {
        Self::new(name,
                  ResourceKind::Literal(Literal { value: Slot::Pending,
                                                  one_by_one: false }))
    }

    pub fn pending_artifact(name: impl Into<String>) -> Self {
        Self::new(name, ResourceKind::Artifact(Artifact { location: Slot::Pending }))
    }

    pub fn with_parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ResourceKind::Literal(_))
    }

    pub fn is_artifact(&self) -> bool {
        matches!(self.kind, ResourceKind::Artifact(_))
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.kind {
            ResourceKind::Literal(l) => Some(l),
            ResourceKind::Artifact(_) => None,
        }
    }

    pub fn as_artifact(&self) -> Option<&Artifact> {
        match &self.kind {
            ResourceKind::Artifact(a) => Some(a),
            ResourceKind::Literal(_) => None,
        }
    }

    /// Ubicación resuelta (sólo artifacts).
    pub fn location(&self) -> Option<&str> {
        self.as_artifact().and_then(|a| a.location.resolved()).map(String::as_str)
    }

    pub fn is_pending(&self) -> bool {
        match &self.kind {
            ResourceKind::Literal(l) => l.value.is_pending(),
            ResourceKind::Artifact(a) => a.location.is_pending(),
        }
    }
}
