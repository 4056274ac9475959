use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::NodeId;

/// Función que consume y produce recursos.
///
/// `max_depth` lo mantiene el grafo al registrar aristas; `out_artifacts` se
/// completa al registrar recursos cuyo `parent` es esta acción.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub identity: Uuid,
    pub function_name: String,
    pub in_artifacts: Vec<NodeId>,
    pub out_artifacts: Vec<NodeId>,
    pub max_depth: usize,
    pub pending: bool,
}

impl Action {
    pub fn new<I>(function_name: impl Into<String>, inputs: I) -> Self
        where I: IntoIterator<Item = NodeId>
    {
        Self { identity: Uuid::new_v4(),
               function_name: function_name.into(),
               in_artifacts: inputs.into_iter().collect(),
               out_artifacts: Vec::new(),
               max_depth: 0,
               pending: false }
    }

    pub fn pending(mut self, pending: bool) -> Self {
        self.pending = pending;
        self
    }
}
