//! Grafo de experimento en memoria.
//!
//! Mantiene incrementalmente, a medida que se registran nodos y aristas:
//! - adyacencia hacia adelante (`forward`) y hacia atrás (`backward`);
//! - `starts`: recursos sin aristas entrantes;
//! - profundidad topológica (`max_depth`) y los buckets de acciones por
//!   profundidad;
//! - `connected_starts`: qué starts influyen sobre cada nodo.
//!
//! Los nodos viven en una arena (`Vec<GraphNode>`) indexada por `NodeId`. Las
//! acciones registradas con `register_node` nunca son starts; los nodos
//! registrados con `light_node` (cara al motor de ejecución) siempre entran en
//! `starts` mientras no tengan aristas entrantes.
use std::collections::{BTreeMap, HashMap, VecDeque};

use indexmap::{IndexMap, IndexSet};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::GraphError;
use crate::hashing::stringify;
use crate::model::{GraphNode, NodeId, Resource, ResourceKind};

pub type Adjacency = IndexMap<NodeId, IndexSet<NodeId>>;

/// Clave compuesta `(nombre, instancia)` con la que el motor localiza un
/// recurso vivo.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    pub name: String,
    pub instance: Uuid,
}

/// Copia de la adyacencia tomada antes de un `absorb`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdjacencySnapshot {
    pub forward: Adjacency,
    pub backward: Adjacency,
}

/// Forma estructural de un start (para comparar grafos sin mirar ids).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StartSignature {
    pub kind: &'static str,
    pub name: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExperimentGraph {
    pub(crate) nodes: Vec<GraphNode>,
    pub(crate) light: Vec<bool>,
    by_identity: HashMap<Uuid, NodeId>,
    forward: Adjacency,
    backward: Adjacency,
    starts: IndexSet<NodeId>,
    location_map: HashMap<String, NodeId>,
    name_map: HashMap<String, NodeId>,
    instance_map: HashMap<InstanceKey, NodeId>,
    connected_starts: HashMap<NodeId, IndexSet<NodeId>>,
    actions_at_depth: BTreeMap<usize, IndexSet<NodeId>>,
    pub(crate) edge_log: Vec<(NodeId, NodeId)>,
    pre_absorb: Option<AdjacencySnapshot>,
}

impl ExperimentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra un nodo declarado por el experimento.
    ///
    /// Falla si la identidad ya está registrada o si el padre/las entradas
    /// referenciadas no existen.
    pub fn register_node(&mut self, node: impl Into<GraphNode>) -> Result<NodeId, GraphError> {
        let node = node.into();
        self.check_new(&node)?;
        let id = self.push(node.clone(), false);
        match node {
            GraphNode::Resource(r) => {
                self.starts.insert(id);
                self.index_resource(id, &r);
                let connected = match r.parent {
                    Some(parent) => {
                        self.attach_output(parent, id);
                        self.connected_starts.get(&parent).cloned().unwrap_or_default()
                    }
                    None => std::iter::once(id).collect(),
                };
                self.connected_starts.insert(id, connected);
            }
            GraphNode::Action(a) => {
                self.bucket(id, a.max_depth);
                let mut connected = IndexSet::new();
                for input in &a.in_artifacts {
                    if let Some(set) = self.connected_starts.get(input) {
                        connected.extend(set.iter().copied());
                    }
                }
                self.connected_starts.insert(id, connected);
                self.instance_map.insert(InstanceKey { name: a.function_name.clone(),
                                                       instance: a.identity },
                                         id);
            }
        }
        Ok(id)
    }

    /// Registro ligero, cara al motor de ejecución: todo nodo entra en
    /// `starts` y los recursos quedan indexados por `(nombre, instancia)`.
    pub fn light_node(&mut self, node: impl Into<GraphNode>) -> Result<NodeId, GraphError> {
        let node = node.into();
        self.check_new(&node)?;
        let id = self.push(node.clone(), true);
        self.starts.insert(id);
        match node {
            GraphNode::Action(a) => {
                self.bucket(id, a.max_depth);
                self.connected_starts.insert(id, IndexSet::new());
                self.instance_map.insert(InstanceKey { name: a.function_name.clone(),
                                                       instance: a.identity },
                                         id);
            }
            GraphNode::Resource(r) => {
                if let Some(parent) = r.parent {
                    self.attach_output(parent, id);
                }
                self.index_resource(id, &r);
                self.connected_starts.insert(id, std::iter::once(id).collect());
            }
        }
        Ok(id)
    }

    /// Registra la arista `u -> v`, saca a `v` de `starts` y propaga la
    /// profundidad hacia los sucesores. Registrar dos veces la misma arista
    /// no tiene efecto.
    pub fn register_edge(&mut self, u: NodeId, v: NodeId) -> Result<(), GraphError> {
        self.ensure(u)?;
        self.ensure(v)?;
        if u == v {
            return Err(GraphError::SelfLoop(u));
        }
        if self.forward.get(&u).is_some_and(|s| s.contains(&v)) {
            return Ok(());
        }
        if self.reaches(v, u) {
            return Err(GraphError::Cycle { from: u, to: v });
        }
        self.forward.entry(u).or_default().insert(v);
        self.backward.entry(v).or_default().insert(u);
        self.starts.shift_remove(&v);
        self.edge_log.push((u, v));
        let depth = self.nodes[u.0].max_depth() + 1;
        self.raise_depth(v, depth);
        Ok(())
    }

    /// Incorpora un sub-grafo descubierto durante la ejecución.
    ///
    /// Guarda primero la adyacencia previa (ver `pre_absorb` y
    /// `absorbed_edges`). Los nodos ya presentes (misma identidad) se
    /// reutilizan; los nuevos se registran en el orden de la arena de `other`
    /// y sus aristas se reproducen en orden de inserción.
    pub fn absorb(&mut self, other: &ExperimentGraph) -> Result<(), GraphError> {
        self.pre_absorb = Some(AdjacencySnapshot { forward: self.forward.clone(),
                                                   backward: self.backward.clone() });
        let mut remap: HashMap<NodeId, NodeId> = HashMap::with_capacity(other.nodes.len());
        for (idx, node) in other.nodes.iter().enumerate() {
            let old = NodeId(idx);
            if let Some(existing) = self.by_identity.get(&node.identity()) {
                remap.insert(old, *existing);
                continue;
            }
            let mut fresh = node.clone();
            fresh.set_max_depth(0);
            match &mut fresh {
                GraphNode::Resource(r) => {
                    r.parent = match r.parent {
                        Some(p) => Some(lookup(&remap, p)?),
                        None => None,
                    };
                }
                GraphNode::Action(a) => {
                    a.in_artifacts = a.in_artifacts
                                      .iter()
                                      .map(|i| lookup(&remap, *i))
                                      .collect::<Result<Vec<_>, _>>()?;
                    a.out_artifacts.clear();
                }
            }
            let id = if other.light.get(idx).copied().unwrap_or(false) {
                self.light_node(fresh)?
            } else {
                self.register_node(fresh)?
            };
            remap.insert(old, id);
        }
        for (old, set) in &other.connected_starts {
            if let Some(new) = remap.get(old) {
                let mapped: Vec<NodeId> = set.iter().filter_map(|s| remap.get(s).copied()).collect();
                self.connected_starts.entry(*new).or_default().extend(mapped);
            }
        }
        for (u, v) in &other.edge_log {
            self.register_edge(lookup(&remap, *u)?, lookup(&remap, *v)?)?;
        }
        debug!("absorb: {} nodes merged, {} new edges",
               other.nodes.len(),
               self.absorbed_edges().len());
        Ok(())
    }

    /// Une `set` a los starts conectados de `id`. Sólo la usa la carga de
    /// snapshots; los ids deben existir ya en la arena.
    pub(crate) fn merge_connected_starts(&mut self, id: NodeId, set: Vec<NodeId>) -> Result<(), GraphError> {
        self.ensure(id)?;
        for start in &set {
            self.ensure(*start)?;
        }
        self.connected_starts.entry(id).or_default().extend(set);
        Ok(())
    }

    /// `true` si ninguna acción (en ningún bucket) está pendiente.
    pub fn is_none_pending(&self) -> bool {
        self.actions_at_depth
            .values()
            .flatten()
            .all(|id| !matches!(&self.nodes[id.0], GraphNode::Action(a) if a.pending))
    }

    pub fn set_pending(&mut self, id: NodeId, pending: bool) -> Result<(), GraphError> {
        self.ensure(id)?;
        match &mut self.nodes[id.0] {
            GraphNode::Action(a) => {
                a.pending = pending;
                Ok(())
            }
            GraphNode::Resource(r) => Err(GraphError::TypeMismatch { key: r.name.clone(),
                                                                     reason: "only actions carry a pending flag".into() }),
        }
    }

    /// Materializa un placeholder: fija la ubicación (Artifact) o el valor
    /// (Literal) del recurso registrado como `(name, instance)`.
    pub fn update_value(&mut self, name: &str, instance: Uuid, value: Value) -> Result<NodeId, GraphError> {
        let key = InstanceKey { name: name.to_string(),
                                instance };
        let id = *self.instance_map
                      .get(&key)
                      .ok_or_else(|| GraphError::UnknownInstance { name: name.to_string(),
                                                                   instance })?;
        let label = format!("{name}#{instance}");
        let new_location = match &mut self.nodes[id.0] {
            GraphNode::Resource(r) => match &mut r.kind {
                ResourceKind::Artifact(a) => {
                    let Value::String(loc) = value else {
                        return Err(GraphError::TypeMismatch { key: label,
                                                              reason: "artifact location must be a string".into() });
                    };
                    a.location
                     .resolve(loc.clone())
                     .map_err(|_| GraphError::AlreadyResolved(label.clone()))?;
                    Some(loc)
                }
                ResourceKind::Literal(l) => {
                    l.value.resolve(value).map_err(|_| GraphError::AlreadyResolved(label.clone()))?;
                    None
                }
            },
            GraphNode::Action(_) => {
                return Err(GraphError::TypeMismatch { key: label,
                                                      reason: "neither Literal nor Artifact".into() })
            }
        };
        if let Some(loc) = new_location {
            self.location_map.insert(loc, id);
        }
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &GraphNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.0)
    }

    pub fn resource(&self, id: NodeId) -> Option<&Resource> {
        self.node(id).and_then(GraphNode::as_resource)
    }

    pub fn node_id(&self, identity: Uuid) -> Option<NodeId> {
        self.by_identity.get(&identity).copied()
    }

    pub fn starts(&self) -> &IndexSet<NodeId> {
        &self.starts
    }

    pub fn is_start(&self, id: NodeId) -> bool {
        self.starts.contains(&id)
    }

    pub fn successors(&self, id: NodeId) -> Option<&IndexSet<NodeId>> {
        self.forward.get(&id)
    }

    pub fn predecessors(&self, id: NodeId) -> Option<&IndexSet<NodeId>> {
        self.backward.get(&id)
    }

    pub fn connected_starts(&self, id: NodeId) -> Option<&IndexSet<NodeId>> {
        self.connected_starts.get(&id)
    }

    pub fn actions_at_depth(&self) -> &BTreeMap<usize, IndexSet<NodeId>> {
        &self.actions_at_depth
    }

    pub fn by_location(&self, location: &str) -> Option<NodeId> {
        self.location_map.get(location).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<NodeId> {
        self.name_map.get(name).copied()
    }

    /// Aristas en orden de registro.
    pub fn edges(&self) -> &[(NodeId, NodeId)] {
        &self.edge_log
    }

    pub fn pre_absorb(&self) -> Option<&AdjacencySnapshot> {
        self.pre_absorb.as_ref()
    }

    /// Aristas introducidas por el último `absorb`.
    pub fn absorbed_edges(&self) -> Vec<(NodeId, NodeId)> {
        let Some(pre) = &self.pre_absorb else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (u, succ) in &self.forward {
            for v in succ {
                if !pre.forward.get(u).is_some_and(|s| s.contains(v)) {
                    out.push((*u, *v));
                }
            }
        }
        out
    }

    /// Acciones que no son start, en orden de arena.
    pub fn non_start_actions(&self) -> impl Iterator<Item = (NodeId, &crate::model::Action)> {
        self.nodes()
            .filter(|(id, _)| !self.starts.contains(id))
            .filter_map(|(id, n)| n.as_action().map(|a| (id, a)))
    }

    /// Firma estructural ordenada de `starts` (tipo, nombre, valor/ubicación).
    pub fn starts_signature(&self) -> Vec<StartSignature> {
        let mut out: Vec<StartSignature> =
            self.starts
                .iter()
                .map(|id| {
                    let node = &self.nodes[id.0];
                    let content = match node {
                        GraphNode::Resource(r) => match &r.kind {
                            ResourceKind::Literal(l) => l.value.resolved().map(stringify),
                            ResourceKind::Artifact(a) => a.location.resolved().cloned(),
                        },
                        GraphNode::Action(_) => None,
                    };
                    StartSignature { kind: node.kind_name(),
                                     name: node.label().to_string(),
                                     content }
                })
                .collect();
        out.sort();
        out
    }

    fn check_new(&self, node: &GraphNode) -> Result<(), GraphError> {
        if self.by_identity.contains_key(&node.identity()) {
            return Err(GraphError::DuplicateNode(node.identity()));
        }
        match node {
            GraphNode::Resource(r) => {
                if let Some(parent) = r.parent {
                    self.ensure(parent)?;
                }
            }
            GraphNode::Action(a) => {
                for input in &a.in_artifacts {
                    self.ensure(*input)?;
                }
            }
        }
        Ok(())
    }

    fn ensure(&self, id: NodeId) -> Result<(), GraphError> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownNode(id))
        }
    }

    fn push(&mut self, node: GraphNode, light: bool) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.by_identity.insert(node.identity(), id);
        self.forward.insert(id, IndexSet::new());
        self.backward.insert(id, IndexSet::new());
        self.nodes.push(node);
        self.light.push(light);
        id
    }

    fn index_resource(&mut self, id: NodeId, r: &Resource) {
        self.name_map.insert(r.name.clone(), id);
        self.instance_map.insert(InstanceKey { name: r.name.clone(),
                                               instance: r.identity },
                                 id);
        if let Some(loc) = r.location() {
            self.location_map.insert(loc.to_string(), id);
        }
    }

    fn attach_output(&mut self, parent: NodeId, child: NodeId) {
        if let Some(GraphNode::Action(a)) = self.nodes.get_mut(parent.0) {
            if !a.out_artifacts.contains(&child) {
                a.out_artifacts.push(child);
            }
        }
    }

    fn bucket(&mut self, id: NodeId, depth: usize) {
        self.actions_at_depth.entry(depth).or_default().insert(id);
    }

    fn unbucket(&mut self, id: NodeId, depth: usize) {
        if let Some(set) = self.actions_at_depth.get_mut(&depth) {
            set.shift_remove(&id);
            if set.is_empty() {
                self.actions_at_depth.remove(&depth);
            }
        }
    }

    fn raise_depth(&mut self, start: NodeId, depth: usize) {
        let mut work = VecDeque::from([(start, depth)]);
        while let Some((id, candidate)) = work.pop_front() {
            let current = self.nodes[id.0].max_depth();
            if candidate <= current {
                continue;
            }
            let is_action = self.nodes[id.0].is_action();
            if is_action {
                self.unbucket(id, current);
            }
            self.nodes[id.0].set_max_depth(candidate);
            if is_action {
                self.bucket(id, candidate);
            }
            if let Some(succ) = self.forward.get(&id) {
                work.extend(succ.iter().map(|s| (*s, candidate + 1)));
            }
        }
    }

    /// ¿Hay camino `from ~> target` siguiendo aristas hacia adelante?
    fn reaches(&self, from: NodeId, target: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = IndexSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(succ) = self.forward.get(&id) {
                stack.extend(succ.iter().copied());
            }
        }
        false
    }
}

fn lookup(remap: &HashMap<NodeId, NodeId>, id: NodeId) -> Result<NodeId, GraphError> {
    remap.get(&id).copied().ok_or(GraphError::UnknownNode(id))
}
