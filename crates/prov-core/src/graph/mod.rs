//! Motor del grafo de experimento.
pub mod experiment;
mod snapshot;

pub use experiment::{Adjacency, AdjacencySnapshot, ExperimentGraph, InstanceKey, StartSignature};
