//! prov-core: grafo de experimento + grabador de procedencia.
pub mod config;
pub mod constants;
pub mod errors;
pub mod graph;
pub mod hashing;
pub mod keys;
pub mod model;
pub mod recorder;
pub mod store;
pub mod vcs;

pub use config::{ConfigError, ExperimentConfig};
pub use errors::{ErrorClass, GraphError, ProvenanceError};
pub use graph::{ExperimentGraph, InstanceKey, StartSignature};
pub use keys::{LineageKey, NodeKey, ResourceRole};
pub use model::{Action, GraphNode, NodeId, Resource};
pub use recorder::{CommitReport, ExecutionPhase, ForkReport, PeekReport, ProvenanceRecorder, StartRecord};
pub use store::{FlakyReads, InMemoryGraphStore, StoreError, StoreId, Upsert, VersionedGraphStore};
pub use vcs::{CheckedOutRef, GitBackend, InMemoryVersionControl, VcsError, VersionControl};
