//! provflow: procedencia de experimentos sobre un grafo versionado.
//!
//! Fachada sobre los crates del workspace:
//! - `core` (`prov-core`): grafo de experimento, store versionado, control de
//!   versiones y el grabador `commit` / `peek` / `fork`.
//! - `persistence` (`prov-persistence`): store Postgres (Diesel).
pub use prov_core as core;
pub use prov_persistence as persistence;

pub use prov_core::{CommitReport, ExecutionPhase, ExperimentConfig, ExperimentGraph, ForkReport, GitBackend,
                    InMemoryGraphStore, InMemoryVersionControl, PeekReport, ProvenanceError, ProvenanceRecorder,
                    VersionControl, VersionedGraphStore};
