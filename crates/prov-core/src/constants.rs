//! Constantes del protocolo de procedencia.
//!
//! Algunas de estas constantes participan en la construcción de claves y en el
//! formato del snapshot. Cambiarlas rompe la deduplicación contra un store ya
//! poblado (las claves dejarían de coincidir).

/// Prefijo de todas las claves de nodos, aristas y lineage.
pub const KEY_NAMESPACE: &str = "xp";

/// Ruta (relativa al directorio del experimento) del snapshot del grafo.
pub const SNAPSHOT_FILE: &str = "0/experiment_graph.json";

/// Prefijo de los archivos de captura intermedia (`ghost_literal_0.json`, ...).
pub const GHOST_PREFIX: &str = "ghost_literal_";

/// Extensión de los archivos de captura intermedia.
pub const GHOST_EXTENSION: &str = "json";

/// Versión del formato del snapshot serializado.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Nombres de tags de una versión de spec.
pub const TAG_TIMESTAMP: &str = "timestamp";
pub const TAG_COMMIT_HASH: &str = "commitHash";
pub const TAG_SEQUENCE_NUMBER: &str = "sequenceNumber";
pub const TAG_EXECUTION_PHASE: &str = "executionPhase";

/// Tags de nodos de recurso/trial.
pub const TAG_VALUE: &str = "value";
pub const TAG_CHECKSUM: &str = "checksum";
pub const TAG_LOCATION: &str = "location";
pub const TAG_OUTPUT: &str = "output";
pub const TAG_TRIAL_NUMBER: &str = "trialNumber";
pub const TAG_FUNCTION: &str = "function";
