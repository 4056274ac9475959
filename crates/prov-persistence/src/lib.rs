//! prov-persistence
//!
//! Store versionado de procedencia sobre Postgres (Diesel + r2d2). Implementa
//! `VersionedGraphStore` con la misma semántica que el store en memoria del
//! core: claves de origen únicas, ids de una secuencia compartida y cabeza de
//! nodo igual a su versión más reciente.
//!
//! Módulos:
//! - `pg`: pool, proveedor de conexiones y `PgGraphStore`.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel declaradas para compilar queries.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgGraphStore, PgPool, PoolProvider};
