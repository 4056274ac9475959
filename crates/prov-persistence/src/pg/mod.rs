//! Implementación Postgres (Diesel) del store versionado del core.
//!
//! - Seis tablas append-only (`prov_*`); nada se actualiza ni se borra.
//! - Ids de una secuencia compartida (`prov_ids`), igual que el store en
//!   memoria, así que los órdenes de historia coinciden entre backends.
//! - La cabeza de un nodo es su versión de id mayor.
//! - Una clave de origen duplicada llega como `UniqueViolation` y sale como
//!   `StoreError::Conflict`; el upsert del core relee en ese caso.
//! - Reintento con backoff corto para errores transitorios (pool,
//!   serialización, desconexiones).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::{debug, warn};
use prov_core::store::{EdgeRecord, EdgeVersion, LineageEdge, LineageEdgeVersion, NodeRecord, NodeVersion, StoreId,
                       Tags};
use prov_core::{StoreError, VersionedGraphStore};
use serde_json::Value;

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{prov_edge_versions, prov_edges, prov_lineage_edge_versions, prov_lineage_edges,
                    prov_node_versions, prov_nodes};

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones (pool real o uno fabricado en tests).
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

/// `ConnectionProvider` respaldado por un `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

#[derive(Queryable, Debug)]
struct NodeRow {
    id: i64,
    source_key: String,
    name: String,
    tags: Value,
    created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = prov_nodes)]
struct NewNodeRow<'a> {
    source_key: &'a str,
    name: &'a str,
    tags: Value,
}

#[derive(Queryable, Debug)]
struct EdgeRow {
    id: i64,
    source_key: String,
    name: String,
    from_node: i64,
    to_node: i64,
    tags: Value,
    created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = prov_edges)]
struct NewEdgeRow<'a> {
    source_key: &'a str,
    name: &'a str,
    from_node: i64,
    to_node: i64,
    tags: Value,
}

#[derive(Queryable, Debug)]
struct NodeVersionRow {
    id: i64,
    node_id: i64,
    tags: Value,
    parent_ids: Vec<i64>,
    created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = prov_node_versions)]
struct NewNodeVersionRow {
    node_id: i64,
    tags: Value,
    parent_ids: Vec<i64>,
}

/// Filas de `prov_edge_versions` y `prov_lineage_edge_versions` (misma forma).
#[derive(Queryable, Debug)]
struct VersionLinkRow {
    id: i64,
    owner_id: i64,
    from_version: i64,
    to_version: i64,
    created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = prov_edge_versions)]
struct NewEdgeVersionRow {
    edge_id: i64,
    from_version: i64,
    to_version: i64,
}

#[derive(Queryable, Debug)]
struct LineageRow {
    id: i64,
    source_key: String,
    name: String,
    tags: Value,
    created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = prov_lineage_edges)]
struct NewLineageRow<'a> {
    source_key: &'a str,
    name: &'a str,
    tags: Value,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = prov_lineage_edge_versions)]
struct NewLineageVersionRow {
    lineage_edge_id: i64,
    from_version: i64,
    to_version: i64,
}

fn tags_to_json(tags: &Tags) -> Result<Value, PersistenceError> {
    serde_json::to_value(tags).map_err(|e| PersistenceError::CorruptRow(format!("tags: {e}")))
}

fn tags_from_json(value: Value) -> Result<Tags, PersistenceError> {
    serde_json::from_value(value).map_err(|e| PersistenceError::CorruptRow(format!("tags: {e}")))
}

impl NodeRow {
    fn into_record(self) -> Result<NodeRecord, PersistenceError> {
        Ok(NodeRecord { id: self.id,
                        source_key: self.source_key,
                        name: self.name,
                        tags: tags_from_json(self.tags)?,
                        created_at: self.created_at })
    }
}

impl EdgeRow {
    fn into_record(self) -> Result<EdgeRecord, PersistenceError> {
        Ok(EdgeRecord { id: self.id,
                        source_key: self.source_key,
                        name: self.name,
                        from_node: self.from_node,
                        to_node: self.to_node,
                        tags: tags_from_json(self.tags)?,
                        created_at: self.created_at })
    }
}

impl NodeVersionRow {
    fn into_record(self) -> Result<NodeVersion, PersistenceError> {
        Ok(NodeVersion { id: self.id,
                         node_id: self.node_id,
                         tags: tags_from_json(self.tags)?,
                         parent_ids: self.parent_ids,
                         created_at: self.created_at })
    }
}

impl LineageRow {
    fn into_record(self) -> Result<LineageEdge, PersistenceError> {
        Ok(LineageEdge { id: self.id,
                         source_key: self.source_key,
                         name: self.name,
                         tags: tags_from_json(self.tags)?,
                         created_at: self.created_at })
    }
}

impl From<VersionLinkRow> for EdgeVersion {
    fn from(row: VersionLinkRow) -> Self {
        EdgeVersion { id: row.id,
                      edge_id: row.owner_id,
                      from_version: row.from_version,
                      to_version: row.to_version,
                      created_at: row.created_at }
    }
}

impl From<VersionLinkRow> for LineageEdgeVersion {
    fn from(row: VersionLinkRow) -> Self {
        LineageEdgeVersion { id: row.id,
                             lineage_edge_id: row.owner_id,
                             from_version: row.from_version,
                             to_version: row.to_version,
                             created_at: row.created_at }
    }
}

/// Determina si un error es transitorio (recomendado reintentar con backoff).
fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("terminating connection due to administrator command")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Retry simple con backoff lineal muy pequeño (hasta 3 reintentos: 15ms,
/// 30ms, 45ms). Sólo repite la unidad de trabajo provista por `f`.
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms",
                      attempts + 1,
                      e,
                      delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Store versionado de procedencia sobre Postgres.
pub struct PgGraphStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgGraphStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Unidad de trabajo sobre una conexión del pool, con reintento ante
    /// fallos transitorios.
    fn run<T, F>(&self, f: F) -> Result<T, StoreError>
        where F: Fn(&mut PgConnection) -> Result<T, PersistenceError>
    {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            f(&mut conn)
        }).map_err(StoreError::from)
    }

    fn node_id_for(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.run(|conn| {
                prov_nodes::table.filter(prov_nodes::source_key.eq(key))
                                 .select(prov_nodes::id)
                                 .first::<i64>(conn)
                                 .optional()
                                 .map_err(PersistenceError::from)
            })
    }
}

impl PgGraphStore<PoolProvider> {
    /// Construye el store desde `DATABASE_URL` (y `.env`), migrando el esquema.
    pub fn from_env() -> Result<Self, PersistenceError> {
        Ok(Self::new(PoolProvider { pool: build_dev_pool_from_env()? }))
    }
}

impl<P: ConnectionProvider> VersionedGraphStore for PgGraphStore<P> {
    fn get_node(&self, key: &str) -> Result<Option<NodeRecord>, StoreError> {
        self.run(|conn| {
                prov_nodes::table.filter(prov_nodes::source_key.eq(key))
                                 .first::<NodeRow>(conn)
                                 .optional()?
                                 .map(NodeRow::into_record)
                                 .transpose()
            })
    }

    fn create_node(&mut self, key: &str, name: &str, tags: Tags) -> Result<NodeRecord, StoreError> {
        let tags = tags_to_json(&tags)?;
        let record = self.run(|conn| {
                             diesel::insert_into(prov_nodes::table).values(NewNodeRow { source_key: key,
                                                                                        name,
                                                                                        tags: tags.clone() })
                                                                   .get_result::<NodeRow>(conn)
                                                                   .map_err(PersistenceError::from)?
                                                                   .into_record()
                         })?;
        debug!("node #{} {key}", record.id);
        Ok(record)
    }

    fn get_edge(&self, key: &str) -> Result<Option<EdgeRecord>, StoreError> {
        self.run(|conn| {
                prov_edges::table.filter(prov_edges::source_key.eq(key))
                                 .first::<EdgeRow>(conn)
                                 .optional()?
                                 .map(EdgeRow::into_record)
                                 .transpose()
            })
    }

    fn create_edge(&mut self,
                   key: &str,
                   name: &str,
                   from_node: StoreId,
                   to_node: StoreId,
                   tags: Tags)
                   -> Result<EdgeRecord, StoreError> {
        let tags = tags_to_json(&tags)?;
        let record = self.run(|conn| {
                             diesel::insert_into(prov_edges::table).values(NewEdgeRow { source_key: key,
                                                                                        name,
                                                                                        from_node,
                                                                                        to_node,
                                                                                        tags: tags.clone() })
                                                                   .get_result::<EdgeRow>(conn)
                                                                   .map_err(PersistenceError::from)?
                                                                   .into_record()
                         })?;
        debug!("edge #{} {key}", record.id);
        Ok(record)
    }

    fn get_latest_node_versions(&self, node_key: &str) -> Result<Vec<StoreId>, StoreError> {
        let Some(node_id) = self.node_id_for(node_key)? else {
            return Ok(Vec::new());
        };
        self.run(|conn| {
                prov_node_versions::table.filter(prov_node_versions::node_id.eq(node_id))
                                         .select(prov_node_versions::id)
                                         .order(prov_node_versions::id.desc())
                                         .first::<i64>(conn)
                                         .optional()
                                         .map(|head| head.into_iter().collect())
                                         .map_err(PersistenceError::from)
            })
    }

    fn get_node_version(&self, id: StoreId) -> Result<NodeVersion, StoreError> {
        self.run(|conn| {
                prov_node_versions::table.find(id)
                                         .first::<NodeVersionRow>(conn)
                                         .optional()?
                                         .map(NodeVersionRow::into_record)
                                         .transpose()
            })?
            .ok_or_else(|| StoreError::NotFound(format!("node version #{id}")))
    }

    fn create_node_version(&mut self,
                           node_id: StoreId,
                           tags: Tags,
                           parent_ids: &[StoreId])
                           -> Result<NodeVersion, StoreError> {
        let tags = tags_to_json(&tags)?;
        let version = self.run(|conn| {
                              diesel::insert_into(prov_node_versions::table)
                                  .values(NewNodeVersionRow { node_id,
                                                              tags: tags.clone(),
                                                              parent_ids: parent_ids.to_vec() })
                                  .get_result::<NodeVersionRow>(conn)
                                  .map_err(PersistenceError::from)?
                                  .into_record()
                          })?;
        debug!("node version #{} of node #{node_id}", version.id);
        Ok(version)
    }

    fn create_edge_version(&mut self,
                           edge_id: StoreId,
                           from_version: StoreId,
                           to_version: StoreId)
                           -> Result<EdgeVersion, StoreError> {
        self.run(|conn| {
                diesel::insert_into(prov_edge_versions::table).values(NewEdgeVersionRow { edge_id,
                                                                                          from_version,
                                                                                          to_version })
                                                              .get_result::<VersionLinkRow>(conn)
                                                              .map(EdgeVersion::from)
                                                              .map_err(PersistenceError::from)
            })
    }

    fn get_lineage_edge(&self, key: &str) -> Result<Option<LineageEdge>, StoreError> {
        self.run(|conn| {
                prov_lineage_edges::table.filter(prov_lineage_edges::source_key.eq(key))
                                         .first::<LineageRow>(conn)
                                         .optional()?
                                         .map(LineageRow::into_record)
                                         .transpose()
            })
    }

    fn create_lineage_edge(&mut self, key: &str, name: &str, tags: Tags) -> Result<LineageEdge, StoreError> {
        let tags = tags_to_json(&tags)?;
        self.run(|conn| {
                diesel::insert_into(prov_lineage_edges::table).values(NewLineageRow { source_key: key,
                                                                                      name,
                                                                                      tags: tags.clone() })
                                                              .get_result::<LineageRow>(conn)
                                                              .map_err(PersistenceError::from)?
                                                              .into_record()
            })
    }

    fn create_lineage_edge_version(&mut self,
                                   lineage_edge_id: StoreId,
                                   from_version: StoreId,
                                   to_version: StoreId)
                                   -> Result<LineageEdgeVersion, StoreError> {
        self.run(|conn| {
                diesel::insert_into(prov_lineage_edge_versions::table)
                    .values(NewLineageVersionRow { lineage_edge_id,
                                                   from_version,
                                                   to_version })
                    .get_result::<VersionLinkRow>(conn)
                    .map(LineageEdgeVersion::from)
                    .map_err(PersistenceError::from)
            })
    }

    fn get_node_history(&self, node_key: &str) -> Result<BTreeMap<String, StoreId>, StoreError> {
        let Some(node_id) = self.node_id_for(node_key)? else {
            return Ok(BTreeMap::new());
        };
        let ids: Vec<i64> = self.run(|conn| {
                                    prov_node_versions::table.filter(prov_node_versions::node_id.eq(node_id))
                                                             .select(prov_node_versions::id)
                                                             .order(prov_node_versions::id.asc())
                                                             .load(conn)
                                                             .map_err(PersistenceError::from)
                                })?;
        Ok(ids.into_iter().map(|id| (format!("{:020}", id), id)).collect())
    }

    fn list_edges_from(&self, node_id: StoreId) -> Result<Vec<EdgeRecord>, StoreError> {
        self.run(|conn| {
                prov_edges::table.filter(prov_edges::from_node.eq(node_id))
                                 .order(prov_edges::id.asc())
                                 .load::<EdgeRow>(conn)?
                                 .into_iter()
                                 .map(EdgeRow::into_record)
                                 .collect()
            })
    }

    fn list_edge_versions(&self, edge_id: StoreId) -> Result<Vec<EdgeVersion>, StoreError> {
        self.run(|conn| {
                let rows = prov_edge_versions::table.filter(prov_edge_versions::edge_id.eq(edge_id))
                                                    .order(prov_edge_versions::id.asc())
                                                    .load::<VersionLinkRow>(conn)?;
                Ok(rows.into_iter().map(EdgeVersion::from).collect())
            })
    }

    fn list_lineage_edge_versions(&self, lineage_edge_id: StoreId) -> Result<Vec<LineageEdgeVersion>, StoreError> {
        self.run(|conn| {
                let rows =
                    prov_lineage_edge_versions::table.filter(prov_lineage_edge_versions::lineage_edge_id
                                                                                      .eq(lineage_edge_id))
                                                     .order(prov_lineage_edge_versions::id.asc())
                                                     .load::<VersionLinkRow>(conn)?;
                Ok(rows.into_iter().map(LineageEdgeVersion::from).collect())
            })
    }
}

/// Construye un pool Postgres r2d2 a partir de URL y corre las migraciones
/// pendientes una vez.
///
/// Si `min_size > max_size` se usa `min_size = max_size`; tamaños 0 pasan a 1.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = if min_size == 0 { 1 } else { min_size };
    let validated_max = if max_size == 0 { 1 } else { max_size };
    if validated_min > validated_max {
        warn!("min_size > max_size ({} > {}), ajustando min=max",
              validated_min, validated_max);
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Carga `.env`, lee `DbConfig` y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
