//! Errores de persistencia.
//! Traduce errores de Diesel / pool a variantes semánticas y éstas a
//! `StoreError` del core.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use prov_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")] UniqueViolation(String),
    #[error("foreign key violation: {0}")] ForeignKeyViolation(String),
    #[error("not found")] NotFound,
    #[error("serialization conflict (retryable)")] SerializationConflict,
    #[error("transient IO / connection pool error: {0}")] TransientIo(String),
    #[error("corrupt row: {0}")] CorruptRow(String),
    #[error("configuration error: {0}")] Config(String),
    #[error("unknown database error: {0}")] Unknown(String),
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                DatabaseErrorKind::ClosedConnection => Self::TransientIo(info.message().to_string()),
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::CorruptRow(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("ser: {e}")),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound => StoreError::NotFound(err.to_string()),
            PersistenceError::UniqueViolation(msg) => StoreError::Conflict(msg),
            PersistenceError::ForeignKeyViolation(msg) => StoreError::NotFound(msg),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_becomes_conflict() {
        let err: StoreError = PersistenceError::UniqueViolation("prov_nodes_source_key_key".into()).into();
        assert_eq!(err, StoreError::Conflict("prov_nodes_source_key_key".into()));
    }

    #[test]
    fn pool_errors_are_unavailable() {
        let err: StoreError = PersistenceError::TransientIo("pool timeout".into()).into();
        assert!(matches!(err, StoreError::Unavailable(m) if m.contains("pool timeout")));
        let missing: StoreError = PersistenceError::from(DieselError::NotFound).into();
        assert!(matches!(missing, StoreError::NotFound(_)));
    }
}
