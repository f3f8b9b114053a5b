//! # Database Error Types
//!
//! Error types for local store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)      CoreError / ValidationError           │
//! │       │                                   │                             │
//! │       └──────────────┬────────────────────┘                             │
//! │                      ▼                                                  │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError (depot-sync) / ApiError (depot-cli)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Operator sees the failure; an enqueue is never reported as success    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use depot_core::{CoreError, ValidationError};
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The row exists but is in the wrong status for the operation.
    ///
    /// ## When This Occurs
    /// - `retry_now` / `discard` on a row that is not FAILED
    /// - `mark_synced` / `mark_failed` on a row that is not SYNCING
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A queue mutation would break the one-in-flight, head-first order.
    ///
    /// The sync engine never asks for this; seeing it means a caller skipped
    /// the queue head or tried to run two attempts at once.
    #[error("Queue ordering violation: {0}")]
    OrderingViolation(String),

    /// The store cannot be used at all.
    ///
    /// ## When This Occurs
    /// - Database file can't be opened or created
    /// - Disk full, I/O error, corrupted file
    /// - Pool closed or exhausted
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Payload rejected before it was written.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// True when the failure is in the storage itself rather than the request.
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, DbError::StorageUnavailable(_))
    }
}

/// SQLite primary result codes that mean the store itself is unusable.
///
/// BUSY(5), LOCKED(6), IOERR(10), CORRUPT(11), FULL(13), CANTOPEN(14),
/// NOTADB(26).
const STORAGE_CODES: [i64; 7] = [5, 6, 10, 11, 13, 14, 26];

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound       → DbError::NotFound
/// sqlx::Error::Database          → StorageUnavailable for I/O class codes,
///                                  QueryFailed otherwise
/// sqlx::Error::Pool* / Io        → DbError::StorageUnavailable
/// sqlx::Error::*Decode / Encode  → DbError::Serialization
/// Other                          → DbError::QueryFailed
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let primary = db_err
                    .code()
                    .and_then(|code| code.parse::<i64>().ok())
                    .map(|code| code & 0xff);

                match primary {
                    Some(code) if STORAGE_CODES.contains(&code) => {
                        DbError::StorageUnavailable(db_err.message().to_string())
                    }
                    _ => DbError::QueryFailed(db_err.message().to_string()),
                }
            }

            sqlx::Error::PoolTimedOut => {
                DbError::StorageUnavailable("connection pool timed out".to_string())
            }
            sqlx::Error::PoolClosed => DbError::StorageUnavailable("pool is closed".to_string()),
            sqlx::Error::Io(e) => DbError::StorageUnavailable(e.to_string()),

            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::Encode(_) => {
                DbError::Serialization(err.to_string())
            }

            _ => DbError::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<CoreError> for DbError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => DbError::Validation(e),
            other => DbError::Serialization(other.to_string()),
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_storage_failures() {
        assert!(DbError::from(sqlx::Error::PoolClosed).is_storage_unavailable());
        assert!(DbError::from(sqlx::Error::PoolTimedOut).is_storage_unavailable());
        assert!(!DbError::from(sqlx::Error::RowNotFound).is_storage_unavailable());
    }

    #[test]
    fn test_core_validation_stays_validation() {
        let err: DbError = CoreError::Validation(ValidationError::Required {
            field: "sku".to_string(),
        })
        .into();
        assert!(matches!(err, DbError::Validation(_)));

        let err: DbError = CoreError::UnknownKind("TRANSFER".to_string()).into();
        assert!(matches!(err, DbError::Serialization(_)));
    }
}
