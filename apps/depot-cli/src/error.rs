//! # API Error Type
//!
//! Unified error type for CLI commands.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Error Flow                                       │
//! │                                                                         │
//! │  CoreError ─┐                                                           │
//! │  DbError ───┼──► ApiError { code, message } ──► stderr (JSON), exit 1  │
//! │  SyncError ─┘                                                           │
//! │                                                                         │
//! │  Query and pool failures are logged in full; the operator sees a       │
//! │  short message.                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;

use depot_core::CoreError;
use depot_db::DbError;
use depot_sync::{RemoteError, SyncError};

/// Error printed when a command fails.
///
/// ## Serialization
/// ```json
/// {
///   "code": "INVALID_STATE",
///   "message": "Invalid state: intent 3 is pending, expected failed"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for scripts
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,
}

/// Error codes for CLI failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Intent or product not found
    NotFound,

    /// Input validation failed; nothing was queued
    ValidationError,

    /// Retry or discard of an intent that is not FAILED
    InvalidState,

    /// Local store failed
    DatabaseError,

    /// Remote call failed (refresh, one-shot sync)
    RemoteError,

    /// Bad or unreadable configuration
    ConfigError,

    /// Anything else
    Internal,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }

    /// JSON form written to stderr.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":"INTERNAL","message":"{}"}}"#, self.message.replace('"', "'"))
        })
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::InvalidState(msg) => {
                ApiError::new(ErrorCode::InvalidState, format!("Invalid state: {}", msg))
            }
            DbError::Validation(e) => ApiError::validation(e.to_string()),
            DbError::StorageUnavailable(e) => {
                tracing::error!("Storage unavailable: {}", e);
                ApiError::new(ErrorCode::DatabaseError, format!("Storage unavailable: {}", e))
            }
            DbError::QueryFailed(e) => {
                tracing::error!("Database query failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::MigrationFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::OrderingViolation(e) => {
                tracing::error!("Queue ordering violation: {}", e);
                ApiError::internal("Queue ordering violation")
            }
            DbError::Serialization(e) => {
                tracing::error!("Stored value unreadable: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Stored value unreadable")
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => ApiError::validation(e.to_string()),
            other => ApiError::validation(other.to_string()),
        }
    }
}

/// Converts sync errors to API errors.
impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Database(e) => e.into(),
            SyncError::Payload(e) => e.into(),
            SyncError::Remote(e) => e.into(),
            e if e.is_config_error() => ApiError::new(ErrorCode::ConfigError, e.to_string()),
            e => ApiError::internal(e.to_string()),
        }
    }
}

impl From<RemoteError> for ApiError {
    fn from(err: RemoteError) -> Self {
        ApiError::new(ErrorCode::RemoteError, err.to_string())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_maps_to_code() {
        let err: ApiError = DbError::InvalidState("intent 3 is pending, expected failed".into()).into();
        assert_eq!(err.code, ErrorCode::InvalidState);
        assert!(err.message.contains("intent 3"));
    }

    #[test]
    fn test_sync_error_unwraps_inner() {
        let err: ApiError = SyncError::Database(DbError::not_found("Intent", 9)).into();
        assert_eq!(err.code, ErrorCode::NotFound);

        let err: ApiError = SyncError::InvalidConfig("max_retries must be > 0".into()).into();
        assert_eq!(err.code, ErrorCode::ConfigError);

        let err: ApiError = SyncError::Remote(RemoteError::Network("refused".into())).into();
        assert_eq!(err.code, ErrorCode::RemoteError);
    }

    #[test]
    fn test_json_shape() {
        let json = ApiError::validation("quantity must be positive").to_json();
        assert_eq!(json, r#"{"code":"VALIDATION_ERROR","message":"quantity must be positive"}"#);
    }
}
