//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Remote        │  │     Local store         │ │
//! │  │                 │  │  (RemoteError)  │  │                         │ │
//! │  │  InvalidConfig  │  │  Network        │  │  Database(DbError)      │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  Payload(CoreError)     │ │
//! │  │  ConfigLoad/Save│  │  Server/Rejected│  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  RemoteError::retry_class():                                            │
//! │    Retryable  → backoff, the intent stays at the head                   │
//! │    Permanent  → terminal FAILED, waits for the operator                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use depot_core::CoreError;
use depot_db::DbError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Remote Errors
// =============================================================================

/// Retry policy class for a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Try again later with backoff.
    Retryable,
    /// The remote will give the same answer every time.
    Permanent,
}

/// A failed call to the remote API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Could not reach the remote (DNS, refused, reset).
    #[error("Network error: {0}")]
    Network(String),

    /// No answer within the request timeout.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// HTTP status the remote may recover from (5xx, 408, 425, 429).
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Deterministic rejection: other 4xx, or `success: false` in the body.
    #[error("Rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// Builds the error for a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            408 | 425 | 429 | 500..=599 => RemoteError::Server { status, message },
            400..=499 => RemoteError::Rejected { status, message },
            // Redirects and informational answers come from whatever sits in
            // front of the remote, not from the remote judging the intent.
            _ => RemoteError::Protocol(format!("unexpected status {}: {}", status, message)),
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            RemoteError::Network(_) | RemoteError::Timeout(_) => RetryClass::Retryable,
            RemoteError::Server { .. } => RetryClass::Retryable,
            // A garbled answer is more likely a proxy or captive portal than a
            // verdict on the intent.
            RemoteError::Protocol(_) => RetryClass::Retryable,
            RemoteError::Rejected { .. } => RetryClass::Permanent,
        }
    }

    /// Returns true if the failure says something about reachability.
    ///
    /// These are fed to the connectivity monitor as offline evidence.
    pub fn is_network(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Timeout(_))
    }
}

// =============================================================================
// Sync Errors
// =============================================================================

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid remote URL.
    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Local Store Errors
    // =========================================================================
    /// The local store refused or failed an operation.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// A queued body could not be decoded or re-encoded.
    #[error("Payload error: {0}")]
    Payload(#[from] CoreError),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// A remote call failed outside of an intent attempt (refresh, probe).
    #[error(transparent)]
    Remote(#[from] RemoteError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Agent is shutting down.
    #[error("Sync agent is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Payload(CoreError::invalid_payload("json", err.to_string()))
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if this error is recoverable and the operation can be retried.
    ///
    /// ## Retryable Errors
    /// - Transient remote failures
    /// - A local store that is temporarily unavailable
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Deterministic rejections
    /// - Shutdown
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.retry_class() == RetryClass::Retryable,
            SyncError::Database(e) => e.is_storage_unavailable(),
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        for status in [408, 425, 429, 500, 502, 503, 504] {
            let err = RemoteError::from_status(status, "busy");
            assert_eq!(err.retry_class(), RetryClass::Retryable, "status {}", status);
        }

        for status in [400, 401, 403, 404, 409, 422] {
            let err = RemoteError::from_status(status, "no");
            assert_eq!(err.retry_class(), RetryClass::Permanent, "status {}", status);
        }

        for status in [100, 301, 302, 307, 308] {
            let err = RemoteError::from_status(status, "portal");
            assert!(matches!(err, RemoteError::Protocol(_)), "status {}", status);
            assert_eq!(err.retry_class(), RetryClass::Retryable, "status {}", status);
        }
    }

    #[test]
    fn test_network_evidence() {
        assert!(RemoteError::Network("refused".into()).is_network());
        assert!(RemoteError::Timeout(10_000).is_network());
        assert!(!RemoteError::from_status(503, "down").is_network());
        assert!(!RemoteError::Protocol("html".into()).is_network());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Remote(RemoteError::Timeout(5)).is_retryable());
        assert!(SyncError::Database(DbError::StorageUnavailable("pool closed".into())).is_retryable());

        assert!(!SyncError::Remote(RemoteError::from_status(400, "bad")).is_retryable());
        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!SyncError::ShuttingDown.is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(SyncError::InvalidUrl("nope".into()).is_config_error());
        assert!(!SyncError::ShuttingDown.is_config_error());
    }
}
