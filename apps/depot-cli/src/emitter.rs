//! # Console Event Emitter
//!
//! Prints sync agent events to stdout, one JSON object per line, so `depot run`
//! can be piped into other tools.
//!
//! ```text
//! {"event":"status","isOnline":true,"isSyncing":false,"pendingCount":0,...}
//! {"event":"progress","pending":2,"synced":1}
//! {"event":"error","message":"intent 4 needs attention: ...","retryable":false}
//! ```

use serde::Serialize;
use tracing::{debug, error, warn};

use depot_core::SyncStatus;
use depot_sync::SyncEventEmitter;

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum ConsoleEvent<'a> {
    Status(StatusLine<'a>),
    Progress { pending: i64, synced: u32 },
    Error { message: &'a str, retryable: bool },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusLine<'a> {
    is_online: bool,
    is_syncing: bool,
    pending_count: i64,
    failed_count: i64,
    needs_attention_count: i64,
    last_synced_at: Option<String>,
    last_error: Option<&'a str>,
}

impl<'a> From<&'a SyncStatus> for StatusLine<'a> {
    fn from(status: &'a SyncStatus) -> Self {
        StatusLine {
            is_online: status.is_online,
            is_syncing: status.is_syncing,
            pending_count: status.pending_count,
            failed_count: status.failed_count,
            needs_attention_count: status.needs_attention_count,
            last_synced_at: status.last_synced_at.map(|at| at.to_rfc3339()),
            last_error: status.last_error.as_deref(),
        }
    }
}

/// Stdout sync event emitter.
#[derive(Debug, Default, Clone)]
pub struct ConsoleEmitter;

impl ConsoleEmitter {
    pub fn new() -> Self {
        ConsoleEmitter
    }

    fn print(&self, event: &ConsoleEvent<'_>) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => error!(?e, "Failed to encode sync event"),
        }
    }
}

impl SyncEventEmitter for ConsoleEmitter {
    fn emit_status(&self, status: &SyncStatus) {
        self.print(&ConsoleEvent::Status(status.into()));
        debug!(pending = status.pending_count, online = status.is_online, "Emitted status");
    }

    fn emit_progress(&self, pending: i64, synced: u32) {
        self.print(&ConsoleEvent::Progress { pending, synced });
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        self.print(&ConsoleEvent::Error { message, retryable });
        warn!(message, retryable, "Emitted sync error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line_shape() {
        let status = SyncStatus {
            is_online: true,
            pending_count: 3,
            needs_attention_count: 1,
            last_error: Some("Rejected (400): unknown sku".to_string()),
            ..Default::default()
        };

        let json = serde_json::to_value(ConsoleEvent::Status((&status).into())).unwrap();
        assert_eq!(json["event"], "status");
        assert_eq!(json["isOnline"], true);
        assert_eq!(json["pendingCount"], 3);
        assert_eq!(json["needsAttentionCount"], 1);
        assert_eq!(json["lastError"], "Rejected (400): unknown sku");
    }

    #[test]
    fn test_error_line_shape() {
        let json = serde_json::to_value(ConsoleEvent::Error {
            message: "intent 4 needs attention",
            retryable: false,
        })
        .unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["retryable"], false);
    }
}
