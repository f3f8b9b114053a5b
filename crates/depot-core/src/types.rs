//! # Domain Types
//!
//! Queue, mirror and status types used throughout Depot.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────────┐   ┌─────────────────┐   ┌─────────────────┐   │
//! │  │ PendingTransaction  │   │  MirrorProduct  │   │    SyncState    │   │
//! │  │  ─────────────────  │   │  ─────────────  │   │  ─────────────  │   │
//! │  │  id (autoincrement) │   │  sku (PK)       │   │  is_online      │   │
//! │  │  kind               │   │  name           │   │  is_syncing     │   │
//! │  │  payload (JSON)     │   │  stock          │   │  pending_count  │   │
//! │  │  status             │   │  location       │   └─────────────────┘   │
//! │  │  retry_count        │   │  updated_at     │                         │
//! │  │  terminal           │   └─────────────────┘                         │
//! │  └─────────────────────┘                                               │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌───────────────────┐   ┌─────────────────┐     │
//! │  │ TransactionKind │   │ TransactionStatus │   │   IntentState   │     │
//! │  │  ─────────────  │   │  ───────────────  │   │  ─────────────  │     │
//! │  │  Inbound        │   │  Pending          │   │  Pending        │     │
//! │  │  Outbound       │   │  Syncing          │   │  Syncing        │     │
//! │  │  Adjust         │   │  Failed           │   │  Retrying       │     │
//! │  │  Damage         │   └───────────────────┘   │  NeedsAttention │     │
//! │  └─────────────────┘                           └─────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Queue Row Lifecycle
//! ```text
//!   enqueue ──► PENDING ──► SYNCING ──► (row deleted = SYNCED)
//!                  ▲           │
//!                  │           ▼
//!              retry_now ◄── FAILED ──► discard (row deleted)
//! ```
//!
//! A FAILED row is either *retrying* (transient failure, `next_attempt_at` set)
//! or *terminal* (deterministic rejection or retry limit reached). Both keep
//! their queue position and block everything behind them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::payload::TransactionPayload;

// =============================================================================
// Transaction Kind
// =============================================================================

/// The four warehouse movements that can be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    /// Goods received from a supplier.
    Inbound,
    /// Goods shipped out of the warehouse.
    Outbound,
    /// Stock count correction (absolute).
    Adjust,
    /// Damaged goods written off.
    Damage,
}

impl TransactionKind {
    /// All kinds, in display order.
    pub const ALL: [TransactionKind; 4] = [
        TransactionKind::Inbound,
        TransactionKind::Outbound,
        TransactionKind::Adjust,
        TransactionKind::Damage,
    ];

    /// Returns the stored/wire name of this kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Inbound => "INBOUND",
            TransactionKind::Outbound => "OUTBOUND",
            TransactionKind::Adjust => "ADJUST",
            TransactionKind::Damage => "DAMAGE",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::UnknownKind(s.to_string()))
    }
}

// =============================================================================
// Transaction Status
// =============================================================================

/// Persisted status of a queue row.
///
/// There is no `Synced` variant: a confirmed intent is deleted from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Waiting for its turn.
    Pending,
    /// Currently submitted to the remote. At most one row at a time.
    Syncing,
    /// Last attempt failed; see `terminal` on the row.
    Failed,
}

impl Default for TransactionStatus {
    fn default() -> Self {
        TransactionStatus::Pending
    }
}

impl TransactionStatus {
    /// Returns the stored name of this status.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Syncing => "syncing",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Intent State (derived)
// =============================================================================

/// How a queue row should be presented to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum IntentState {
    Pending,
    Syncing,
    /// Transient failure, will be retried automatically.
    Retrying,
    /// Needs a manual `retry_now` or `discard`.
    NeedsAttention,
}

// =============================================================================
// Pending Transaction
// =============================================================================

/// A write intent awaiting remote application.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PendingTransaction {
    /// Local, monotonically increasing id. Queue order = id order.
    pub id: i64,

    /// Which remote endpoint this intent goes to.
    pub kind: TransactionKind,

    /// The JSON body the remote endpoint expects (opaque to the queue).
    pub payload: String,

    pub status: TransactionStatus,

    /// Number of transient failures so far.
    pub retry_count: i64,

    /// FAILED and excluded from automatic retry.
    pub terminal: bool,

    /// Message from the last failed attempt.
    pub last_error: Option<String>,

    /// Earliest time a retrying intent may be attempted again.
    #[ts(as = "Option<String>")]
    pub next_attempt_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl PendingTransaction {
    /// Decodes the stored body into its typed payload.
    pub fn decode(&self) -> CoreResult<TransactionPayload> {
        TransactionPayload::from_json(self.kind, &self.payload)
    }

    /// Idempotency token carried in the payload's `reference` field.
    ///
    /// Stable across retries and restarts: it only depends on the device and
    /// the row id, and ids are never reused.
    pub fn reference(&self, device_id: &str) -> String {
        format!("{}:{}", device_id, self.id)
    }

    /// Derived presentation state.
    pub fn state(&self) -> IntentState {
        match self.status {
            TransactionStatus::Pending => IntentState::Pending,
            TransactionStatus::Syncing => IntentState::Syncing,
            TransactionStatus::Failed if self.terminal => IntentState::NeedsAttention,
            TransactionStatus::Failed => IntentState::Retrying,
        }
    }

    /// Whether the engine may attempt this row at `now`.
    ///
    /// Terminal rows are never due; retrying rows become due once their
    /// backoff has elapsed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            TransactionStatus::Pending => true,
            TransactionStatus::Syncing => false,
            TransactionStatus::Failed if self.terminal => false,
            TransactionStatus::Failed => self.next_attempt_at.map_or(true, |at| at <= now),
        }
    }
}

// =============================================================================
// Mirror Product
// =============================================================================

/// A cached inventory row. Not authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MirrorProduct {
    pub sku: String,
    pub name: String,

    /// Remote stock plus the effects of intents still in the queue.
    pub stock: i64,

    /// Bin / shelf location, if the sheet has one.
    pub location: Option<String>,

    /// Freshness marker: last reconcile or optimistic touch.
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// One row of an authoritative inventory snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub sku: String,
    pub name: String,
    pub stock: i64,
    #[serde(default)]
    pub location: Option<String>,
}

// =============================================================================
// Sync State
// =============================================================================

/// What the status indicator shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncState {
    pub is_online: bool,
    pub is_syncing: bool,
    pub pending_count: i64,
}

/// Full sync status, a superset of [`SyncState`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,

    /// Every row still in the queue, including failed ones.
    pub pending_count: i64,

    pub failed_count: i64,
    pub needs_attention_count: i64,

    #[ts(as = "Option<String>")]
    pub last_synced_at: Option<DateTime<Utc>>,

    pub last_error: Option<String>,
}

impl SyncStatus {
    /// Narrows to the indicator view.
    pub fn state(&self) -> SyncState {
        SyncState {
            is_online: self.is_online,
            is_syncing: self.is_syncing,
            pending_count: self.pending_count,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn row(status: TransactionStatus, terminal: bool) -> PendingTransaction {
        let now = Utc::now();
        PendingTransaction {
            id: 7,
            kind: TransactionKind::Outbound,
            payload: r#"{"sku":"A1","quantity":5}"#.to_string(),
            status,
            retry_count: 0,
            terminal,
            last_error: None,
            next_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_kind_parse_and_display() {
        assert_eq!("INBOUND".parse::<TransactionKind>().unwrap(), TransactionKind::Inbound);
        assert_eq!("damage".parse::<TransactionKind>().unwrap(), TransactionKind::Damage);
        assert_eq!(TransactionKind::Adjust.to_string(), "ADJUST");
        assert!(matches!(
            "TRANSFER".parse::<TransactionKind>(),
            Err(CoreError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_kind_serde_uses_wire_names() {
        let json = serde_json::to_string(&TransactionKind::Outbound).unwrap();
        assert_eq!(json, "\"OUTBOUND\"");
    }

    #[test]
    fn test_intent_state() {
        assert_eq!(row(TransactionStatus::Pending, false).state(), IntentState::Pending);
        assert_eq!(row(TransactionStatus::Syncing, false).state(), IntentState::Syncing);
        assert_eq!(row(TransactionStatus::Failed, false).state(), IntentState::Retrying);
        assert_eq!(row(TransactionStatus::Failed, true).state(), IntentState::NeedsAttention);
    }

    #[test]
    fn test_is_due_respects_backoff() {
        let now = Utc::now();
        let mut tx = row(TransactionStatus::Failed, false);
        tx.next_attempt_at = Some(now + Duration::seconds(30));
        assert!(!tx.is_due(now));
        assert!(tx.is_due(now + Duration::seconds(31)));

        assert!(!row(TransactionStatus::Failed, true).is_due(now));
        assert!(row(TransactionStatus::Pending, false).is_due(now));
    }

    #[test]
    fn test_reference_token() {
        let tx = row(TransactionStatus::Pending, false);
        assert_eq!(tx.reference("dock-3"), "dock-3:7");
    }

    #[test]
    fn test_decode_stored_payload() {
        let tx = row(TransactionStatus::Pending, false);
        let payload = tx.decode().unwrap();
        assert_eq!(payload.kind(), TransactionKind::Outbound);
        assert_eq!(payload.sku(), "A1");
    }
}
