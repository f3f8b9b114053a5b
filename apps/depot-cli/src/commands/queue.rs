//! # Queue Commands
//!
//! Status, queue listing and manual resolution of FAILED intents.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use depot_core::{IntentState, PendingTransaction, SyncStatus};
use depot_sync::DrainOutcome;

use crate::context::AppContext;
use crate::error::ApiError;

/// Upper bound for the reachability check behind `status`.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// A queued intent with its derived state.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    #[serde(flatten)]
    pub row: PendingTransaction,
    pub state: IntentState,
}

impl From<PendingTransaction> for QueueEntry {
    fn from(row: PendingTransaction) -> Self {
        let state = row.state();
        QueueEntry { row, state }
    }
}

/// Result of `retry` / `discard`.
#[derive(Debug, Serialize)]
pub struct ResolveReport {
    pub intent: QueueEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drain: Option<DrainOutcome>,
}

/// Builds the sync status, probing the remote unless `offline`.
pub async fn status(ctx: &AppContext, offline: bool) -> Result<SyncStatus, ApiError> {
    let is_online = if offline { false } else { probe(ctx).await? };
    Ok(ctx.engine().await?.status(is_online).await?)
}

/// Lists every queued intent in queue order.
pub async fn list(ctx: &AppContext) -> Result<Vec<QueueEntry>, ApiError> {
    let rows = ctx.database().queue().list_pending().await?;
    Ok(rows.into_iter().map(QueueEntry::from).collect())
}

/// Clears a FAILED intent's backoff or terminal mark, then drains.
pub async fn retry(ctx: &AppContext, id: i64, offline: bool) -> Result<ResolveReport, ApiError> {
    let row = ctx.database().queue().retry_now(id).await?;
    info!(id, "Intent released for retry");

    let drain = if offline {
        None
    } else {
        Some(ctx.engine().await?.drain().await?)
    };

    Ok(ResolveReport {
        intent: row.into(),
        drain,
    })
}

/// Drops a FAILED intent, then drains what it was blocking and reconciles.
pub async fn discard(ctx: &AppContext, id: i64, offline: bool) -> Result<ResolveReport, ApiError> {
    let row = ctx.database().queue().discard(id).await?;

    let drain = if offline {
        None
    } else {
        Some(ctx.engine().await?.drain().await?)
    };

    Ok(ResolveReport {
        intent: row.into(),
        drain,
    })
}

async fn probe(ctx: &AppContext) -> Result<bool, ApiError> {
    let remote = ctx.remote()?;
    let online = matches!(tokio::time::timeout(PROBE_TIMEOUT, remote.ping()).await, Ok(Ok(())));
    debug!(online, "Remote probed");
    Ok(online)
}
