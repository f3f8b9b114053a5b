//! # Intent Commands
//!
//! `receive`, `ship`, `adjust` and `damage` all land here: the intent is
//! queued (mirror updated in the same transaction), then one drain runs
//! unless `--offline` was given.

use serde::Serialize;
use tracing::debug;

use depot_core::TransactionPayload;
use depot_sync::DrainOutcome;

use super::queue::QueueEntry;
use crate::context::AppContext;
use crate::error::ApiError;

/// Result of recording an intent.
#[derive(Debug, Serialize)]
pub struct EnqueueReport {
    /// The intent as it was queued.
    pub intent: QueueEntry,

    /// Whether it is still in the queue after the drain.
    pub queued: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub drain: Option<DrainOutcome>,
}

/// Queues `payload` and, unless `offline`, drains once.
///
/// ## Returns
/// * `Ok(EnqueueReport)` - The intent is durable; remote failures are in `drain`
/// * `Err(ApiError)` - Validation or storage failure; nothing was queued
pub async fn record(
    ctx: &AppContext,
    payload: TransactionPayload,
    offline: bool,
) -> Result<EnqueueReport, ApiError> {
    let queue = ctx.database().queue();
    let row = queue.enqueue(&payload).await?;
    debug!(id = row.id, offline, "Intent recorded");

    let id = row.id;
    let drain = if offline {
        None
    } else {
        Some(ctx.engine().await?.drain().await?)
    };

    Ok(EnqueueReport {
        intent: row.into(),
        queued: queue.get(id).await?.is_some(),
        drain,
    })
}
