//! # Sync Commands
//!
//! `sync` and `refresh` run once and exit. `run` starts the full agent and
//! keeps draining until Ctrl-C.

use std::sync::Arc;

use tracing::info;

use depot_sync::{DrainOutcome, RefreshReport, SyncAgentBuilder};

use crate::context::AppContext;
use crate::emitter::ConsoleEmitter;
use crate::error::ApiError;

/// Drains the queue once.
pub async fn sync(ctx: &AppContext) -> Result<DrainOutcome, ApiError> {
    Ok(ctx.engine().await?.drain().await?)
}

/// Replaces the mirror with the remote snapshot.
pub async fn refresh(ctx: &AppContext) -> Result<RefreshReport, ApiError> {
    Ok(ctx.engine().await?.refresh().await?)
}

/// Runs the sync agent until Ctrl-C, printing agent events as JSON lines.
pub async fn run(ctx: &AppContext) -> Result<(), ApiError> {
    let handle = SyncAgentBuilder::new(ctx.config().clone())
        .with_database(ctx.database().clone())
        .with_remote(ctx.remote()?)
        .with_emitter(Arc::new(ConsoleEmitter::new()))
        .build()?
        .start()
        .await?;

    info!("Sync agent running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to listen for Ctrl-C: {}", e)))?;

    info!("Stopping sync agent...");
    handle.shutdown().await;
    info!("Sync agent stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::intent;
    use crate::test_remote::StubRemote;
    use depot_core::{InventoryItem, OutboundShipment, TransactionPayload};
    use depot_db::{Database, DbConfig};
    use depot_sync::SyncConfig;

    #[tokio::test]
    async fn test_sync_then_refresh() {
        let remote = Arc::new(StubRemote::new());
        remote.set_reachable(false);

        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut config = SyncConfig::default();
        config.device.id = Some("cli".to_string());
        config.sync.reconcile_on_drain = false;
        let ctx = AppContext::with_remote(db, config, remote.clone());

        intent::record(&ctx, TransactionPayload::Outbound(OutboundShipment::new("A1", 2)), false)
            .await
            .unwrap();
        assert_eq!(ctx.database().mirror().get("A1").await.unwrap().unwrap().stock, -2);

        // Backing off: a second sync right away does not resubmit.
        remote.set_reachable(true);
        let outcome = sync(&ctx).await.unwrap();
        assert!(matches!(outcome, DrainOutcome::RetryScheduled { id: 1, .. }));
        assert_eq!(remote.submission_count(), 0);

        *remote.inventory.lock().unwrap() = vec![InventoryItem {
            sku: "A1".to_string(),
            name: "Pallet wrap".to_string(),
            stock: 10,
            location: Some("R1-B2".to_string()),
        }];
        let report = refresh(&ctx).await.unwrap();
        assert_eq!(report.fetched, 1);

        // Queued outbound stays applied on top of the snapshot.
        let row = ctx.database().mirror().get("A1").await.unwrap().unwrap();
        assert_eq!(row.stock, 8);
        assert_eq!(row.location.as_deref(), Some("R1-B2"));
    }
}
