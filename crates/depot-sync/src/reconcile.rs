//! # Reconciliation
//!
//! Overwrites the inventory mirror with the remote's authoritative snapshot.
//! This is where remote-side corrections (stock floors, another device's
//! edits) become visible. It never merges.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use depot_db::repository::meta::KEY_LAST_RECONCILED_AT;
use depot_db::Database;

use crate::error::SyncResult;
use crate::remote::RemoteClient;

/// Result of one refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Items in the remote snapshot.
    pub fetched: usize,
    /// Mirror rows afterwards, including rows created for queued intents.
    pub rows: i64,
    pub fetched_at: DateTime<Utc>,
}

/// Pulls remote inventory into the mirror.
#[derive(Clone)]
pub struct Reconciler {
    db: Database,
    remote: Arc<dyn RemoteClient>,
}

impl Reconciler {
    pub fn new(db: Database, remote: Arc<dyn RemoteClient>) -> Self {
        Reconciler { db, remote }
    }

    /// Fetches the full snapshot and replaces the mirror with it.
    ///
    /// Intents still queued keep their optimistic effect on top of the
    /// snapshot. On any failure the mirror is left as it was, and so is the
    /// staleness mark.
    pub async fn refresh(&self) -> SyncResult<RefreshReport> {
        let meta = self.db.meta();
        let stale_mark = meta.mirror_stale_mark().await?;

        debug!(?stale_mark, "Fetching inventory snapshot");
        let items = self.remote.fetch_inventory().await?;
        let fetched_at = Utc::now();

        let rows = self.db.mirror().replace_all(&items).await?;
        meta.set_timestamp(KEY_LAST_RECONCILED_AT, fetched_at).await?;

        if let Some(mark) = stale_mark {
            if !meta.clear_mirror_stale(mark).await? {
                debug!("Intent settled during fetch, mirror stays stale");
            }
        }

        info!(fetched = items.len(), rows, "Mirror reconciled");

        Ok(RefreshReport {
            fetched: items.len(),
            rows,
            fetched_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RemoteError, SyncError};
    use crate::test_support::{item, ScriptedRemote};
    use depot_core::{InboundReceipt, TransactionPayload};
    use depot_db::DbConfig;

    #[tokio::test]
    async fn test_refresh_overwrites_mirror() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.mirror().replace_all(&[item("A1", 50), item("OLD", 1)]).await.unwrap();

        let remote = Arc::new(ScriptedRemote::new().with_inventory(vec![item("A1", 7)]));
        let report = Reconciler::new(db.clone(), remote).refresh().await.unwrap();

        assert_eq!(report.fetched, 1);
        assert_eq!(report.rows, 1);
        assert_eq!(db.mirror().get("A1").await.unwrap().unwrap().stock, 7);
        assert!(db.mirror().get("OLD").await.unwrap().is_none());
        assert!(db
            .meta()
            .get_timestamp(KEY_LAST_RECONCILED_AT)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_refresh_keeps_queued_effects() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.queue()
            .enqueue(&TransactionPayload::Inbound(InboundReceipt::new("A1", 4)))
            .await
            .unwrap();

        let remote = Arc::new(ScriptedRemote::new().with_inventory(vec![item("A1", 10)]));
        Reconciler::new(db.clone(), remote).refresh().await.unwrap();

        assert_eq!(db.mirror().get("A1").await.unwrap().unwrap().stock, 14);
    }

    #[tokio::test]
    async fn test_refresh_clears_stale_mark() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.meta().mark_mirror_stale().await.unwrap();

        let remote = Arc::new(ScriptedRemote::new().with_inventory(vec![item("A1", 7)]));
        Reconciler::new(db.clone(), remote).refresh().await.unwrap();

        assert_eq!(db.meta().mirror_stale_mark().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_mirror() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.mirror().replace_all(&[item("A1", 50)]).await.unwrap();
        db.meta().mark_mirror_stale().await.unwrap();

        let remote = Arc::new(ScriptedRemote::new());
        remote.set_reachable(false);

        let err = Reconciler::new(db.clone(), remote).refresh().await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(RemoteError::Network(_))));
        assert_eq!(db.mirror().get("A1").await.unwrap().unwrap().stock, 50);
        assert_eq!(db.meta().mirror_stale_mark().await.unwrap(), Some(1));
    }
}
