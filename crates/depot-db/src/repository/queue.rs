//! # Queue Repository
//!
//! The durable, ordered write-ahead queue.
//!
//! ## Write-Ahead Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Write-Ahead Queue                                    │
//! │                                                                         │
//! │  OPERATOR ACTION (e.g. ship 5 × A1)                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. INSERT INTO pending_transactions (kind, payload, ...)      │   │
//! │  │                                                                 │   │
//! │  │  2. UPSERT mirror_products SET stock = stock - 5               │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT (fsync) ← Both or neither                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            SYNC ENGINE (depot-sync)                             │   │
//! │  │                                                                 │   │
//! │  │  head() → mark_syncing(head) → submit                          │   │
//! │  │     ├── ok        → mark_synced   (row deleted)                 │   │
//! │  │     └── failure   → mark_failed   (row stays at the head)       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • An acknowledged intent is never lost (it's in local DB)             │
//! │  • No intent exists without its optimistic effect                      │
//! │  • Only the head can be in flight, and only one at a time              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::meta::bump_mirror_stale;
use crate::repository::mirror::apply_effect;
use depot_core::{PendingTransaction, TransactionPayload, TransactionStatus};

const ENTITY: &str = "PendingTransaction";

/// Outcome of a failed attempt, written by [`QueueRepository::mark_failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    /// The retry count after this attempt.
    pub retry_count: i64,
    /// Stop automatic retries until the operator acts.
    pub terminal: bool,
    pub error: String,
    /// When the next automatic attempt may start. `None` for terminal rows.
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// Repository for the write-ahead queue.
///
/// Every mutation of a queue row goes through this type.
#[derive(Debug, Clone)]
pub struct QueueRepository {
    pool: SqlitePool,
}

impl QueueRepository {
    /// Creates a new QueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        QueueRepository { pool }
    }

    // =========================================================================
    // Append
    // =========================================================================

    /// Appends an intent and applies its optimistic mirror effect.
    ///
    /// ## Arguments
    /// * `payload` - The typed body; validated before anything is written
    ///
    /// ## Returns
    /// * `Ok(PendingTransaction)` - The committed PENDING row
    /// * `Err(DbError::Validation)` - Payload rejected, nothing written
    /// * `Err(DbError::StorageUnavailable)` - Store unusable, nothing written
    pub async fn enqueue(&self, payload: &TransactionPayload) -> DbResult<PendingTransaction> {
        payload.validate()?;

        let body = payload.to_json()?;
        let effect = payload.mirror_effect();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, PendingTransaction>(
            r#"
            INSERT INTO pending_transactions (
                kind, payload, status, retry_count, terminal, created_at, updated_at
            ) VALUES (?1, ?2, 'pending', 0, 0, ?3, ?3)
            RETURNING *
            "#,
        )
        .bind(payload.kind())
        .bind(&body)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        apply_effect(&mut *tx, &effect, now).await?;

        tx.commit().await?;

        info!(
            id = row.id,
            kind = %row.kind,
            sku = %effect.sku(),
            "Intent enqueued"
        );

        Ok(row)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Returns every queued intent in creation order.
    pub async fn list_pending(&self) -> DbResult<Vec<PendingTransaction>> {
        let rows = sqlx::query_as::<_, PendingTransaction>(
            "SELECT * FROM pending_transactions ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Returns the oldest queued intent, if any.
    pub async fn head(&self) -> DbResult<Option<PendingTransaction>> {
        let row = sqlx::query_as::<_, PendingTransaction>(
            "SELECT * FROM pending_transactions ORDER BY id ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Gets a queued intent by id.
    pub async fn get(&self, id: i64) -> DbResult<Option<PendingTransaction>> {
        let row = sqlx::query_as::<_, PendingTransaction>(
            "SELECT * FROM pending_transactions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Counts every intent not yet confirmed by the remote.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_transactions")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Counts FAILED intents (retrying and terminal).
    pub async fn count_failed(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pending_transactions WHERE status = 'failed'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Counts FAILED intents that wait for a manual decision.
    pub async fn count_needs_attention(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pending_transactions WHERE status = 'failed' AND terminal = 1",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    // =========================================================================
    // Attempt Lifecycle
    // =========================================================================

    /// Moves the queue head to SYNCING.
    ///
    /// The guard lives in the UPDATE itself: the row must be the head, must
    /// not be terminal, and no other row may already be SYNCING.
    ///
    /// ## Returns
    /// * `Ok(PendingTransaction)` - The row, now SYNCING
    /// * `Err(DbError::OrderingViolation)` - Not the head, or another row in flight
    /// * `Err(DbError::InvalidState)` - The row is terminal or already SYNCING
    pub async fn mark_syncing(&self, id: i64) -> DbResult<PendingTransaction> {
        let row = sqlx::query_as::<_, PendingTransaction>(
            r#"
            UPDATE pending_transactions SET
                status = 'syncing',
                updated_at = ?2
            WHERE id = ?1
              AND status IN ('pending', 'failed')
              AND terminal = 0
              AND id = (SELECT MIN(id) FROM pending_transactions)
              AND NOT EXISTS (
                  SELECT 1 FROM pending_transactions WHERE status = 'syncing'
              )
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            debug!(id, retry_count = row.retry_count, "Intent marked syncing");
            return Ok(row);
        }

        match self.get(id).await? {
            None => Err(DbError::not_found(ENTITY, id)),
            Some(existing) if existing.terminal => Err(DbError::InvalidState(format!(
                "intent {} is terminal and needs retry_now first",
                id
            ))),
            Some(existing) if existing.status == TransactionStatus::Syncing => Err(
                DbError::InvalidState(format!("intent {} is already syncing", id)),
            ),
            Some(_) => {
                error!(id, "Refusing to start an intent out of queue order");
                Err(DbError::OrderingViolation(format!(
                    "intent {} is not the queue head or another intent is in flight",
                    id
                )))
            }
        }
    }

    /// Removes a SYNCING intent after the remote confirmed it and marks the
    /// mirror stale in the same transaction.
    pub async fn mark_synced(&self, id: i64) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "DELETE FROM pending_transactions WHERE id = ?1 AND status = 'syncing'",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(self.state_error(id, "syncing").await);
        }

        bump_mirror_stale(&mut *tx, Utc::now()).await?;
        tx.commit().await?;

        debug!(id, "Intent synced and removed");
        Ok(())
    }

    /// Records a failed attempt on a SYNCING intent.
    ///
    /// The row keeps its position and blocks everything behind it.
    pub async fn mark_failed(
        &self,
        id: i64,
        failure: &AttemptFailure,
    ) -> DbResult<PendingTransaction> {
        let row = sqlx::query_as::<_, PendingTransaction>(
            r#"
            UPDATE pending_transactions SET
                status = 'failed',
                retry_count = ?2,
                terminal = ?3,
                last_error = ?4,
                next_attempt_at = ?5,
                updated_at = ?6
            WHERE id = ?1 AND status = 'syncing'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(failure.retry_count)
        .bind(failure.terminal)
        .bind(&failure.error)
        .bind(failure.next_attempt_at)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                warn!(
                    id,
                    retry_count = row.retry_count,
                    terminal = row.terminal,
                    error = %failure.error,
                    "Intent attempt failed"
                );
                Ok(row)
            }
            None => Err(self.state_error(id, "syncing").await),
        }
    }

    // =========================================================================
    // Manual Resolution
    // =========================================================================

    /// Puts a FAILED intent back to PENDING so the next drain tries it now.
    ///
    /// Clears the terminal marker and the backoff schedule. `retry_count` is
    /// kept so the history stays visible.
    pub async fn retry_now(&self, id: i64) -> DbResult<PendingTransaction> {
        let row = sqlx::query_as::<_, PendingTransaction>(
            r#"
            UPDATE pending_transactions SET
                status = 'pending',
                terminal = 0,
                next_attempt_at = NULL,
                updated_at = ?2
            WHERE id = ?1 AND status = 'failed'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                info!(id, retry_count = row.retry_count, "Intent queued for immediate retry");
                Ok(row)
            }
            None => Err(self.state_error(id, "failed").await),
        }
    }

    /// Drops a FAILED intent without contacting the remote.
    ///
    /// Its optimistic mirror effect stays until the next reconcile replaces
    /// the mirror; the staleness mark written with the delete guarantees one.
    pub async fn discard(&self, id: i64) -> DbResult<PendingTransaction> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, PendingTransaction>(
            "DELETE FROM pending_transactions WHERE id = ?1 AND status = 'failed' RETURNING *",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            Some(row) => {
                bump_mirror_stale(&mut *tx, Utc::now()).await?;
                tx.commit().await?;
                warn!(id, kind = %row.kind, "Intent discarded by operator");
                Ok(row)
            }
            None => {
                tx.rollback().await?;
                Err(self.state_error(id, "failed").await)
            }
        }
    }

    /// Returns intents left SYNCING by a crashed process to PENDING.
    ///
    /// Must run before the first drain. The resubmission carries the same
    /// reference token, so a remote that de-duplicates sees a replay.
    pub async fn recover_in_flight(&self) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE pending_transactions SET
                status = 'pending',
                updated_at = ?1
            WHERE status = 'syncing'
            "#,
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            warn!(recovered, "Recovered in-flight intents from previous run");
        }

        Ok(recovered)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn state_error(&self, id: i64, expected: &str) -> DbError {
        match self.get(id).await {
            Ok(Some(row)) => DbError::InvalidState(format!(
                "intent {} is {}, expected {}",
                id, row.status, expected
            )),
            Ok(None) => DbError::not_found(ENTITY, id),
            Err(e) => e,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use depot_core::{
        InboundReceipt, IntentState, OutboundShipment, StockAdjustment, TransactionKind,
    };

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn outbound(sku: &str, qty: i64) -> TransactionPayload {
        TransactionPayload::Outbound(OutboundShipment::new(sku, qty))
    }

    fn transient(retry_count: i64) -> AttemptFailure {
        AttemptFailure {
            retry_count,
            terminal: false,
            error: "timeout".to_string(),
            next_attempt_at: Some(Utc::now() + Duration::seconds(2)),
        }
    }

    #[tokio::test]
    async fn test_enqueue_orders_by_creation() {
        let db = test_db().await;
        let queue = db.queue();

        let first = queue.enqueue(&outbound("A1", 1)).await.unwrap();
        let second = queue.enqueue(&outbound("A1", 2)).await.unwrap();
        let third = queue.enqueue(&outbound("B2", 3)).await.unwrap();

        assert!(first.id < second.id && second.id < third.id);
        assert_eq!(first.status, TransactionStatus::Pending);
        assert_eq!(first.retry_count, 0);

        let ids: Vec<i64> = queue.list_pending().await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
        assert_eq!(queue.head().await.unwrap().unwrap().id, first.id);
        assert_eq!(queue.count_pending().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_enqueue_applies_optimistic_effect() {
        let db = test_db().await;

        db.queue()
            .enqueue(&TransactionPayload::Inbound(InboundReceipt::new("A1", 12)))
            .await
            .unwrap();
        db.queue().enqueue(&outbound("A1", 5)).await.unwrap();

        let a1 = db.mirror().get("A1").await.unwrap().unwrap();
        assert_eq!(a1.stock, 7);
        assert_eq!(a1.name, "A1");

        db.queue()
            .enqueue(&TransactionPayload::Adjust(StockAdjustment::new("A1", 40, "count")))
            .await
            .unwrap();
        assert_eq!(db.mirror().get("A1").await.unwrap().unwrap().stock, 40);
    }

    #[tokio::test]
    async fn test_invalid_payload_writes_nothing() {
        let db = test_db().await;

        let err = db.queue().enqueue(&outbound("A1", 0)).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));

        assert_eq!(db.queue().count_pending().await.unwrap(), 0);
        assert!(db.mirror().get("A1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enqueue_on_closed_store_fails_loudly() {
        let db = test_db().await;
        db.close().await;

        let err = db.queue().enqueue(&outbound("A1", 1)).await.unwrap_err();
        assert!(err.is_storage_unavailable());
    }

    #[tokio::test]
    async fn test_mark_syncing_only_admits_the_head() {
        let db = test_db().await;
        let queue = db.queue();
        let first = queue.enqueue(&outbound("A1", 1)).await.unwrap();
        let second = queue.enqueue(&outbound("A1", 1)).await.unwrap();

        let err = queue.mark_syncing(second.id).await.unwrap_err();
        assert!(matches!(err, DbError::OrderingViolation(_)));

        let syncing = queue.mark_syncing(first.id).await.unwrap();
        assert_eq!(syncing.status, TransactionStatus::Syncing);

        let err = queue.mark_syncing(first.id).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidState(_)));

        let err = queue.mark_syncing(9_999).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_mark_synced_removes_row_and_ids_are_not_reused() {
        let db = test_db().await;
        let queue = db.queue();
        let first = queue.enqueue(&outbound("A1", 1)).await.unwrap();

        queue.mark_syncing(first.id).await.unwrap();
        queue.mark_synced(first.id).await.unwrap();
        assert!(queue.get(first.id).await.unwrap().is_none());

        let next = queue.enqueue(&outbound("A1", 1)).await.unwrap();
        assert!(next.id > first.id);

        let err = queue.mark_synced(next.id).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_synced_and_discarded_rows_mark_mirror_stale() {
        let db = test_db().await;
        let queue = db.queue();
        let first = queue.enqueue(&outbound("A1", 1)).await.unwrap();
        let second = queue.enqueue(&outbound("A1", 1)).await.unwrap();
        assert_eq!(db.meta().mirror_stale_mark().await.unwrap(), None);

        queue.mark_syncing(first.id).await.unwrap();
        queue.mark_synced(first.id).await.unwrap();
        assert_eq!(db.meta().mirror_stale_mark().await.unwrap(), Some(1));

        queue.mark_syncing(second.id).await.unwrap();
        queue.mark_failed(second.id, &transient(1)).await.unwrap();
        assert_eq!(db.meta().mirror_stale_mark().await.unwrap(), Some(1));

        queue.discard(second.id).await.unwrap();
        assert_eq!(db.meta().mirror_stale_mark().await.unwrap(), Some(2));

        // A rejected discard writes nothing.
        assert!(queue.discard(second.id).await.is_err());
        assert_eq!(db.meta().mirror_stale_mark().await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_failed_row_blocks_and_can_be_retried() {
        let db = test_db().await;
        let queue = db.queue();
        let first = queue.enqueue(&outbound("A1", 1)).await.unwrap();
        let second = queue.enqueue(&outbound("A1", 1)).await.unwrap();

        queue.mark_syncing(first.id).await.unwrap();
        let failed = queue.mark_failed(first.id, &transient(1)).await.unwrap();
        assert_eq!(failed.state(), IntentState::Retrying);
        assert_eq!(queue.count_failed().await.unwrap(), 1);

        // Still the head: the next intent cannot jump ahead.
        assert_eq!(queue.head().await.unwrap().unwrap().id, first.id);
        assert!(matches!(
            queue.mark_syncing(second.id).await.unwrap_err(),
            DbError::OrderingViolation(_)
        ));

        let retried = queue.retry_now(first.id).await.unwrap();
        assert_eq!(retried.status, TransactionStatus::Pending);
        assert_eq!(retried.retry_count, 1);
        assert!(retried.next_attempt_at.is_none());
    }

    #[tokio::test]
    async fn test_terminal_row_needs_manual_action() {
        let db = test_db().await;
        let queue = db.queue();
        let first = queue.enqueue(&outbound("A1", 1)).await.unwrap();
        queue.enqueue(&outbound("A1", 1)).await.unwrap();

        queue.mark_syncing(first.id).await.unwrap();
        let rejected = AttemptFailure {
            retry_count: 0,
            terminal: true,
            error: "HTTP 400: unknown sku".to_string(),
            next_attempt_at: None,
        };
        let row = queue.mark_failed(first.id, &rejected).await.unwrap();
        assert_eq!(row.state(), IntentState::NeedsAttention);
        assert_eq!(row.retry_count, 0);
        assert_eq!(queue.count_needs_attention().await.unwrap(), 1);

        assert!(matches!(
            queue.mark_syncing(first.id).await.unwrap_err(),
            DbError::InvalidState(_)
        ));

        let dropped = queue.discard(first.id).await.unwrap();
        assert_eq!(dropped.kind, TransactionKind::Outbound);
        assert_eq!(queue.count_pending().await.unwrap(), 1);
        assert_eq!(queue.count_needs_attention().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_discard_and_retry_require_failed_status() {
        let db = test_db().await;
        let row = db.queue().enqueue(&outbound("A1", 1)).await.unwrap();

        assert!(matches!(
            db.queue().discard(row.id).await.unwrap_err(),
            DbError::InvalidState(_)
        ));
        assert!(matches!(
            db.queue().retry_now(row.id).await.unwrap_err(),
            DbError::InvalidState(_)
        ));
        assert!(matches!(
            db.queue().discard(404).await.unwrap_err(),
            DbError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_recover_in_flight_after_crash() {
        let db = test_db().await;
        let queue = db.queue();
        let row = queue.enqueue(&outbound("A1", 1)).await.unwrap();
        queue.mark_syncing(row.id).await.unwrap();

        assert_eq!(queue.recover_in_flight().await.unwrap(), 1);
        let recovered = queue.get(row.id).await.unwrap().unwrap();
        assert_eq!(recovered.status, TransactionStatus::Pending);

        assert_eq!(queue.recover_in_flight().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_queue_survives_restart() {
        let path = std::env::temp_dir().join(format!("depot-durability-{}.db", uuid::Uuid::new_v4()));

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let a = db.queue().enqueue(&outbound("A1", 1)).await.unwrap();
        let b = db.queue().enqueue(&outbound("A1", 2)).await.unwrap();
        db.close().await;

        let reopened = Database::new(DbConfig::new(&path)).await.unwrap();
        let rows = reopened.queue().list_pending().await.unwrap();
        assert_eq!(rows.iter().map(|t| t.id).collect::<Vec<_>>(), vec![a.id, b.id]);
        assert_eq!(rows[1].payload, b.payload);
        assert_eq!(reopened.mirror().get("A1").await.unwrap().unwrap().stock, -3);
        reopened.close().await;

        let _ = std::fs::remove_file(&path);
    }
}
