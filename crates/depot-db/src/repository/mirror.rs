//! # Mirror Repository
//!
//! Read-mostly cache of remote inventory, for offline display.
//!
//! The mirror changes in exactly two ways:
//! - the optimistic effect written in the same transaction as a queue row
//! - a wholesale [`replace_all`](MirrorRepository::replace_all) by reconciliation
//!
//! `replace_all` re-applies the effects of intents still in the queue, so a
//! refresh that lands while the device holds unsent work never shows stock
//! that ignores it.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::DbResult;
use depot_core::{InventoryItem, MirrorEffect, MirrorProduct, TransactionKind, TransactionPayload};

/// Repository for the inventory mirror.
#[derive(Debug, Clone)]
pub struct MirrorRepository {
    pool: SqlitePool,
}

impl MirrorRepository {
    /// Creates a new MirrorRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MirrorRepository { pool }
    }

    /// Gets one product by SKU.
    pub async fn get(&self, sku: &str) -> DbResult<Option<MirrorProduct>> {
        let product = sqlx::query_as::<_, MirrorProduct>(
            "SELECT sku, name, stock, location, updated_at FROM mirror_products WHERE sku = ?1",
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists all mirrored products, sorted by SKU.
    pub async fn list(&self) -> DbResult<Vec<MirrorProduct>> {
        let products = sqlx::query_as::<_, MirrorProduct>(
            "SELECT sku, name, stock, location, updated_at FROM mirror_products ORDER BY sku ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Counts mirrored products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mirror_products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Inserts or overwrites a single row. Used by the seed tool.
    pub async fn upsert(&self, item: &InventoryItem) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_item(&mut *conn, item, Utc::now()).await
    }

    /// Replaces the whole mirror with an authoritative snapshot.
    ///
    /// ## What This Does
    /// In one transaction:
    /// 1. Deletes every mirror row
    /// 2. Inserts the snapshot (a repeated SKU keeps the last entry)
    /// 3. Re-applies the optimistic effect of every intent still queued
    ///
    /// ## Returns
    /// Number of rows in the mirror afterwards.
    pub async fn replace_all(&self, snapshot: &[InventoryItem]) -> DbResult<i64> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM mirror_products")
            .execute(&mut *tx)
            .await?;

        for item in snapshot {
            insert_item(&mut *tx, item, now).await?;
        }

        let queued: Vec<(i64, TransactionKind, String)> = sqlx::query_as(
            "SELECT id, kind, payload FROM pending_transactions ORDER BY id ASC",
        )
        .fetch_all(&mut *tx)
        .await?;

        let mut reapplied = 0usize;
        for (id, kind, body) in &queued {
            match TransactionPayload::from_json(*kind, body) {
                Ok(payload) => {
                    apply_effect(&mut *tx, &payload.mirror_effect(), now).await?;
                    reapplied += 1;
                }
                Err(e) => warn!(id, error = %e, "Skipping undecodable queued payload"),
            }
        }

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mirror_products")
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            snapshot = snapshot.len(),
            reapplied,
            rows,
            "Mirror replaced"
        );

        Ok(rows)
    }
}

// =============================================================================
// Shared Statements
// =============================================================================

async fn insert_item(
    conn: &mut SqliteConnection,
    item: &InventoryItem,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO mirror_products (sku, name, stock, location, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(sku) DO UPDATE SET
            name = excluded.name,
            stock = excluded.stock,
            location = excluded.location,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&item.sku)
    .bind(&item.name)
    .bind(item.stock)
    .bind(&item.location)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Applies one optimistic effect inside the caller's transaction.
///
/// A SKU missing from the mirror gets a row named after itself, starting
/// from zero stock.
pub(crate) async fn apply_effect(
    conn: &mut SqliteConnection,
    effect: &MirrorEffect,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let (sql, value) = match effect {
        MirrorEffect::Delta { delta, .. } => (
            r#"
            INSERT INTO mirror_products (sku, name, stock, location, updated_at)
            VALUES (?1, ?1, ?2, NULL, ?3)
            ON CONFLICT(sku) DO UPDATE SET
                stock = mirror_products.stock + excluded.stock,
                updated_at = excluded.updated_at
            "#,
            *delta,
        ),
        MirrorEffect::Set { stock, .. } => (
            r#"
            INSERT INTO mirror_products (sku, name, stock, location, updated_at)
            VALUES (?1, ?1, ?2, NULL, ?3)
            ON CONFLICT(sku) DO UPDATE SET
                stock = excluded.stock,
                updated_at = excluded.updated_at
            "#,
            *stock,
        ),
    };

    sqlx::query(sql)
        .bind(effect.sku())
        .bind(value)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    debug!(sku = %effect.sku(), ?effect, "Optimistic effect applied");
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use depot_core::{OutboundShipment, StockAdjustment};

    fn item(sku: &str, stock: i64) -> InventoryItem {
        InventoryItem {
            sku: sku.to_string(),
            name: format!("Product {}", sku),
            stock,
            location: Some("R1-S2".to_string()),
        }
    }

    #[tokio::test]
    async fn test_replace_all_swaps_wholesale() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mirror = db.mirror();

        mirror.replace_all(&[item("A1", 10), item("B2", 4)]).await.unwrap();
        assert_eq!(mirror.count().await.unwrap(), 2);

        let rows = mirror.replace_all(&[item("C3", 1)]).await.unwrap();
        assert_eq!(rows, 1);
        assert!(mirror.get("A1").await.unwrap().is_none());

        let c3 = mirror.get("C3").await.unwrap().unwrap();
        assert_eq!(c3.name, "Product C3");
        assert_eq!(c3.location.as_deref(), Some("R1-S2"));
    }

    #[tokio::test]
    async fn test_replace_all_reapplies_queued_effects() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        db.queue()
            .enqueue(&TransactionPayload::Outbound(OutboundShipment::new("A1", 5)))
            .await
            .unwrap();
        db.queue()
            .enqueue(&TransactionPayload::Adjust(StockAdjustment::new("B2", 9, "count")))
            .await
            .unwrap();

        db.mirror()
            .replace_all(&[item("A1", 20), item("B2", 3)])
            .await
            .unwrap();

        // Remote truth plus not-yet-applied local intents.
        assert_eq!(db.mirror().get("A1").await.unwrap().unwrap().stock, 15);
        assert_eq!(db.mirror().get("B2").await.unwrap().unwrap().stock, 9);
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_upsert_overwrites() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mirror = db.mirror();

        mirror.upsert(&item("B2", 1)).await.unwrap();
        mirror.upsert(&item("A1", 1)).await.unwrap();
        mirror.upsert(&item("A1", 8)).await.unwrap();

        let list = mirror.list().await.unwrap();
        assert_eq!(list.iter().map(|p| p.sku.as_str()).collect::<Vec<_>>(), vec!["A1", "B2"]);
        assert_eq!(list[0].stock, 8);
    }
}
