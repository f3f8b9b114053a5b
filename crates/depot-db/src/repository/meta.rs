//! # Sync Metadata Repository
//!
//! Small key/value bookkeeping that must survive restarts: the generated
//! device id, the last successful sync / reconcile times, and the mirror
//! staleness mark.
//!
//! ## Mirror Staleness
//! Syncing or discarding an intent leaves the mirror holding a local delta
//! the remote snapshot has not confirmed. The queue bumps a counter under
//! `mirror_stale` in the same transaction; reconciliation clears it only if
//! the counter is unchanged since it started fetching. The mark survives
//! restarts, so any later drain that empties the queue reconciles.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// Device id, generated on first use.
pub const KEY_DEVICE_ID: &str = "device_id";

/// Time the last intent was confirmed by the remote.
pub const KEY_LAST_SYNCED_AT: &str = "last_synced_at";

/// Time the mirror was last replaced from a remote snapshot.
pub const KEY_LAST_RECONCILED_AT: &str = "last_reconciled_at";

/// Counter bumped whenever the mirror holds an unconfirmed delta.
pub const KEY_MIRROR_STALE: &str = "mirror_stale";

/// Repository for sync metadata.
#[derive(Debug, Clone)]
pub struct SyncMetaRepository {
    pool: SqlitePool,
}

impl SyncMetaRepository {
    /// Creates a new SyncMetaRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncMetaRepository { pool }
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM sync_meta WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_meta (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reads an RFC 3339 timestamp stored under `key`.
    pub async fn get_timestamp(&self, key: &str) -> DbResult<Option<DateTime<Utc>>> {
        match self.get(key).await? {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|at| Some(at.with_timezone(&Utc)))
                .map_err(|e| DbError::Serialization(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    pub async fn set_timestamp(&self, key: &str, at: DateTime<Utc>) -> DbResult<()> {
        self.set(key, &at.to_rfc3339()).await
    }

    /// Returns the stored device id, generating one on first call.
    ///
    /// The id is part of every idempotency token, so it must never change
    /// once intents have been submitted.
    pub async fn device_id(&self) -> DbResult<String> {
        let candidate = Uuid::new_v4().to_string();

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO sync_meta (key, value, updated_at) VALUES (?1, ?2, ?3)",
        )
        .bind(KEY_DEVICE_ID)
        .bind(&candidate)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            info!(device_id = %candidate, "Generated device id");
        }

        self.get(KEY_DEVICE_ID)
            .await?
            .ok_or_else(|| DbError::not_found("SyncMeta", KEY_DEVICE_ID))
    }

    /// Current staleness mark, `None` when the mirror matches the last
    /// reconcile.
    pub async fn mirror_stale_mark(&self) -> DbResult<Option<i64>> {
        match self.get(KEY_MIRROR_STALE).await? {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e| DbError::Serialization(format!("{}: {}", KEY_MIRROR_STALE, e))),
            None => Ok(None),
        }
    }

    pub async fn mark_mirror_stale(&self) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        bump_mirror_stale(&mut *conn, Utc::now()).await
    }

    /// Clears the staleness mark if it still equals `mark`.
    ///
    /// Returns false when the queue bumped it in the meantime; the mirror
    /// then needs another reconcile.
    pub async fn clear_mirror_stale(&self, mark: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM sync_meta WHERE key = ?1 AND value = ?2")
            .bind(KEY_MIRROR_STALE)
            .bind(mark.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Bumps the staleness counter inside the caller's transaction.
pub(crate) async fn bump_mirror_stale(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_meta (key, value, updated_at) VALUES (?1, '1', ?2)
        ON CONFLICT(key) DO UPDATE SET
            value = CAST(CAST(sync_meta.value AS INTEGER) + 1 AS TEXT),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(KEY_MIRROR_STALE)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(())
}
