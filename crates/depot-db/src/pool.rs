//! # Store Handle
//!
//! Opens the on-device SQLite file that holds the write-ahead queue, the
//! inventory mirror and sync metadata, and hands out repositories over it.
//!
//! ```text
//!   DbConfig::new("depot.db")            DbConfig::in_memory()  (tests)
//!            │                                     │
//!            └───────────────┬─────────────────────┘
//!                            ▼
//!            Database::new(config) ── migrations/sqlite
//!                            │
//!           ┌────────────────┼────────────────┐
//!           ▼                ▼                ▼
//!       db.queue()       db.mirror()      db.meta()
//!    pending intents   cached stock    device id, timestamps
//! ```
//!
//! ## Durability
//! WAL journal with `synchronous=FULL`: once `enqueue` returns, the intent
//! survives a crash or power loss. Readers never block the single writer, and
//! a second process (a one-shot CLI command next to a running agent) waits up
//! to `busy_timeout` for the write lock instead of failing.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::meta::SyncMetaRepository;
use crate::repository::mirror::MirrorRepository;
use crate::repository::queue::QueueRepository;

const IN_MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// How to open the store.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new(data_dir.join("depot.db"))
///     .busy_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file; created on first open.
    pub database_path: PathBuf,

    /// Pool size. Default: 4
    pub max_connections: u32,

    /// Connections kept open while idle. Default: 1
    pub min_connections: u32,

    /// How long a caller waits for a free pooled connection. Default: 30s
    pub connect_timeout: Duration,

    /// How long a writer waits on another process's lock. Default: 5s
    pub busy_timeout: Duration,

    /// Pooled connections idle this long are closed. Default: 10 minutes
    pub idle_timeout: Duration,

    /// Apply pending migrations when opening. Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Store at `path` with default pool settings.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 4,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Throwaway store for tests.
    ///
    /// The pool holds exactly one connection that is never recycled; the
    /// database disappears with it.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY
    }
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the open store.
///
/// Cheap to clone; every clone shares the same pool. There is no global
/// instance: the handle is passed explicitly to the sync engine and the CLI.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (or creates) the store.
    ///
    /// Every connection runs with WAL, `synchronous=FULL`, foreign keys and
    /// the configured busy timeout. Migrations run afterwards unless disabled.
    ///
    /// ## Returns
    /// * `Ok(Database)` - Store ready for `enqueue`
    /// * `Err(DbError::StorageUnavailable)` - File can't be opened
    /// * `Err(DbError::MigrationFailed)` - Schema could not be applied
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening store");

        let in_memory = config.is_in_memory();

        let base_options = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::StorageUnavailable(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&config.database_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };

        let connect_options = base_options
            .synchronous(SqliteSynchronous::Full)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout);

        pool_options = if in_memory {
            pool_options.idle_timeout(None).max_lifetime(None)
        } else {
            pool_options.idle_timeout(Some(config.idle_timeout))
        };

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::StorageUnavailable(e.to_string()))?;

        debug!(
            max_connections = config.max_connections,
            in_memory,
            "Store pool ready"
        );

        let db = Database { pool };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Applies pending schema migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the write-ahead queue repository.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let tx = db.queue().enqueue(&payload).await?;
    /// ```
    pub fn queue(&self) -> QueueRepository {
        QueueRepository::new(self.pool.clone())
    }

    /// Returns the inventory mirror repository.
    pub fn mirror(&self) -> MirrorRepository {
        MirrorRepository::new(self.pool.clone())
    }

    /// Returns the sync metadata repository.
    pub fn meta(&self) -> SyncMetaRepository {
        SyncMetaRepository::new(self.pool.clone())
    }

    /// Closes every pooled connection. Later repository calls fail with
    /// `DbError::StorageUnavailable`.
    pub async fn close(&self) {
        debug!("Closing store");
        self.pool.close().await;
    }

    /// True when a trivial query succeeds.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_store_is_empty() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert!(db.health_check().await);
        assert_eq!(db.queue().count_pending().await.unwrap(), 0);
        assert_eq!(db.mirror().count().await.unwrap(), 0);
    }

    #[test]
    fn test_store_options() {
        let config = DbConfig::new("/tmp/depot-test.db")
            .busy_timeout(Duration::from_secs(10))
            .max_connections(2)
            .run_migrations(false);

        assert_eq!(config.busy_timeout, Duration::from_secs(10));
        assert_eq!(config.max_connections, 2);
        assert!(!config.run_migrations);
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }

    #[tokio::test]
    async fn test_closed_pool_reports_storage_unavailable() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;

        assert!(!db.health_check().await);
        let err = db.queue().count_pending().await.unwrap_err();
        assert!(err.is_storage_unavailable());
    }
}
