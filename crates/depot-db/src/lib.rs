//! # depot-db: Durable Local Store for Depot
//!
//! This crate owns the on-device SQLite database: the ordered write-ahead
//! queue of pending intents and the read-mostly inventory mirror. No other
//! crate touches those tables.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Depot Data Flow                                  │
//! │                                                                         │
//! │  depot-cli (ship A1 5)          depot-sync (drain / reconcile)         │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     depot-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ QueueRepo     │    │ 001_init.sql │  │   │
//! │  │   │ SqlitePool    │◄───│ MirrorRepo    │    │              │  │   │
//! │  │   │ WAL + FULL    │    │ SyncMetaRepo  │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/depot.db                                          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Queue, mirror and metadata repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use depot_core::{OutboundShipment, TransactionPayload};
//! use depot_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("depot.db")).await?;
//!
//! let payload = TransactionPayload::Outbound(OutboundShipment::new("A1", 5));
//! let intent = db.queue().enqueue(&payload).await?;
//! let a1 = db.mirror().get("A1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::meta::SyncMetaRepository;
pub use repository::mirror::MirrorRepository;
pub use repository::queue::{AttemptFailure, QueueRepository};
