//! # Repository Module
//!
//! Database repository implementations for Depot.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Sync engine / CLI                                                     │
//! │       │                                                                 │
//! │       │  db.queue().enqueue(&payload)                                  │
//! │       ▼                                                                 │
//! │  QueueRepository                                                       │
//! │  ├── enqueue          (row + optimistic mirror effect, one tx)         │
//! │  ├── head / list_pending / get / count_*                               │
//! │  ├── mark_syncing     (guarded: head only, one in flight)              │
//! │  ├── mark_synced / mark_failed                                         │
//! │  └── retry_now / discard / recover_in_flight                           │
//! │                                                                         │
//! │  MirrorRepository                                                      │
//! │  ├── get / list / count                                                │
//! │  └── replace_all      (snapshot + re-applied queued effects, one tx)   │
//! │                                                                         │
//! │  SyncMetaRepository                                                    │
//! │  └── device id, last sync / reconcile timestamps                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`QueueRepository`](queue::QueueRepository) - Write-ahead queue
//! - [`MirrorRepository`](mirror::MirrorRepository) - Inventory mirror
//! - [`SyncMetaRepository`](meta::SyncMetaRepository) - Sync bookkeeping

pub mod meta;
pub mod mirror;
pub mod queue;
