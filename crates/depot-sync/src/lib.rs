//! # depot-sync: Sync Engine for Depot
//!
//! Drains the local write-ahead queue to the remote inventory sheet in strict
//! FIFO order, one intent at a time, and pulls the remote snapshot back into
//! the local mirror once the queue is empty.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Architecture                                │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                   SyncAgent (Main Orchestrator)                  │  │
//! │  │                                                                  │  │
//! │  │  Spawned as a Tokio task by the CLI `run` command                │  │
//! │  │  Turns connectivity edges, timers and commands into drains       │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Connectivity   │  │  SyncEngine    │  │  Reconciler            │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Debounced      │  │ Single-flight  │  │ Replaces the mirror    │    │
//! │  │ online/offline │  │ FIFO drain,    │  │ with the remote        │    │
//! │  │ + health probe │  │ retry/backoff  │  │ snapshot               │    │
//! │  └────────────────┘  └───────┬────────┘  └───────────┬────────────┘    │
//! │                              │                       │                  │
//! │                              ▼                       ▼                  │
//! │                     ┌─────────────────────────────────────────┐        │
//! │                     │  RemoteClient (HttpRemote over reqwest)  │        │
//! │                     └─────────────────────────────────────────┘        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`agent`] - Main `SyncAgent` orchestrator and its handle
//! - [`config`] - Sync configuration (device, remote, retry, connectivity)
//! - [`connectivity`] - Debounced connectivity monitor and health probe
//! - [`engine`] - Queue drain with retry classification
//! - [`error`] - Sync and remote error types
//! - [`reconcile`] - Mirror refresh from the remote snapshot
//! - [`remote`] - Remote client trait and HTTP implementation
//! - [`retry`] - Exponential backoff policy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use depot_sync::{SyncAgentBuilder, SyncConfig};
//! use depot_db::Database;
//!
//! let config = SyncConfig::load_or_default(None);
//!
//! let handle = SyncAgentBuilder::new(config)
//!     .with_database(database)
//!     .build()?
//!     .start()
//!     .await?;
//!
//! handle.enqueue(&payload).await?;
//! let status = handle.status().await?;
//! println!("Pending: {}", status.pending_count);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod reconcile;
pub mod remote;
pub mod retry;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{
    AgentCommand, DrainReason, NoOpEmitter, SyncAgent, SyncAgentBuilder, SyncAgentHandle,
    SyncEventEmitter,
};
pub use config::{ConnectivitySettings, DeviceConfig, RemoteSettings, SyncConfig, SyncSettings};
pub use connectivity::{ConnectivityHandle, ConnectivityMonitor, ConnectivityProbe, ConnectivitySignal};
pub use engine::{DrainOutcome, SyncEngine};
pub use error::{RemoteError, RetryClass, SyncError, SyncResult};
pub use reconcile::{RefreshReport, Reconciler};
pub use remote::{HttpRemote, RemoteClient, SubmitReceipt};
pub use retry::RetryPolicy;
