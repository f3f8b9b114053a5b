//! # depot-core: Pure Domain Logic for Depot
//!
//! This crate is the vocabulary of the offline write-ahead queue. It contains
//! the transaction model, payload bodies and validation as pure code with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Depot Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Operator Shell (depot-cli)                      │   │
//! │  │    receive / ship / adjust / damage, status, retry, discard     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            depot-sync (connectivity, drain, reconcile)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               depot-db (queue + mirror in SQLite)               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ depot-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐                  │   │
//! │  │   │   types   │  │  payload  │  │ validation│                  │   │
//! │  │   │ Pending-  │  │ Inbound…  │  │   rules   │                  │   │
//! │  │   │ Transact. │  │ Mirror-   │  │  checks   │                  │   │
//! │  │   │ SyncState │  │ Effect    │  │           │                  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘                  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Queue and mirror types (PendingTransaction, MirrorProduct, SyncState)
//! - [`payload`] - Remote payload bodies and their optimistic mirror effects
//! - [`error`] - Domain error types
//! - [`validation`] - Payload validation rules
//!
//! ## Example Usage
//!
//! ```rust
//! use depot_core::payload::{MirrorEffect, OutboundShipment, TransactionPayload};
//!
//! let payload = TransactionPayload::Outbound(OutboundShipment::new("A1", 5));
//! payload.validate().unwrap();
//!
//! // Shipping 5 units decrements the mirrored stock before the remote confirms.
//! assert_eq!(payload.mirror_effect().apply(12), 7);
//! assert!(matches!(payload.mirror_effect(), MirrorEffect::Delta { delta: -5, .. }));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod payload;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use payload::{
    DamageReport, InboundReceipt, MirrorEffect, OutboundShipment, StockAdjustment,
    TransactionPayload,
};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Largest quantity a single movement may carry.
///
/// ## Business Reason
/// Catches typos such as scanning a barcode into the quantity field.
pub const MAX_QUANTITY: i64 = 100_000;

/// Maximum SKU length accepted by the remote sheet.
pub const MAX_SKU_LEN: usize = 50;

/// Maximum length of free-text reasons and notes.
pub const MAX_NOTE_LEN: usize = 500;
