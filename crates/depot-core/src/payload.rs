//! # Payloads
//!
//! Typed bodies for the four remote endpoints, and the optimistic effect each
//! one has on the local inventory mirror.
//!
//! ## Body ↔ Effect
//! ```text
//! ┌──────────┬──────────────────────────────────────┬─────────────────────┐
//! │ Kind     │ Body                                 │ Mirror effect       │
//! ├──────────┼──────────────────────────────────────┼─────────────────────┤
//! │ INBOUND  │ sku, quantity, supplier?, note?      │ stock += quantity   │
//! │ OUTBOUND │ sku, quantity, destination?, note?   │ stock -= quantity   │
//! │ ADJUST   │ sku, counted_quantity, reason        │ stock := counted    │
//! │ DAMAGE   │ sku, quantity, reason                │ stock -= quantity   │
//! └──────────┴──────────────────────────────────────┴─────────────────────┘
//! ```
//!
//! Every body has an optional `reference` field. It is left empty at enqueue
//! time and filled with the idempotency token right before submission.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::types::TransactionKind;
use crate::validation::{
    validate_counted_quantity, validate_note, validate_quantity, validate_reason, validate_sku,
    ValidationResult,
};

// =============================================================================
// Bodies
// =============================================================================

/// Goods received into the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundReceipt {
    pub sku: String,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl InboundReceipt {
    pub fn new(sku: impl Into<String>, quantity: i64) -> Self {
        Self {
            sku: sku.into(),
            quantity,
            supplier: None,
            note: None,
            reference: None,
        }
    }
}

/// Goods shipped out of the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundShipment {
    pub sku: String,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl OutboundShipment {
    pub fn new(sku: impl Into<String>, quantity: i64) -> Self {
        Self {
            sku: sku.into(),
            quantity,
            destination: None,
            note: None,
            reference: None,
        }
    }
}

/// A stock count. Sets the stock to what was counted on the shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub sku: String,
    pub counted_quantity: i64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl StockAdjustment {
    pub fn new(sku: impl Into<String>, counted_quantity: i64, reason: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            counted_quantity,
            reason: reason.into(),
            reference: None,
        }
    }
}

/// Damaged goods written off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageReport {
    pub sku: String,
    pub quantity: i64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl DamageReport {
    pub fn new(sku: impl Into<String>, quantity: i64, reason: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            quantity,
            reason: reason.into(),
            reference: None,
        }
    }
}

// =============================================================================
// Transaction Payload
// =============================================================================

/// Any queueable body, tagged by its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionPayload {
    Inbound(InboundReceipt),
    Outbound(OutboundShipment),
    Adjust(StockAdjustment),
    Damage(DamageReport),
}

impl TransactionPayload {
    /// The endpoint this payload is submitted to.
    pub fn kind(&self) -> TransactionKind {
        match self {
            TransactionPayload::Inbound(_) => TransactionKind::Inbound,
            TransactionPayload::Outbound(_) => TransactionKind::Outbound,
            TransactionPayload::Adjust(_) => TransactionKind::Adjust,
            TransactionPayload::Damage(_) => TransactionKind::Damage,
        }
    }

    /// The product this payload touches.
    pub fn sku(&self) -> &str {
        match self {
            TransactionPayload::Inbound(p) => &p.sku,
            TransactionPayload::Outbound(p) => &p.sku,
            TransactionPayload::Adjust(p) => &p.sku,
            TransactionPayload::Damage(p) => &p.sku,
        }
    }

    /// The idempotency token, if one has been attached.
    pub fn reference(&self) -> Option<&str> {
        match self {
            TransactionPayload::Inbound(p) => p.reference.as_deref(),
            TransactionPayload::Outbound(p) => p.reference.as_deref(),
            TransactionPayload::Adjust(p) => p.reference.as_deref(),
            TransactionPayload::Damage(p) => p.reference.as_deref(),
        }
    }

    /// Returns a copy carrying `reference` as its idempotency token.
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        let reference = Some(reference.into());
        match &mut self {
            TransactionPayload::Inbound(p) => p.reference = reference,
            TransactionPayload::Outbound(p) => p.reference = reference,
            TransactionPayload::Adjust(p) => p.reference = reference,
            TransactionPayload::Damage(p) => p.reference = reference,
        }
        self
    }

    /// Checks every field before the payload is allowed into the queue.
    pub fn validate(&self) -> ValidationResult<()> {
        match self {
            TransactionPayload::Inbound(p) => {
                validate_sku(&p.sku)?;
                validate_quantity(p.quantity)?;
                validate_note("supplier", p.supplier.as_deref())?;
                validate_note("note", p.note.as_deref())
            }
            TransactionPayload::Outbound(p) => {
                validate_sku(&p.sku)?;
                validate_quantity(p.quantity)?;
                validate_note("destination", p.destination.as_deref())?;
                validate_note("note", p.note.as_deref())
            }
            TransactionPayload::Adjust(p) => {
                validate_sku(&p.sku)?;
                validate_counted_quantity(p.counted_quantity)?;
                validate_reason(&p.reason)
            }
            TransactionPayload::Damage(p) => {
                validate_sku(&p.sku)?;
                validate_quantity(p.quantity)?;
                validate_reason(&p.reason)
            }
        }
    }

    /// The optimistic change this payload makes to the mirror.
    pub fn mirror_effect(&self) -> MirrorEffect {
        match self {
            TransactionPayload::Inbound(p) => MirrorEffect::Delta {
                sku: p.sku.clone(),
                delta: p.quantity,
            },
            TransactionPayload::Outbound(p) => MirrorEffect::Delta {
                sku: p.sku.clone(),
                delta: -p.quantity,
            },
            TransactionPayload::Adjust(p) => MirrorEffect::Set {
                sku: p.sku.clone(),
                stock: p.counted_quantity,
            },
            TransactionPayload::Damage(p) => MirrorEffect::Delta {
                sku: p.sku.clone(),
                delta: -p.quantity,
            },
        }
    }

    /// Serializes the body as the remote endpoint expects it.
    pub fn to_value(&self) -> CoreResult<Value> {
        let value = match self {
            TransactionPayload::Inbound(p) => serde_json::to_value(p),
            TransactionPayload::Outbound(p) => serde_json::to_value(p),
            TransactionPayload::Adjust(p) => serde_json::to_value(p),
            TransactionPayload::Damage(p) => serde_json::to_value(p),
        };
        value.map_err(|e| CoreError::invalid_payload(self.kind().as_str(), e.to_string()))
    }

    /// Serializes the body to the text stored in the queue.
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(self.to_value()?.to_string())
    }

    /// Decodes a stored body for the given kind.
    pub fn from_json(kind: TransactionKind, body: &str) -> CoreResult<Self> {
        let invalid = |e: serde_json::Error| CoreError::invalid_payload(kind.as_str(), e.to_string());
        let payload = match kind {
            TransactionKind::Inbound => TransactionPayload::Inbound(serde_json::from_str(body).map_err(invalid)?),
            TransactionKind::Outbound => TransactionPayload::Outbound(serde_json::from_str(body).map_err(invalid)?),
            TransactionKind::Adjust => TransactionPayload::Adjust(serde_json::from_str(body).map_err(invalid)?),
            TransactionKind::Damage => TransactionPayload::Damage(serde_json::from_str(body).map_err(invalid)?),
        };
        Ok(payload)
    }
}

// =============================================================================
// Mirror Effect
// =============================================================================

/// An optimistic change to one mirror row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEffect {
    /// Add `delta` (negative for outgoing goods).
    Delta { sku: String, delta: i64 },
    /// Replace the stock with an absolute count.
    Set { sku: String, stock: i64 },
}

impl MirrorEffect {
    pub fn sku(&self) -> &str {
        match self {
            MirrorEffect::Delta { sku, .. } | MirrorEffect::Set { sku, .. } => sku,
        }
    }

    /// Applies the effect to a current stock value.
    ///
    /// The mirror may go negative; the next reconcile replaces it with
    /// whatever the remote computed.
    pub fn apply(&self, current: i64) -> i64 {
        match self {
            MirrorEffect::Delta { delta, .. } => current.saturating_add(*delta),
            MirrorEffect::Set { stock, .. } => *stock,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
