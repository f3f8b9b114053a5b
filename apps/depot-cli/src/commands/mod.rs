//! # CLI Commands
//!
//! Each command takes the [`AppContext`](crate::context::AppContext) and
//! returns a serializable result; `lib.rs` prints it as JSON.
//!
//! ## Command Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Commands                                         │
//! │                                                                         │
//! │  intent   receive · ship · adjust · damage   queue, then one drain      │
//! │  queue    status · queue · retry · discard   inspect and resolve        │
//! │  mirror   mirror [SKU]                       local inventory view       │
//! │  sync     sync · refresh · run               drain, reconcile, agent    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod intent;
pub mod mirror;
pub mod queue;
pub mod sync;

use serde::Serialize;

use crate::error::ApiError;

/// Writes `value` to stdout as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), ApiError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::internal(format!("Failed to encode output: {}", e)))?;
    println!("{}", json);
    Ok(())
}
