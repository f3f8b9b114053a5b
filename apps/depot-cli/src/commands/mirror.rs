//! # Mirror Commands
//!
//! Read-only view of the local inventory mirror, queued effects included.

use depot_core::MirrorProduct;

use crate::context::AppContext;
use crate::error::ApiError;

/// All mirror rows, ordered by SKU.
pub async fn list(ctx: &AppContext) -> Result<Vec<MirrorProduct>, ApiError> {
    Ok(ctx.database().mirror().list().await?)
}

/// One mirror row.
pub async fn get(ctx: &AppContext, sku: &str) -> Result<MirrorProduct, ApiError> {
    ctx.database()
        .mirror()
        .get(sku)
        .await?
        .ok_or_else(|| ApiError::not_found("Product", sku))
}
