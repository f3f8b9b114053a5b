//! # Remote API Client
//!
//! The spreadsheet-backed API as seen by the sync engine.
//!
//! ## Wire Contract
//! ```text
//! POST {base_url}/{endpoint for kind}     body: payload JSON incl. "reference"
//!   200 { "success": true,  "reference"?: "...", "duplicate"?: bool }  → applied
//!   200 { "success": false, "message": "..." }                          → rejected
//!   4xx (not 408/425/429)                                               → rejected
//!   5xx, 408, 425, 429, timeout, connect error, unparseable body        → transient
//!
//! GET  {base_url}/{inventory}   { "items": [{ "sku", "name", "stock", "location"? }] }
//! GET  {base_url}/{health}      any 2xx
//! ```
//!
//! A `duplicate: true` answer means the remote already applied an intent
//! carrying the same reference; it counts as success even when `success` is
//! false.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use depot_core::{InventoryItem, TransactionKind};

use crate::config::{EndpointSettings, RemoteSettings};
use crate::error::{RemoteError, SyncError, SyncResult};

/// Longest response body echoed into an error message.
const MAX_ERROR_BODY_CHARS: usize = 200;

// =============================================================================
// Client Trait
// =============================================================================

/// Confirmation of an applied intent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Reference echoed by the remote, if any.
    pub reference: Option<String>,
    /// The remote had already applied this reference.
    pub duplicate: bool,
    pub message: Option<String>,
}

/// Calls the sync engine, the reconciler and the probe make.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Applies one intent.
    async fn submit(&self, kind: TransactionKind, body: &Value) -> Result<SubmitReceipt, RemoteError>;

    /// Fetches the authoritative inventory.
    async fn fetch_inventory(&self) -> Result<Vec<InventoryItem>, RemoteError>;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), RemoteError>;
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    duplicate: bool,
}

#[derive(Debug, Deserialize)]
struct InventoryResponse {
    items: Vec<InventoryItem>,
}

impl SubmitResponse {
    fn into_receipt(self, status: u16) -> Result<SubmitReceipt, RemoteError> {
        if self.success || self.duplicate {
            return Ok(SubmitReceipt {
                reference: self.reference,
                duplicate: self.duplicate,
                message: self.message,
            });
        }

        Err(RemoteError::Rejected {
            status,
            message: self
                .message
                .unwrap_or_else(|| "remote reported failure".to_string()),
        })
    }
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// [`RemoteClient`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: Url,
    endpoints: EndpointSettings,
    timeout: Duration,
}

impl HttpRemote {
    /// Creates a client for the configured remote.
    ///
    /// ## Returns
    /// * `Err(SyncError::InvalidUrl)` - `base_url` does not parse
    /// * `Err(SyncError::InvalidConfig)` - the HTTP client could not be built
    pub fn new(settings: &RemoteSettings) -> SyncResult<Self> {
        // Url::join replaces the last segment unless the base ends with '/'.
        let mut base = settings.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let timeout = Duration::from_secs(settings.request_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(HttpRemote {
            client,
            base_url,
            endpoints: settings.endpoints.clone(),
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| RemoteError::Protocol(format!("bad endpoint '{}': {}", path, e)))
    }

    fn transport_error(&self, err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout(self.timeout.as_millis() as u64)
        } else if err.is_decode() || err.is_body() {
            RemoteError::Protocol(err.to_string())
        } else {
            RemoteError::Network(err.to_string())
        }
    }

    /// Reads the body and maps non-success statuses.
    async fn read_body(&self, response: reqwest::Response) -> Result<(u16, String), RemoteError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        if status.is_success() {
            debug!(status = status.as_u16(), "Remote call succeeded");
            return Ok((status.as_u16(), body));
        }

        let message = error_message(&body);
        debug!(status = status.as_u16(), %message, "Remote call failed");
        Err(RemoteError::from_status(status.as_u16(), message))
    }
}

/// Extracts `message` from a JSON error body, else a trimmed preview.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
    }

    let mut preview: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        preview.push_str("...");
    }
    preview
}

#[async_trait]
impl RemoteClient for HttpRemote {
    async fn submit(&self, kind: TransactionKind, body: &Value) -> Result<SubmitReceipt, RemoteError> {
        let url = self.endpoint(self.endpoints.for_kind(kind))?;
        debug!(%kind, %url, "Submitting intent");

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let (status, text) = self.read_body(response).await?;
        let parsed: SubmitResponse = serde_json::from_str(&text)
            .map_err(|e| RemoteError::Protocol(format!("submit response: {}", e)))?;

        parsed.into_receipt(status)
    }

    async fn fetch_inventory(&self) -> Result<Vec<InventoryItem>, RemoteError> {
        let url = self.endpoint(&self.endpoints.inventory)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let (_, text) = self.read_body(response).await?;
        let parsed: InventoryResponse = serde_json::from_str(&text)
            .map_err(|e| RemoteError::Protocol(format!("inventory response: {}", e)))?;

        Ok(parsed.items)
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        let url = self.endpoint(&self.endpoints.health)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        self.read_body(response).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base_url: &str) -> RemoteSettings {
        RemoteSettings {
            base_url: base_url.to_string(),
            ..RemoteSettings::default()
        }
    }

    #[test]
    fn test_endpoints_join_under_base_path() {
        let remote = HttpRemote::new(&settings("https://sheets.example/api")).unwrap();

        assert_eq!(
            remote.endpoint("outbound").unwrap().as_str(),
            "https://sheets.example/api/outbound"
        );
        assert_eq!(
            remote.endpoint("/inventory").unwrap().as_str(),
            "https://sheets.example/api/inventory"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpRemote::new(&settings("::nope")).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_submit_response_mapping() {
        let ok: SubmitResponse =
            serde_json::from_str(r#"{"success": true, "reference": "dev:7"}"#).unwrap();
        assert_eq!(ok.into_receipt(200).unwrap().reference.as_deref(), Some("dev:7"));

        let dup: SubmitResponse =
            serde_json::from_str(r#"{"success": false, "duplicate": true}"#).unwrap();
        assert!(dup.into_receipt(200).unwrap().duplicate);

        let rejected: SubmitResponse =
            serde_json::from_str(r#"{"success": false, "message": "SKU not found"}"#).unwrap();
        assert_eq!(
            rejected.into_receipt(200).unwrap_err(),
            RemoteError::Rejected {
                status: 200,
                message: "SKU not found".to_string()
            }
        );
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"message": "quota exceeded"}"#), "quota exceeded");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");

        let long = "x".repeat(500);
        assert_eq!(error_message(&long).len(), MAX_ERROR_BODY_CHARS + 3);
    }

    #[test]
    fn test_inventory_response_parsing() {
        let parsed: InventoryResponse = serde_json::from_str(
            r#"{"items": [{"sku": "A1", "name": "Hex Bolt", "stock": 0}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert!(parsed.items[0].location.is_none());
    }
}
