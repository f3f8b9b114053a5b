//! Remote stub for command tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use depot_core::{InventoryItem, TransactionKind};
use depot_sync::{RemoteClient, RemoteError, SubmitReceipt};

/// Accepts every submission unless told to reject the next one.
pub(crate) struct StubRemote {
    pub(crate) submitted: Mutex<Vec<(TransactionKind, Value)>>,
    pub(crate) inventory: Mutex<Vec<InventoryItem>>,
    reject_next: Mutex<Option<RemoteError>>,
    reachable: AtomicBool,
}

impl StubRemote {
    pub(crate) fn new() -> Self {
        StubRemote {
            submitted: Mutex::new(Vec::new()),
            inventory: Mutex::new(Vec::new()),
            reject_next: Mutex::new(None),
            reachable: AtomicBool::new(true),
        }
    }

    pub(crate) fn reject_next(&self, err: RemoteError) {
        *self.reject_next.lock().unwrap() = Some(err);
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub(crate) fn submission_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    fn check_reachable(&self) -> Result<(), RemoteError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Network("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl RemoteClient for StubRemote {
    async fn submit(&self, kind: TransactionKind, body: &Value) -> Result<SubmitReceipt, RemoteError> {
        self.check_reachable()?;
        if let Some(err) = self.reject_next.lock().unwrap().take() {
            return Err(err);
        }
        self.submitted.lock().unwrap().push((kind, body.clone()));
        Ok(SubmitReceipt {
            reference: body.get("reference").and_then(Value::as_str).map(str::to_string),
            duplicate: false,
            message: None,
        })
    }

    async fn fetch_inventory(&self) -> Result<Vec<InventoryItem>, RemoteError> {
        self.check_reachable()?;
        Ok(self.inventory.lock().unwrap().clone())
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.check_reachable()
    }
}
