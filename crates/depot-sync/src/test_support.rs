//! In-process remote for tests.
//!
//! Keeps its own inventory, applies accepted intents to it (stock floored at
//! zero, like the sheet does) and de-duplicates by reference.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use depot_core::{InventoryItem, TransactionKind, TransactionPayload};

use crate::error::RemoteError;
use crate::remote::{RemoteClient, SubmitReceipt};

/// What the next submission does.
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Accept,
    Fail(RemoteError),
    /// Applied remotely, but the answer never arrives.
    ApplyThenFail(RemoteError),
}

pub(crate) struct ScriptedRemote {
    script: Mutex<VecDeque<Scripted>>,
    inventory: Mutex<Vec<InventoryItem>>,
    submitted: Mutex<Vec<(TransactionKind, Value)>>,
    applied: Mutex<HashSet<String>>,
    submit_delay: Mutex<Duration>,
    reachable: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pings: AtomicUsize,
}

impl ScriptedRemote {
    pub(crate) fn new() -> Self {
        ScriptedRemote {
            script: Mutex::new(VecDeque::new()),
            inventory: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            applied: Mutex::new(HashSet::new()),
            submit_delay: Mutex::new(Duration::ZERO),
            reachable: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_inventory(self, items: Vec<InventoryItem>) -> Self {
        *self.inventory.lock().unwrap() = items;
        self
    }

    /// Queues outcomes for the next submissions; afterwards every call is accepted.
    pub(crate) fn script(&self, outcomes: impl IntoIterator<Item = Scripted>) {
        self.script.lock().unwrap().extend(outcomes);
    }

    pub(crate) fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = delay;
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Every submission attempt, in arrival order.
    pub(crate) fn submitted(&self) -> Vec<(TransactionKind, Value)> {
        self.submitted.lock().unwrap().clone()
    }

    /// References of the submissions, in arrival order.
    pub(crate) fn submitted_references(&self) -> Vec<String> {
        self.submitted()
            .iter()
            .filter_map(|(_, body)| body.get("reference").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    pub(crate) fn applied_count(&self) -> usize {
        self.applied.lock().unwrap().len()
    }

    pub(crate) fn stock(&self, sku: &str) -> Option<i64> {
        self.inventory
            .lock()
            .unwrap()
            .iter()
            .find(|item| item.sku == sku)
            .map(|item| item.stock)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    fn unreachable() -> RemoteError {
        RemoteError::Network("connection refused".to_string())
    }

    /// Applies an intent once per reference. Returns false for a replay.
    fn apply(&self, kind: TransactionKind, body: &Value) -> bool {
        let reference = body
            .get("reference")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !self.applied.lock().unwrap().insert(reference) {
            return false;
        }

        let payload = TransactionPayload::from_json(kind, &body.to_string()).unwrap();
        let effect = payload.mirror_effect();

        let mut inventory = self.inventory.lock().unwrap();
        match inventory.iter_mut().find(|item| item.sku == effect.sku()) {
            Some(item) => item.stock = effect.apply(item.stock).max(0),
            None => inventory.push(InventoryItem {
                sku: effect.sku().to_string(),
                name: effect.sku().to_string(),
                stock: effect.apply(0).max(0),
                location: None,
            }),
        }
        true
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteClient for ScriptedRemote {
    async fn submit(&self, kind: TransactionKind, body: &Value) -> Result<SubmitReceipt, RemoteError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.submitted.lock().unwrap().push((kind, body.clone()));

        let delay = *self.submit_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(Self::unreachable());
        }

        let next = self.script.lock().unwrap().pop_front().unwrap_or(Scripted::Accept);
        match next {
            Scripted::Accept => {
                let fresh = self.apply(kind, body);
                Ok(SubmitReceipt {
                    reference: body.get("reference").and_then(Value::as_str).map(str::to_string),
                    duplicate: !fresh,
                    message: None,
                })
            }
            Scripted::Fail(err) => Err(err),
            Scripted::ApplyThenFail(err) => {
                self.apply(kind, body);
                Err(err)
            }
        }
    }

    async fn fetch_inventory(&self) -> Result<Vec<InventoryItem>, RemoteError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(Self::unreachable());
        }
        Ok(self.inventory.lock().unwrap().clone())
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Self::unreachable())
        }
    }
}

pub(crate) fn item(sku: &str, stock: i64) -> InventoryItem {
    InventoryItem {
        sku: sku.to_string(),
        name: format!("Product {}", sku),
        stock,
        location: None,
    }
}
