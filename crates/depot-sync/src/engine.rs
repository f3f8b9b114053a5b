//! # Sync Engine
//!
//! Drains the write-ahead queue against the remote, one intent at a time,
//! strictly in creation order.
//!
//! ## Drain State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          drain()                                        │
//! │                                                                         │
//! │  running? ──yes──► flag re-check, return AlreadyRunning                 │
//! │     │no                                                                 │
//! │     ▼                                                                   │
//! │  ┌──────────── head() ◄──────────────────────────────┐                  │
//! │  │   none ──────────► reconcile if stale ► Drained   │                  │
//! │  │   terminal ──────► Blocked (operator decides)     │                  │
//! │  │   backing off ───► RetryScheduled(at)             │                  │
//! │  │   otherwise                                       │                  │
//! │  │     mark_syncing ► submit(reference) ─┬─ ok ──────┘ mark_synced      │
//! │  │                                       ├─ permanent ► terminal FAILED │
//! │  │                                       └─ transient ► FAILED + backoff│
//! │  └──────────────────────────────────────────────────────────────────────│
//! │                                                                         │
//! │  After the pass: a trigger that arrived meanwhile re-runs it once more  │
//! │  so an intent committed during the last head check is not stranded.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every submission carries `"{device_id}:{id}"` in its `reference` field,
//! stable across retries and restarts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use depot_core::{IntentState, PendingTransaction, SyncStatus, TransactionStatus};
use depot_db::repository::meta::KEY_LAST_SYNCED_AT;
use depot_db::{AttemptFailure, Database};

use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityHandle, ConnectivitySignal};
use crate::error::{RemoteError, SyncResult};
use crate::reconcile::{Reconciler, RefreshReport};
use crate::remote::RemoteClient;
use crate::retry::RetryPolicy;

/// Default upper bound on one submission.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// =============================================================================
// Drain Outcome
// =============================================================================

/// How a drain ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DrainOutcome {
    /// Another drain holds the queue; it will re-check the head.
    AlreadyRunning,
    /// The queue is empty.
    Drained { synced: u32 },
    /// The head needs the operator (rejected, or out of retries).
    Blocked { id: i64, synced: u32 },
    /// The head is backing off until `at`.
    RetryScheduled {
        id: i64,
        at: DateTime<Utc>,
        synced: u32,
    },
}

impl DrainOutcome {
    /// Intents confirmed by this drain.
    pub fn synced(&self) -> u32 {
        match self {
            DrainOutcome::AlreadyRunning => 0,
            DrainOutcome::Drained { synced }
            | DrainOutcome::Blocked { synced, .. }
            | DrainOutcome::RetryScheduled { synced, .. } => *synced,
        }
    }

    /// When the next automatic attempt is due, if one is scheduled.
    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        match self {
            DrainOutcome::RetryScheduled { at, .. } => Some(*at),
            _ => None,
        }
    }
}

enum Attempt {
    Synced,
    Failed(PendingTransaction),
}

/// Clears the running flag even if the drain future is dropped.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Single-flight queue drainer.
pub struct SyncEngine {
    db: Database,
    remote: Arc<dyn RemoteClient>,
    reconciler: Reconciler,
    policy: RetryPolicy,
    request_timeout: Duration,
    device_id: String,
    reconcile_on_drain: bool,
    connectivity: Option<ConnectivityHandle>,

    /// Set while a drain owns the queue.
    running: AtomicBool,
    /// A trigger arrived while running.
    rerun: AtomicBool,
    /// Serializes drains and explicit refreshes against the remote.
    gate: Mutex<()>,
    last_error: RwLock<Option<String>>,
}

impl SyncEngine {
    /// Creates an engine with default policy and timeout.
    pub fn new(db: Database, remote: Arc<dyn RemoteClient>, device_id: impl Into<String>) -> Self {
        let reconciler = Reconciler::new(db.clone(), remote.clone());

        SyncEngine {
            db,
            remote,
            reconciler,
            policy: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            device_id: device_id.into(),
            reconcile_on_drain: true,
            connectivity: None,
            running: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            gate: Mutex::new(()),
            last_error: RwLock::new(None),
        }
    }

    /// Creates an engine with settings from `config`.
    pub fn from_config(
        db: Database,
        remote: Arc<dyn RemoteClient>,
        device_id: impl Into<String>,
        config: &SyncConfig,
    ) -> Self {
        Self::new(db, remote, device_id)
            .with_policy(config.retry_policy())
            .with_request_timeout(config.request_timeout())
            .with_reconcile_on_drain(config.sync.reconcile_on_drain)
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_reconcile_on_drain(mut self, enabled: bool) -> Self {
        self.reconcile_on_drain = enabled;
        self
    }

    /// Reports call results to a connectivity monitor.
    pub fn with_connectivity(mut self, handle: ConnectivityHandle) -> Self {
        self.connectivity = Some(handle);
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Returns true while a drain is in progress.
    pub fn is_draining(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Most recent failure, cleared by the next successful submission.
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    // =========================================================================
    // Drain
    // =========================================================================

    /// Drains the queue until it is empty or the head cannot proceed.
    ///
    /// ## Returns
    /// * `Ok(DrainOutcome::AlreadyRunning)` - Another drain is active
    /// * `Ok(..)` - Where this drain stopped
    /// * `Err(SyncError::Database)` - The local store failed; nothing is lost
    pub async fn drain(&self) -> SyncResult<DrainOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.rerun.store(true, Ordering::Release);
            debug!("Drain already running, flagged for re-check");
            return Ok(DrainOutcome::AlreadyRunning);
        }

        let mut synced = 0u32;
        loop {
            let result = {
                let _running = RunningGuard(&self.running);
                let _gate = self.gate.lock().await;
                self.rerun.store(false, Ordering::Release);
                self.drain_pass(&mut synced).await
            };

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Drain aborted");
                    *self.last_error.write().await = Some(e.to_string());
                    return Err(e);
                }
            };

            if self.rerun.swap(false, Ordering::AcqRel)
                && self
                    .running
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                debug!("Re-checking queue head after a concurrent trigger");
                continue;
            }

            info!(?outcome, "Drain finished");
            return Ok(outcome);
        }
    }

    async fn drain_pass(&self, synced: &mut u32) -> SyncResult<DrainOutcome> {
        let queue = self.db.queue();

        loop {
            let Some(head) = queue.head().await? else {
                self.reconcile_if_stale().await;
                return Ok(DrainOutcome::Drained { synced: *synced });
            };

            let now = Utc::now();
            match head.state() {
                IntentState::NeedsAttention => {
                    debug!(id = head.id, "Queue head needs attention");
                    return Ok(DrainOutcome::Blocked {
                        id: head.id,
                        synced: *synced,
                    });
                }
                IntentState::Retrying if !head.is_due(now) => {
                    return Ok(DrainOutcome::RetryScheduled {
                        id: head.id,
                        at: head.next_attempt_at.unwrap_or(now),
                        synced: *synced,
                    });
                }
                IntentState::Syncing => {
                    // Only a drain sets SYNCING and we hold the flag, so this
                    // attempt was abandoned mid-flight.
                    warn!(id = head.id, "Recovering abandoned in-flight intent");
                    queue.recover_in_flight().await?;
                    continue;
                }
                IntentState::Pending | IntentState::Retrying => {}
            }

            match self.attempt(&head).await? {
                Attempt::Synced => *synced += 1,
                Attempt::Failed(row) if row.terminal => {
                    return Ok(DrainOutcome::Blocked {
                        id: row.id,
                        synced: *synced,
                    });
                }
                Attempt::Failed(row) => {
                    return Ok(DrainOutcome::RetryScheduled {
                        id: row.id,
                        at: row.next_attempt_at.unwrap_or(now),
                        synced: *synced,
                    });
                }
            }
        }
    }

    /// Submits the head once.
    async fn attempt(&self, head: &PendingTransaction) -> SyncResult<Attempt> {
        let queue = self.db.queue();
        let row = queue.mark_syncing(head.id).await?;
        let reference = row.reference(&self.device_id);

        let body = match row
            .decode()
            .and_then(|payload| payload.with_reference(reference.as_str()).to_value())
        {
            Ok(body) => body,
            Err(e) => {
                error!(id = row.id, error = %e, "Queued body cannot be decoded");
                let failure = AttemptFailure {
                    retry_count: row.retry_count,
                    terminal: true,
                    error: format!("undecodable payload: {}", e),
                    next_attempt_at: None,
                };
                return self.record_failure(&row, failure).await;
            }
        };

        info!(
            id = row.id,
            kind = %row.kind,
            reference = %reference,
            retry_count = row.retry_count,
            "Submitting intent"
        );

        let result = match tokio::time::timeout(
            self.request_timeout,
            self.remote.submit(row.kind, &body),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.request_timeout.as_millis() as u64)),
        };

        match result {
            Ok(receipt) => {
                if receipt.duplicate {
                    info!(id = row.id, reference = %reference, "Remote already applied this intent");
                }

                queue.mark_synced(row.id).await?;
                self.report(ConnectivitySignal::CallSucceeded);
                *self.last_error.write().await = None;

                if let Err(e) = self
                    .db
                    .meta()
                    .set_timestamp(KEY_LAST_SYNCED_AT, Utc::now())
                    .await
                {
                    warn!(error = %e, "Failed to record last sync time");
                }

                Ok(Attempt::Synced)
            }
            Err(e) => {
                if e.is_network() {
                    self.report(ConnectivitySignal::NetworkFailure);
                }
                let failure = self.policy.failure_for(row.retry_count, &e, Utc::now());
                self.record_failure(&row, failure).await
            }
        }
    }

    async fn record_failure(
        &self,
        row: &PendingTransaction,
        failure: AttemptFailure,
    ) -> SyncResult<Attempt> {
        *self.last_error.write().await = Some(failure.error.clone());
        let failed = self.db.queue().mark_failed(row.id, &failure).await?;
        Ok(Attempt::Failed(failed))
    }

    fn report(&self, signal: ConnectivitySignal) {
        if let Some(ref connectivity) = self.connectivity {
            connectivity.signal(signal);
        }
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Reconciles if the store carries a staleness mark, whichever process
    /// wrote it.
    async fn reconcile_if_stale(&self) {
        if !self.reconcile_on_drain {
            return;
        }

        match self.db.meta().mirror_stale_mark().await {
            Ok(Some(_)) => {
                if let Err(e) = self.reconciler.refresh().await {
                    warn!(error = %e, "Reconciliation failed, will retry after the next drain");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read mirror staleness"),
        }
    }

    /// Refreshes the mirror now, waiting for a running drain to finish first.
    pub async fn refresh(&self) -> SyncResult<RefreshReport> {
        let _gate = self.gate.lock().await;
        self.reconciler.refresh().await
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Builds the status the indicator shows.
    pub async fn status(&self, is_online: bool) -> SyncResult<SyncStatus> {
        let queue = self.db.queue();

        let last_error = match self.last_error().await {
            Some(e) => Some(e),
            None => queue
                .head()
                .await?
                .filter(|head| head.status == TransactionStatus::Failed)
                .and_then(|head| head.last_error),
        };

        Ok(SyncStatus {
            is_online,
            is_syncing: self.is_draining(),
            pending_count: queue.count_pending().await?,
            failed_count: queue.count_failed().await?,
            needs_attention_count: queue.count_needs_attention().await?,
            last_synced_at: self.db.meta().get_timestamp(KEY_LAST_SYNCED_AT).await?,
            last_error,
        })
    }
}
