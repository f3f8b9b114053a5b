//! # Sync Agent
//!
//! Main orchestrator for the sync engine. Wires the connectivity monitor to
//! the drain engine and turns every trigger into at most one running drain.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Architecture                           │
//! │                                                                         │
//! │  SyncAgentHandle (UI / CLI)                                             │
//! │   enqueue · status · retry_now · discard · trigger · refresh · signal   │
//! │        │ commands                          │ signals                    │
//! │        ▼                                   ▼                            │
//! │  ┌──────────────────────────┐     ┌────────────────────────┐           │
//! │  │      agent loop          │◄────│ ConnectivityMonitor    │           │
//! │  │      tokio::select!      │edges│ (+ optional probe)     │           │
//! │  │                          │     └────────────────────────┘           │
//! │  │  • online edge           │                 ▲ call results           │
//! │  │  • command (trigger)     │                 │                        │
//! │  │  • periodic tick         │     ┌───────────┴────────────┐           │
//! │  │  • retry timer           │────►│ SyncEngine::drain      │           │
//! │  │  • drain completion      │spawn│ (single-flight)        │           │
//! │  │  • shutdown              │◄────│                        │           │
//! │  └──────────────────────────┘done └────────────────────────┘           │
//! │                                                                         │
//! │  STATUS EVENTS (SyncEventEmitter):                                     │
//! │  emit_status   - SyncStatus after every edge and drain                 │
//! │  emit_progress - pending count and intents synced by the last drain    │
//! │  emit_error    - blocked heads and failed drains                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use depot_core::{PendingTransaction, SyncState, SyncStatus, TransactionPayload};
use depot_db::Database;

use crate::config::SyncConfig;
use crate::connectivity::{
    ConnectivityHandle, ConnectivityMonitor, ConnectivityProbe, ConnectivitySignal,
};
use crate::engine::{DrainOutcome, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::reconcile::RefreshReport;
use crate::remote::{HttpRemote, RemoteClient};

/// Commands buffered before senders wait.
const COMMAND_BUFFER: usize = 32;

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives sync events for display.
pub trait SyncEventEmitter: Send + Sync {
    /// Emits a sync status change event.
    fn emit_status(&self, status: &SyncStatus);

    /// Emits a sync progress event.
    fn emit_progress(&self, pending: i64, synced: u32);

    /// Emits a sync error event.
    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_progress(&self, _pending: i64, _synced: u32) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Commands
// =============================================================================

/// Why a drain was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReason {
    Startup,
    Online,
    Enqueued,
    Tick,
    RetryTimer,
    Manual,
    RetryNow,
    Discard,
}

impl fmt::Display for DrainReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DrainReason::Startup => "startup",
            DrainReason::Online => "online",
            DrainReason::Enqueued => "enqueued",
            DrainReason::Tick => "tick",
            DrainReason::RetryTimer => "retry_timer",
            DrainReason::Manual => "manual",
            DrainReason::RetryNow => "retry_now",
            DrainReason::Discard => "discard",
        };
        write!(f, "{}", s)
    }
}

/// Messages consumed by the agent loop.
#[derive(Debug)]
pub enum AgentCommand {
    Trigger(DrainReason),
    Shutdown,
}

// =============================================================================
// Sync Agent
// =============================================================================

/// Main sync agent that orchestrates all sync operations.
pub struct SyncAgent {
    config: Arc<SyncConfig>,
    db: Database,
    remote: Arc<dyn RemoteClient>,
    emitter: Arc<dyn SyncEventEmitter>,
}

impl SyncAgent {
    /// Creates a new sync agent.
    pub fn new(config: SyncConfig, db: Database, remote: Arc<dyn RemoteClient>) -> Self {
        Self::with_emitter(config, db, remote, Arc::new(NoOpEmitter))
    }

    /// Creates a new sync agent with a custom event emitter.
    pub fn with_emitter(
        config: SyncConfig,
        db: Database,
        remote: Arc<dyn RemoteClient>,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        SyncAgent {
            config: Arc::new(config),
            db,
            remote,
            emitter,
        }
    }

    /// Starts the agent.
    ///
    /// ## What This Does
    /// 1. Resolves the device id (config, else generated and stored)
    /// 2. Returns intents left SYNCING by a previous run to PENDING
    /// 3. Spawns the connectivity monitor (and probe, if enabled)
    /// 4. Spawns the agent loop, which drains right away when online
    pub async fn start(self) -> SyncResult<SyncAgentHandle> {
        self.config.validate()?;

        let device_id = match self.config.device.id.clone() {
            Some(id) => id,
            None => self.db.meta().device_id().await?,
        };

        let recovered = self.db.queue().recover_in_flight().await?;

        info!(
            device_id = %device_id,
            remote = %self.config.remote.base_url,
            recovered,
            "Starting sync agent"
        );

        let (monitor, connectivity) = ConnectivityMonitor::new(
            self.config.connectivity.assume_online,
            self.config.settle_window(),
        );
        tokio::spawn(monitor.run());

        if self.config.connectivity.probe_enabled {
            let probe = ConnectivityProbe::new(
                self.remote.clone(),
                connectivity.clone(),
                Duration::from_secs(self.config.connectivity.probe_interval_secs),
                Duration::from_secs(self.config.connectivity.probe_max_interval_secs),
            );
            tokio::spawn(probe.run());
        }

        let engine = Arc::new(
            SyncEngine::from_config(self.db.clone(), self.remote.clone(), device_id, &self.config)
                .with_connectivity(connectivity.clone()),
        );

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (done_tx, done_rx) = mpsc::channel(COMMAND_BUFFER);

        let agent_loop = AgentLoop {
            engine: engine.clone(),
            emitter: self.emitter.clone(),
            online_rx: connectivity.subscribe(),
            command_rx,
            done_tx,
            done_rx,
            poll_interval: self.config.poll_interval(),
            retry_at: None,
        };
        tokio::spawn(agent_loop.run());

        info!("Sync agent started");

        Ok(SyncAgentHandle {
            db: self.db,
            engine,
            connectivity,
            command_tx,
        })
    }
}

// =============================================================================
// Agent Loop
// =============================================================================

struct AgentLoop {
    engine: Arc<SyncEngine>,
    emitter: Arc<dyn SyncEventEmitter>,
    online_rx: watch::Receiver<bool>,
    command_rx: mpsc::Receiver<AgentCommand>,
    done_tx: mpsc::Sender<SyncResult<DrainOutcome>>,
    done_rx: mpsc::Receiver<SyncResult<DrainOutcome>>,
    poll_interval: Duration,
    /// When the backing-off head becomes due.
    retry_at: Option<Instant>,
}

impl AgentLoop {
    async fn run(mut self) {
        let mut tick = tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if self.is_online() {
            self.spawn_drain(DrainReason::Startup);
        }
        self.publish_status().await;

        loop {
            let retry_at = self.retry_at;

            tokio::select! {
                changed = self.online_rx.changed() => {
                    if changed.is_err() {
                        warn!("Connectivity monitor stopped");
                        break;
                    }
                    let online = *self.online_rx.borrow_and_update();
                    info!(online, "Connectivity edge");
                    if online {
                        self.spawn_drain(DrainReason::Online);
                    }
                    self.publish_status().await;
                }

                command = self.command_rx.recv() => {
                    match command {
                        Some(AgentCommand::Trigger(reason)) => {
                            // Operator actions drain even when we believe we are
                            // offline; the attempt itself is fresh evidence.
                            if self.is_online() || reason != DrainReason::Enqueued {
                                self.spawn_drain(reason);
                            }
                            self.publish_status().await;
                        }
                        Some(AgentCommand::Shutdown) | None => {
                            info!("Agent loop received shutdown");
                            break;
                        }
                    }
                }

                _ = tick.tick() => {
                    if self.is_online() {
                        self.spawn_drain(DrainReason::Tick);
                    }
                }

                _ = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.retry_at = None;
                    if self.is_online() {
                        self.spawn_drain(DrainReason::RetryTimer);
                    }
                }

                Some(result) = self.done_rx.recv() => {
                    self.handle_outcome(result).await;
                }
            }
        }

        info!("Agent loop stopped");
    }

    fn is_online(&self) -> bool {
        *self.online_rx.borrow()
    }

    fn spawn_drain(&self, reason: DrainReason) {
        debug!(%reason, "Drain requested");
        let engine = self.engine.clone();
        let done_tx = self.done_tx.clone();

        tokio::spawn(async move {
            let result = engine.drain().await;
            let _ = done_tx.send(result).await;
        });
    }

    async fn handle_outcome(&mut self, result: SyncResult<DrainOutcome>) {
        match result {
            Ok(DrainOutcome::AlreadyRunning) => return,
            Ok(DrainOutcome::RetryScheduled { id, at, .. }) => {
                let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                debug!(id, ?wait, "Retry timer armed");
                self.retry_at = Some(Instant::now() + wait);
            }
            Ok(DrainOutcome::Blocked { id, .. }) => {
                self.retry_at = None;
                let message = match self.engine.last_error().await {
                    Some(e) => format!("intent {} needs attention: {}", id, e),
                    None => format!("intent {} needs attention", id),
                };
                self.emitter.emit_error(&message, false);
            }
            Ok(DrainOutcome::Drained { .. }) => self.retry_at = None,
            Err(ref e) => {
                error!(error = %e, "Drain failed");
                self.emitter.emit_error(&e.to_string(), e.is_retryable());
            }
        }

        if let Ok(ref outcome) = result {
            if let Ok(pending) = self.engine.database().queue().count_pending().await {
                self.emitter.emit_progress(pending, outcome.synced());
            }
        }

        self.publish_status().await;
    }

    async fn publish_status(&self) {
        match self.engine.status(self.is_online()).await {
            Ok(status) => self.emitter.emit_status(&status),
            Err(e) => warn!(error = %e, "Failed to read sync status"),
        }
    }
}

// =============================================================================
// Agent Handle (for external control)
// =============================================================================

/// Handle for controlling a running SyncAgent from outside.
#[derive(Clone)]
pub struct SyncAgentHandle {
    db: Database,
    engine: Arc<SyncEngine>,
    connectivity: ConnectivityHandle,
    command_tx: mpsc::Sender<AgentCommand>,
}

impl SyncAgentHandle {
    /// Queues an intent and, when online, starts draining right away.
    ///
    /// ## Returns
    /// * `Ok(PendingTransaction)` - Durably queued; the mirror shows its effect
    /// * `Err(SyncError::Database)` - Rejected or not stored; nothing was queued
    pub async fn enqueue(&self, payload: &TransactionPayload) -> SyncResult<PendingTransaction> {
        let row = self.db.queue().enqueue(payload).await?;
        if self.connectivity.is_online() {
            self.nudge(DrainReason::Enqueued).await;
        }
        Ok(row)
    }

    /// Gets the current sync status.
    pub async fn status(&self) -> SyncResult<SyncStatus> {
        self.engine.status(self.connectivity.is_online()).await
    }

    /// The indicator view of [`status`](Self::status).
    pub async fn state(&self) -> SyncResult<SyncState> {
        Ok(self.status().await?.state())
    }

    /// Clears a FAILED intent's backoff or terminal mark and drains.
    pub async fn retry_now(&self, id: i64) -> SyncResult<PendingTransaction> {
        let row = self.db.queue().retry_now(id).await?;
        self.nudge(DrainReason::RetryNow).await;
        Ok(row)
    }

    /// Drops a FAILED intent without contacting the remote, then drains
    /// whatever it was blocking.
    pub async fn discard(&self, id: i64) -> SyncResult<PendingTransaction> {
        let row = self.db.queue().discard(id).await?;
        self.nudge(DrainReason::Discard).await;
        Ok(row)
    }

    /// Requests a drain.
    pub async fn trigger(&self) -> SyncResult<()> {
        self.command_tx
            .send(AgentCommand::Trigger(DrainReason::Manual))
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }

    /// Replaces the mirror with the remote snapshot now.
    pub async fn refresh(&self) -> SyncResult<RefreshReport> {
        self.engine.refresh().await
    }

    /// Feeds a platform reachability event.
    pub fn signal(&self, signal: ConnectivitySignal) {
        self.connectivity.signal(signal);
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Signals the agent to shut down gracefully.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(AgentCommand::Shutdown).await;
        self.connectivity.shutdown().await;
    }

    /// Triggers after a state change that already committed; a stopped
    /// agent must not turn that success into an error.
    async fn nudge(&self, reason: DrainReason) {
        if self.command_tx.send(AgentCommand::Trigger(reason)).await.is_err() {
            debug!(%reason, "Agent stopped, drain not triggered");
        }
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating SyncAgent with options.
pub struct SyncAgentBuilder {
    config: SyncConfig,
    db: Option<Database>,
    remote: Option<Arc<dyn RemoteClient>>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
}

impl SyncAgentBuilder {
    /// Creates a new builder with the given config.
    pub fn new(config: SyncConfig) -> Self {
        SyncAgentBuilder {
            config,
            db: None,
            remote: None,
            emitter: None,
        }
    }

    /// Sets the database connection.
    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    /// Sets the remote client. Defaults to HTTP against `[remote]`.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteClient>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Sets the event emitter.
    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Builds the SyncAgent.
    pub fn build(self) -> SyncResult<SyncAgent> {
        let db = self
            .db
            .ok_or_else(|| SyncError::InvalidConfig("Database required".into()))?;

        let remote: Arc<dyn RemoteClient> = match self.remote {
            Some(remote) => remote,
            None => Arc::new(HttpRemote::new(&self.config.remote)?),
        };

        let emitter: Arc<dyn SyncEventEmitter> =
            self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));

        Ok(SyncAgent::with_emitter(self.config, db, remote, emitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::test_support::{item, Scripted, ScriptedRemote};
    use depot_core::OutboundShipment;
    use depot_db::DbConfig;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEmitter {
        statuses: Mutex<Vec<SyncStatus>>,
        errors: Mutex<Vec<(String, bool)>>,
    }

    impl SyncEventEmitter for RecordingEmitter {
        fn emit_status(&self, status: &SyncStatus) {
            self.statuses.lock().unwrap().push(status.clone());
        }
        fn emit_progress(&self, _pending: i64, _synced: u32) {}
        fn emit_error(&self, message: &str, retryable: bool) {
            self.errors.lock().unwrap().push((message.to_string(), retryable));
        }
    }

    fn test_config(assume_online: bool) -> SyncConfig {
        let mut config = SyncConfig::default();
        config.device.id = Some("dev".to_string());
        config.connectivity.settle_ms = 10;
        config.connectivity.assume_online = assume_online;
        config.sync.poll_interval_secs = 3_600;
        config.sync.initial_backoff_ms = 5;
        config.sync.max_backoff_secs = 1;
        config.sync.jitter_ratio = 0.0;
        config
    }

    fn ship(sku: &str, quantity: i64) -> TransactionPayload {
        TransactionPayload::Outbound(OutboundShipment::new(sku, quantity))
    }

    async fn start(
        config: SyncConfig,
        remote: &Arc<ScriptedRemote>,
    ) -> (Database, SyncAgentHandle, Arc<RecordingEmitter>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let emitter = Arc::new(RecordingEmitter::default());
        let handle = SyncAgentBuilder::new(config)
            .with_database(db.clone())
            .with_remote(remote.clone())
            .with_emitter(emitter.clone())
            .build()
            .unwrap()
            .start()
            .await
            .unwrap();
        (db, handle, emitter)
    }

    async fn wait_for_pending(handle: &SyncAgentHandle, expected: i64) {
        for _ in 0..200 {
            let status = handle.status().await.unwrap();
            if status.pending_count == expected && !status.is_syncing {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("pending count never reached {}", expected);
    }

    #[tokio::test]
    async fn test_online_edge_drains_offline_queue() {
        let remote = Arc::new(ScriptedRemote::new());
        let (_db, handle, emitter) = start(test_config(false), &remote).await;

        for sku in ["A1", "B2", "C3"] {
            handle.enqueue(&ship(sku, 1)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(remote.submitted().is_empty());

        let state = handle.state().await.unwrap();
        assert!(!state.is_online);
        assert_eq!(state.pending_count, 3);

        handle.signal(ConnectivitySignal::PlatformOnline);
        wait_for_pending(&handle, 0).await;

        assert_eq!(remote.submitted_references(), vec!["dev:1", "dev:2", "dev:3"]);
        assert!(handle.is_online());
        assert!(emitter.statuses.lock().unwrap().iter().any(|s| s.is_online));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_while_online_drains_immediately() {
        let remote = Arc::new(ScriptedRemote::new().with_inventory(vec![item("A1", 9)]));
        let (db, handle, _) = start(test_config(true), &remote).await;

        let row = handle.enqueue(&ship("A1", 4)).await.unwrap();
        assert_eq!(row.id, 1);

        wait_for_pending(&handle, 0).await;
        assert_eq!(remote.stock("A1"), Some(5));

        // Reconciled after the drain emptied the queue.
        for _ in 0..100 {
            if db.mirror().get("A1").await.unwrap().map(|p| p.stock) == Some(5) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(db.mirror().get("A1").await.unwrap().unwrap().stock, 5);

        let status = handle.status().await.unwrap();
        assert!(status.last_synced_at.is_some());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_retry_timer_resumes_after_backoff() {
        let remote = Arc::new(ScriptedRemote::new());
        remote.script([Scripted::Fail(RemoteError::from_status(503, "busy"))]);
        let (_db, handle, _) = start(test_config(true), &remote).await;

        handle.enqueue(&ship("A1", 1)).await.unwrap();
        wait_for_pending(&handle, 0).await;

        assert_eq!(remote.submitted_references(), vec!["dev:1", "dev:1"]);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_discard_unblocks_queue() {
        let remote = Arc::new(ScriptedRemote::new());
        remote.script([Scripted::Fail(RemoteError::from_status(400, "bad sku"))]);
        let (db, handle, emitter) = start(test_config(true), &remote).await;

        handle.enqueue(&ship("BAD", 1)).await.unwrap();
        handle.enqueue(&ship("A1", 1)).await.unwrap();

        for _ in 0..100 {
            if handle.status().await.unwrap().needs_attention_count == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.status().await.unwrap().needs_attention_count, 1);
        assert!(matches!(
            handle.retry_now(2).await,
            Err(SyncError::Database(depot_db::DbError::InvalidState(_)))
        ));

        let discarded = handle.discard(1).await.unwrap();
        assert_eq!(discarded.id, 1);
        wait_for_pending(&handle, 0).await;

        assert_eq!(remote.submitted_references(), vec!["dev:1", "dev:2"]);
        assert!(db.queue().get(1).await.unwrap().is_none());
        assert!(emitter
            .errors
            .lock()
            .unwrap()
            .iter()
            .any(|(message, retryable)| message.contains("bad sku") && !retryable));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_manual_trigger_and_refresh() {
        let remote = Arc::new(ScriptedRemote::new().with_inventory(vec![item("A1", 2), item("B2", 8)]));
        let (db, handle, _) = start(test_config(false), &remote).await;

        let report = handle.refresh().await.unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(db.mirror().count().await.unwrap(), 2);

        handle.enqueue(&ship("B2", 3)).await.unwrap();
        handle.trigger().await.unwrap();
        wait_for_pending(&handle, 0).await;
        assert_eq!(remote.stock("B2"), Some(5));

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(handle.trigger().await, Err(SyncError::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_start_recovers_in_flight_rows() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.queue().enqueue(&ship("A1", 1)).await.unwrap();
        db.queue().mark_syncing(1).await.unwrap();

        let remote = Arc::new(ScriptedRemote::new());
        let handle = SyncAgent::new(test_config(true), db.clone(), remote.clone())
            .start()
            .await
            .unwrap();

        wait_for_pending(&handle, 0).await;
        assert_eq!(remote.submitted_references(), vec!["dev:1"]);
        handle.shutdown().await;
    }
}
