//! # Connectivity Monitor
//!
//! Turns noisy reachability evidence into stable online/offline edges.
//!
//! ## Signal Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Connectivity Monitor                              │
//! │                                                                         │
//! │  PlatformOnline / PlatformOffline   ◄── host reachability events        │
//! │  CallSucceeded / NetworkFailure     ◄── sync engine, probe              │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌───────────────────────────────┐                                      │
//! │  │ Debouncer                     │  an observation must hold for        │
//! │  │   stable ── pending(since) ──►│  `settle` before the state flips;    │
//! │  │   ▲            │ opposing     │  an opposing observation cancels     │
//! │  │   └────────────┘ observation  │                                      │
//! │  └──────────────┬────────────────┘                                      │
//! │                 ▼                                                       │
//! │        watch::Sender<bool>  ──► agent loop (drain on online edge)       │
//! │                                                                         │
//! │  ConnectivityProbe: while offline, ping the remote with exponential    │
//! │  backoff and feed the result back in as evidence.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::remote::RemoteClient;

/// Buffered signals before new ones are dropped.
const SIGNAL_BUFFER: usize = 64;

// =============================================================================
// Signals
// =============================================================================

/// One piece of reachability evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivitySignal {
    /// The host reports the network is up.
    PlatformOnline,
    /// The host reports the network is gone.
    PlatformOffline,
    /// A remote call completed.
    CallSucceeded,
    /// A remote call failed at the network layer.
    NetworkFailure,
}

impl ConnectivitySignal {
    pub fn indicates_online(self) -> bool {
        matches!(
            self,
            ConnectivitySignal::PlatformOnline | ConnectivitySignal::CallSucceeded
        )
    }
}

// =============================================================================
// Debouncer
// =============================================================================

/// Settle-window state machine. Pure; the caller supplies the clock.
#[derive(Debug, Clone)]
pub struct Debouncer {
    online: bool,
    settle: Duration,
    pending: Option<(bool, Instant)>,
}

impl Debouncer {
    pub fn new(online: bool, settle: Duration) -> Self {
        Debouncer {
            online,
            settle,
            pending: None,
        }
    }

    /// The published, stable state.
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// When a pending flip matures, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, since)| since + self.settle)
    }

    /// Records an observation.
    ///
    /// ## Returns
    /// The new stable state if it flipped.
    pub fn observe(&mut self, online: bool, now: Instant) -> Option<bool> {
        // A flip that matured before this observation still counts.
        if let Some(flipped) = self.poll(now) {
            if online != flipped {
                self.pending = Some((online, now));
            }
            return Some(flipped);
        }

        if online == self.online {
            if self.pending.take().is_some() {
                debug!(online, "Pending connectivity flip cancelled");
            }
            return None;
        }

        if self.settle.is_zero() {
            self.online = online;
            return Some(online);
        }

        match self.pending {
            Some((target, _)) if target == online => {}
            _ => self.pending = Some((online, now)),
        }
        None
    }

    /// Completes a pending flip whose window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<bool> {
        match self.pending {
            Some((target, since)) if now >= since + self.settle => {
                self.pending = None;
                self.online = target;
                Some(target)
            }
            _ => None,
        }
    }
}

// =============================================================================
// Monitor Task
// =============================================================================

/// Background task owning the debouncer.
pub struct ConnectivityMonitor {
    debouncer: Debouncer,
    signal_rx: mpsc::Receiver<ConnectivitySignal>,
    state_tx: watch::Sender<bool>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for feeding and reading the monitor.
#[derive(Debug, Clone)]
pub struct ConnectivityHandle {
    signal_tx: mpsc::Sender<ConnectivitySignal>,
    state_rx: watch::Receiver<bool>,
    shutdown_tx: mpsc::Sender<()>,
}

impl ConnectivityMonitor {
    /// Creates the monitor and its handle.
    pub fn new(initial_online: bool, settle: Duration) -> (Self, ConnectivityHandle) {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_BUFFER);
        let (state_tx, state_rx) = watch::channel(initial_online);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let monitor = ConnectivityMonitor {
            debouncer: Debouncer::new(initial_online, settle),
            signal_rx,
            state_tx,
            shutdown_rx,
        };

        let handle = ConnectivityHandle {
            signal_tx,
            state_rx,
            shutdown_tx,
        };

        (monitor, handle)
    }

    /// Runs until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        info!(online = self.debouncer.is_online(), "Connectivity monitor starting");

        loop {
            let deadline = self.debouncer.deadline();

            tokio::select! {
                signal = self.signal_rx.recv() => {
                    let Some(signal) = signal else { break };
                    debug!(?signal, "Connectivity evidence");
                    if let Some(online) = self.debouncer.observe(signal.indicates_online(), Instant::now()) {
                        self.publish(online);
                    }
                }

                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(online) = self.debouncer.poll(Instant::now()) {
                        self.publish(online);
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Connectivity monitor received shutdown");
                    break;
                }
            }
        }

        info!("Connectivity monitor stopped");
    }

    fn publish(&self, online: bool) {
        info!(online, "Connectivity changed");
        self.state_tx.send_replace(online);
    }
}

impl ConnectivityHandle {
    /// Feeds one observation. Never blocks; drops it if the buffer is full.
    pub fn signal(&self, signal: ConnectivitySignal) {
        if let Err(e) = self.signal_tx.try_send(signal) {
            debug!(?signal, error = %e, "Connectivity signal dropped");
        }
    }

    /// The current stable state.
    pub fn is_online(&self) -> bool {
        *self.state_rx.borrow()
    }

    /// A receiver that wakes on every stable edge.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state_rx.clone()
    }

    /// Signals the monitor to shut down.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Active Probe
// =============================================================================

/// Pings the remote while offline so hosts without reachability events
/// still come back online.
pub struct ConnectivityProbe {
    remote: Arc<dyn RemoteClient>,
    monitor: ConnectivityHandle,
    initial_interval: Duration,
    max_interval: Duration,
}

impl ConnectivityProbe {
    pub fn new(
        remote: Arc<dyn RemoteClient>,
        monitor: ConnectivityHandle,
        initial_interval: Duration,
        max_interval: Duration,
    ) -> Self {
        ConnectivityProbe {
            remote,
            monitor,
            initial_interval,
            max_interval,
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Runs until the monitor stops.
    pub async fn run(self) {
        let mut state_rx = self.monitor.subscribe();
        let mut backoff = self.create_backoff();

        loop {
            if *state_rx.borrow_and_update() {
                backoff.reset();
                if state_rx.changed().await.is_err() {
                    break;
                }
                continue;
            }

            match self.remote.ping().await {
                Ok(()) => {
                    debug!("Probe reached the remote");
                    self.monitor.signal(ConnectivitySignal::CallSucceeded);
                }
                Err(e) => {
                    debug!(error = %e, "Probe failed");
                    if e.is_network() {
                        self.monitor.signal(ConnectivitySignal::NetworkFailure);
                    }
                }
            }

            let delay = backoff.next_backoff().unwrap_or(self.max_interval);
            debug!(?delay, "Next probe scheduled");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Connectivity probe stopped");
    }
}
