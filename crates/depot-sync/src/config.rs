//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     DEPOT_REMOTE_URL=https://sheets-proxy.example/api                  │
//! │     DEPOT_DEVICE_ID=dock-scanner-3                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/depot/sync.toml (Linux)                                  │
//! │     ~/Library/Application Support/com.depot.depot/sync.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     Device id generated once and kept in the local database            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! name = "Dock scanner 3"
//!
//! [remote]
//! base_url = "https://sheets-proxy.example/api/"
//! request_timeout_secs = 15
//!
//! [remote.endpoints]
//! outbound = "shipments"
//!
//! [sync]
//! max_retries = 8
//! initial_backoff_ms = 2000
//! max_backoff_secs = 300
//!
//! [connectivity]
//! settle_ms = 2000
//! probe_enabled = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use depot_core::TransactionKind;

use crate::error::{SyncError, SyncResult};
use crate::retry::{RetryPolicy, MAX_DELAY};

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Fixed device identifier.
    ///
    /// When unset, an id is generated on first run and stored in the local
    /// database. It prefixes every idempotency reference, so changing it
    /// while intents are queued makes their retries look new to the remote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Human-readable device name (e.g., "Dock scanner 3").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Warehouse Terminal".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: None,
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Remote Settings
// =============================================================================

/// Path segments, relative to `base_url`, of each remote endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSettings {
    #[serde(default = "default_inbound_endpoint")]
    pub inbound: String,

    #[serde(default = "default_outbound_endpoint")]
    pub outbound: String,

    #[serde(default = "default_adjust_endpoint")]
    pub adjust: String,

    #[serde(default = "default_damage_endpoint")]
    pub damage: String,

    /// Full inventory snapshot, used by reconciliation.
    #[serde(default = "default_inventory_endpoint")]
    pub inventory: String,

    /// Cheap reachability check, used by the probe.
    #[serde(default = "default_health_endpoint")]
    pub health: String,
}

fn default_inbound_endpoint() -> String {
    "inbound".to_string()
}
fn default_outbound_endpoint() -> String {
    "outbound".to_string()
}
fn default_adjust_endpoint() -> String {
    "adjust".to_string()
}
fn default_damage_endpoint() -> String {
    "damage".to_string()
}
fn default_inventory_endpoint() -> String {
    "inventory".to_string()
}
fn default_health_endpoint() -> String {
    "health".to_string()
}

impl Default for EndpointSettings {
    fn default() -> Self {
        EndpointSettings {
            inbound: default_inbound_endpoint(),
            outbound: default_outbound_endpoint(),
            adjust: default_adjust_endpoint(),
            damage: default_damage_endpoint(),
            inventory: default_inventory_endpoint(),
            health: default_health_endpoint(),
        }
    }
}

impl EndpointSettings {
    /// Returns the endpoint that accepts intents of `kind`.
    pub fn for_kind(&self, kind: TransactionKind) -> &str {
        match kind {
            TransactionKind::Inbound => &self.inbound,
            TransactionKind::Outbound => &self.outbound,
            TransactionKind::Adjust => &self.adjust,
            TransactionKind::Damage => &self.damage,
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("inbound", self.inbound.as_str()),
            ("outbound", self.outbound.as_str()),
            ("adjust", self.adjust.as_str()),
            ("damage", self.damage.as_str()),
            ("inventory", self.inventory.as_str()),
            ("health", self.health.as_str()),
        ]
        .into_iter()
    }
}

/// Where the remote API lives and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the spreadsheet-backed API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub endpoints: EndpointSettings,

    /// Upper bound on a single request (seconds). A submission that runs
    /// longer counts as a transient failure.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080/api/".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            base_url: default_base_url(),
            endpoints: EndpointSettings::default(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Drain and retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Transient failures allowed before an intent needs the operator.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay after the first transient failure (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Ceiling for the doubled delay (seconds, at most one day).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Extra random delay as a fraction of the computed one (0.0 - 1.0).
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// Interval of the periodic drain tick (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Refresh the mirror after a drain empties the queue.
    #[serde(default = "default_true")]
    pub reconcile_on_drain: bool,
}

fn default_max_retries() -> u32 {
    8
}
fn default_initial_backoff() -> u64 {
    2_000
}
fn default_max_backoff() -> u64 {
    300
}
fn default_jitter_ratio() -> f64 {
    0.2
}
fn default_poll_interval() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            jitter_ratio: default_jitter_ratio(),
            poll_interval_secs: default_poll_interval(),
            reconcile_on_drain: true,
        }
    }
}

// =============================================================================
// Connectivity Settings
// =============================================================================

/// Debounce and probe settings for the connectivity monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivitySettings {
    /// How long an observation must hold before the state flips (milliseconds).
    #[serde(default = "default_settle")]
    pub settle_ms: u64,

    /// Ping the remote while offline. For hosts without reachability events.
    #[serde(default)]
    pub probe_enabled: bool,

    /// First delay between probes (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Longest delay between probes (seconds).
    #[serde(default = "default_probe_max_interval")]
    pub probe_max_interval_secs: u64,

    /// Assume the network is up when the agent starts.
    #[serde(default = "default_true")]
    pub assume_online: bool,
}

fn default_settle() -> u64 {
    2_000
}
fn default_probe_interval() -> u64 {
    5
}
fn default_probe_max_interval() -> u64 {
    60
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        ConnectivitySettings {
            settle_ms: default_settle(),
            probe_enabled: false,
            probe_interval_secs: default_probe_interval(),
            probe_max_interval_secs: default_probe_max_interval(),
            assume_online: true,
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub connectivity: ConnectivitySettings,
}

impl SyncConfig {
    /// Creates a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if let Some(ref id) = self.device.id {
            if id.trim().is_empty() {
                return Err(SyncError::InvalidConfig("device.id must not be blank".into()));
            }
        }

        let url = Url::parse(&self.remote.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "Remote URL must start with http:// or https://, got: {}",
                self.remote.base_url
            )));
        }

        for (name, path) in self.remote.endpoints.iter() {
            if path.trim().is_empty() {
                return Err(SyncError::InvalidConfig(format!(
                    "endpoint '{}' must not be empty",
                    name
                )));
            }
        }

        if self.remote.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.sync.max_retries == 0 {
            return Err(SyncError::InvalidConfig(
                "max_retries must be greater than 0".into(),
            ));
        }

        if self.sync.initial_backoff_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "initial_backoff_ms must be greater than 0".into(),
            ));
        }

        let max_backoff = Duration::from_secs(self.sync.max_backoff_secs);
        if max_backoff < Duration::from_millis(self.sync.initial_backoff_ms) {
            return Err(SyncError::InvalidConfig(
                "max_backoff_secs must not be shorter than initial_backoff_ms".into(),
            ));
        }

        if max_backoff > MAX_DELAY {
            return Err(SyncError::InvalidConfig(format!(
                "max_backoff_secs must be at most {}",
                MAX_DELAY.as_secs()
            )));
        }

        if !(0.0..=1.0).contains(&self.sync.jitter_ratio) {
            return Err(SyncError::InvalidConfig(
                "jitter_ratio must be between 0.0 and 1.0".into(),
            ));
        }

        if self.sync.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }

        if self.connectivity.probe_interval_secs == 0
            || self.connectivity.probe_max_interval_secs < self.connectivity.probe_interval_secs
        {
            return Err(SyncError::InvalidConfig(
                "probe intervals must be positive and max >= initial".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup. Unparseable values are logged
    /// and ignored.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("DEPOT_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = Some(id);
        }

        if let Some(name) = lookup("DEPOT_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Some(url) = lookup("DEPOT_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.base_url = url;
        }

        if let Some(raw) = lookup("DEPOT_REQUEST_TIMEOUT_SECS") {
            match raw.parse() {
                Ok(secs) => self.remote.request_timeout_secs = secs,
                Err(_) => warn!(value = %raw, "Ignoring invalid DEPOT_REQUEST_TIMEOUT_SECS"),
            }
        }

        if let Some(raw) = lookup("DEPOT_MAX_RETRIES") {
            match raw.parse() {
                Ok(max) => self.sync.max_retries = max,
                Err(_) => warn!(value = %raw, "Ignoring invalid DEPOT_MAX_RETRIES"),
            }
        }

        if let Some(raw) = lookup("DEPOT_POLL_INTERVAL_SECS") {
            match raw.parse() {
                Ok(secs) => self.sync.poll_interval_secs = secs,
                Err(_) => warn!(value = %raw, "Ignoring invalid DEPOT_POLL_INTERVAL_SECS"),
            }
        }

        if let Some(raw) = lookup("DEPOT_PROBE_ENABLED") {
            match raw.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.connectivity.probe_enabled = true,
                "0" | "false" | "no" | "off" => self.connectivity.probe_enabled = false,
                _ => warn!(value = %raw, "Ignoring invalid DEPOT_PROBE_ENABLED"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "depot", "depot")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the retry policy described by `[sync]`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial: Duration::from_millis(self.sync.initial_backoff_ms),
            max: Duration::from_secs(self.sync.max_backoff_secs),
            jitter_ratio: self.sync.jitter_ratio,
            max_retries: self.sync.max_retries,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.poll_interval_secs)
    }

    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.connectivity.settle_ms)
    }
}
