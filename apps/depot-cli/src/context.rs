//! # Command Context
//!
//! Owns the database handle and sync configuration for one CLI invocation.
//! Commands borrow it; nothing here is global.

use std::sync::Arc;

use depot_db::Database;
use depot_sync::{HttpRemote, RemoteClient, SyncConfig, SyncEngine};

use crate::error::ApiError;

/// Database, config and remote for one invocation.
pub struct AppContext {
    db: Database,
    config: SyncConfig,
    remote: Option<Arc<dyn RemoteClient>>,
}

impl AppContext {
    /// Creates a context that talks to the configured HTTP remote.
    pub fn new(db: Database, config: SyncConfig) -> Self {
        AppContext {
            db,
            config,
            remote: None,
        }
    }

    /// Creates a context with an explicit remote client.
    pub fn with_remote(db: Database, config: SyncConfig, remote: Arc<dyn RemoteClient>) -> Self {
        AppContext {
            db,
            config,
            remote: Some(remote),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The configured device id, else the one stored on first run.
    pub async fn device_id(&self) -> Result<String, ApiError> {
        match self.config.device.id.clone() {
            Some(id) => Ok(id),
            None => Ok(self.db.meta().device_id().await?),
        }
    }

    /// Remote client, built lazily so offline commands never need a valid URL.
    pub fn remote(&self) -> Result<Arc<dyn RemoteClient>, ApiError> {
        match &self.remote {
            Some(remote) => Ok(remote.clone()),
            None => Ok(Arc::new(HttpRemote::new(&self.config.remote)?)),
        }
    }

    /// One-shot engine for commands that drain without the agent.
    pub async fn engine(&self) -> Result<SyncEngine, ApiError> {
        let device_id = self.device_id().await?;
        Ok(SyncEngine::from_config(
            self.db.clone(),
            self.remote()?,
            device_id,
            &self.config,
        ))
    }
}
