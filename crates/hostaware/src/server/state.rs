//! Server State
//!
//! Shared state accessible by every connection handler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use hostaware_runtime::ManagerHandle;

use crate::config::Config;
use crate::logging::LogControl;

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<ServerStateInner>,
}

struct ServerStateInner {
    manager: ManagerHandle,

    /// Active configuration, replaced on reload
    config: RwLock<Config>,

    /// File the configuration was read from (for reloading)
    config_path: PathBuf,

    log: LogControl,
}

impl ServerState {
    pub fn new(manager: ManagerHandle, config: Config, config_path: PathBuf, log: LogControl) -> Self {
        Self {
            inner: Arc::new(ServerStateInner {
                manager,
                config: RwLock::new(config),
                config_path,
                log,
            }),
        }
    }

    pub fn manager(&self) -> &ManagerHandle {
        &self.inner.manager
    }

    /// Snapshot of the active configuration
    pub async fn config(&self) -> Config {
        self.inner.config.read().await.clone()
    }

    pub fn config_path(&self) -> &Path {
        &self.inner.config_path
    }

    pub fn log(&self) -> &LogControl {
        &self.inner.log
    }

    /// Apply `config`'s log level, then make it the active configuration
    ///
    /// Holds the config write lock across both steps.
    pub async fn replace_config(&self, config: Config) -> Result<(), crate::config::ConfigError> {
        let mut current = self.inner.config.write().await;
        self.inner.log.apply(&config.log)?;
        *current = config;
        Ok(())
    }
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("config_path", &self.inner.config_path)
            .field("log", &self.inner.log)
            .finish()
    }
}
