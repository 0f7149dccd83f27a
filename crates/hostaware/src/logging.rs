//! Logging Setup
//!
//! Installs the global `tracing` subscriber. The level filter sits behind a
//! reload layer; [`LogControl`] keeps its handle so a config reload can swap
//! the level while the daemon runs.

use parking_lot::Mutex;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

use crate::config::{ConfigError, LogConfig, LogFormat};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Runtime control over the active log level
pub struct LogControl {
    handle: Option<FilterHandle>,
    level: Mutex<String>,
}

impl LogControl {
    /// Install the global subscriber
    ///
    /// `RUST_LOG` wins over the configured level at startup.
    pub fn init(config: &LogConfig) -> anyhow::Result<Self> {
        let (filter, level) = match EnvFilter::try_from_default_env() {
            Ok(filter) => {
                let level = filter.to_string();
                (filter, level)
            }
            Err(_) => (EnvFilter::new(&config.level), config.level.clone()),
        };
        let (filter, handle) = reload::Layer::new(filter);

        let (text, json) = match config.format {
            LogFormat::Text => (Some(fmt::layer()), None),
            LogFormat::Json => (None, Some(fmt::layer().json())),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(text)
            .with(json)
            .try_init()?;

        Ok(Self {
            handle: Some(handle),
            level: Mutex::new(level),
        })
    }

    /// A control that tracks the level without a subscriber behind it
    pub fn detached(level: impl Into<String>) -> Self {
        Self {
            handle: None,
            level: Mutex::new(level.into()),
        }
    }

    /// Active filter directive
    pub fn level(&self) -> String {
        self.level.lock().clone()
    }

    /// Replace the active filter with `config.level`
    pub fn apply(&self, config: &LogConfig) -> Result<(), ConfigError> {
        config.level_filter()?;

        let mut level = self.level.lock();
        if let Some(handle) = &self.handle {
            handle
                .reload(EnvFilter::new(&config.level))
                .map_err(|e| ConfigError::Apply(e.to_string()))?;
        }
        if *level != config.level {
            info!(from = %level, to = %config.level, "Log level changed");
        }
        *level = config.level.clone();
        Ok(())
    }
}

impl std::fmt::Debug for LogControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogControl")
            .field("level", &*self.level.lock())
            .field("installed", &self.handle.is_some())
            .finish()
    }
}
