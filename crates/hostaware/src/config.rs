//! Daemon Configuration
//!
//! Defines the structure of `hostaware.toml`. Values come from, in order of
//! precedence:
//! - `HOSTAWARE_` environment variables (`__` separates nested keys, e.g.
//!   `HOSTAWARE_SERVER__SOCKET`)
//! - the TOML file
//! - built-in defaults
//!
//! A missing file is not an error; the daemon then runs on defaults.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use hostaware_protocol::DEFAULT_SOCKET_PATH;
use hostaware_runtime::ErrorKind;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/hostaware/hostaware.toml";

const ENV_PREFIX: &str = "HOSTAWARE_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to apply configuration: {0}")]
    Apply(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ConfigInvalid
    }
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Invalid(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub server: ServerConfig,
    pub plugins: PluginsConfig,
    /// Instances enabled at startup
    pub enable: Vec<EnableEntry>,
    /// Installable plugin catalogue
    pub available: Vec<CatalogueEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub socket: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Default plugin directory
    pub dir: PathBuf,
    /// Load every library in `dir` at startup
    pub auto_load: bool,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/usr/lib64/hostaware"),
            auto_load: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnableEntry {
    pub plugin: String,
    #[serde(default)]
    pub instances: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogueEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Load and validate the configuration at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: &Path, env_prefix: &str) -> Result<Self, ConfigError> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(env_prefix).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log.level_filter()?;
        if self.server.socket.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("server.socket must not be empty".into()));
        }
        Ok(())
    }

    /// Catalogue entry for `name`
    pub fn catalogue_entry(&self, name: &str) -> Option<&CatalogueEntry> {
        self.available.iter().find(|entry| entry.name == name)
    }
}

impl LogConfig {
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.level
            .parse::<LevelFilter>()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.level)))
    }
}
