//! Error types for the plugin manager.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Error taxonomy reported to control-channel callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyInState,
    DependencyUnavailable,
    ResourceBusy,
    TransportFailure,
    ConfigInvalid,
    InstanceFailed,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyInState => "already in state",
            ErrorKind::DependencyUnavailable => "dependency unavailable",
            ErrorKind::ResourceBusy => "resource busy",
            ErrorKind::TransportFailure => "transport failure",
            ErrorKind::ConfigInvalid => "config invalid",
            ErrorKind::InstanceFailed => "instance failed",
        };
        f.write_str(s)
    }
}

/// Errors that can occur while managing plugins and instances
#[derive(Debug, Clone, thiserror::Error)]
pub enum ManagerError {
    #[error("plugin {0} does not exist")]
    PluginNotFound(String),

    #[error("instance {0} does not exist")]
    InstanceNotFound(String),

    #[error("plugin {0} is already loaded")]
    PluginAlreadyLoaded(String),

    #[error("instance {instance} is already provided by plugin {plugin}")]
    InstanceAlreadyExists { instance: String, plugin: String },

    #[error("instance {0} is already enabled")]
    AlreadyEnabled(String),

    #[error("instance {0} is already disabled")]
    AlreadyDisabled(String),

    #[error("instance {instance} is unavailable, missing or unavailable dependencies: {}", missing.join(", "))]
    DependencyUnavailable {
        instance: String,
        missing: Vec<String>,
    },

    #[error("plugin {plugin} has a running instance: {instance}")]
    InstanceRunning { plugin: String, instance: String },

    #[error("instance {0} is still finishing its last run")]
    InstanceBusy(String),

    #[error("failed to open {}: {reason}", path.display())]
    Library { path: PathBuf, reason: String },

    #[error("{} does not export {symbol}", path.display())]
    MissingSymbol { path: PathBuf, symbol: String },

    #[error("{} was built for ABI {found}, expected {expected}", path.display())]
    AbiMismatch {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    #[error("instance {instance} failed: {message}")]
    InstanceFailed { instance: String, message: String },

    #[error("plugin manager is not running")]
    ChannelClosed,
}

impl ManagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManagerError::PluginNotFound(_)
            | ManagerError::InstanceNotFound(_) => ErrorKind::NotFound,
            ManagerError::PluginAlreadyLoaded(_)
            | ManagerError::InstanceAlreadyExists { .. }
            | ManagerError::AlreadyEnabled(_)
            | ManagerError::AlreadyDisabled(_) => ErrorKind::AlreadyInState,
            ManagerError::DependencyUnavailable { .. } => ErrorKind::DependencyUnavailable,
            ManagerError::InstanceRunning { .. } | ManagerError::InstanceBusy(_) => {
                ErrorKind::ResourceBusy
            }
            ManagerError::Library { .. }
            | ManagerError::MissingSymbol { .. }
            | ManagerError::AbiMismatch { .. }
            | ManagerError::ChannelClosed => ErrorKind::TransportFailure,
            ManagerError::InstanceFailed { .. } => ErrorKind::InstanceFailed,
        }
    }
}

/// Result type for plugin manager operations
pub type ManagerResult<T> = Result<T, ManagerError>;
