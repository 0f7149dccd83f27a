//! Manager Commands
//!
//! Everything the dispatcher does arrives as a [`ManagerCommand`] on one FIFO
//! queue. Control commands carry a oneshot reply; instance messages do not.

use std::path::PathBuf;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use hostaware_types::InstanceRunMessage;

use crate::{DependencyEdge, InstanceStatus, ManagerResult, PluginStatus};

/// Reply channel for a control command
pub(crate) type Reply<T> = oneshot::Sender<ManagerResult<T>>;

/// Work queued for the dispatcher thread
pub(crate) enum ManagerCommand {
    /// Load a plugin library, replying with the names of its instances
    Load {
        path: PathBuf,
        reply: Reply<Vec<String>>,
    },

    Remove {
        plugin: String,
        reply: Reply<()>,
    },

    /// Enable an instance. The reply is sent after every message the
    /// instance queued while enabling has been processed.
    Enable {
        instance: String,
        params: String,
        reply: Reply<()>,
    },

    Disable {
        instance: String,
        reply: Reply<()>,
    },

    /// Status of one plugin, or of all plugins when `plugin` is `None`
    Query {
        plugin: Option<String>,
        reply: Reply<Vec<PluginStatus>>,
    },

    QueryInstance {
        instance: String,
        reply: Reply<InstanceStatus>,
    },

    /// Dependency edges of one instance, or of the whole graph
    QueryDependencies {
        instance: Option<String>,
        reply: Reply<Vec<DependencyEdge>>,
    },

    /// Message from a running instance
    Instance(InstanceRunMessage),

    /// Runs once everything queued before it has been handled
    Deferred(Box<dyn FnOnce() + Send>),

    /// Disable everything and stop the dispatcher, handing back the
    /// scheduler tasks still winding down
    Shutdown {
        reply: oneshot::Sender<Vec<JoinHandle<()>>>,
    },
}

impl std::fmt::Debug for ManagerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagerCommand::Load { path, .. } => f.debug_struct("Load").field("path", path).finish(),
            ManagerCommand::Remove { plugin, .. } => {
                f.debug_struct("Remove").field("plugin", plugin).finish()
            }
            ManagerCommand::Enable {
                instance, params, ..
            } => f
                .debug_struct("Enable")
                .field("instance", instance)
                .field("params", params)
                .finish(),
            ManagerCommand::Disable { instance, .. } => {
                f.debug_struct("Disable").field("instance", instance).finish()
            }
            ManagerCommand::Query { plugin, .. } => {
                f.debug_struct("Query").field("plugin", plugin).finish()
            }
            ManagerCommand::QueryInstance { instance, .. } => f
                .debug_struct("QueryInstance")
                .field("instance", instance)
                .finish(),
            ManagerCommand::QueryDependencies { instance, .. } => f
                .debug_struct("QueryDependencies")
                .field("instance", instance)
                .finish(),
            ManagerCommand::Instance(msg) => f.debug_tuple("Instance").field(msg).finish(),
            ManagerCommand::Deferred(_) => f.write_str("Deferred"),
            ManagerCommand::Shutdown { .. } => f.write_str("Shutdown"),
        }
    }
}
