//! Manager Handle
//!
//! Cloneable front door to the dispatcher thread. Every control method queues
//! a command and waits for its reply.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use hostaware_types::{InstanceError, InstanceResult, InstanceRunMessage, MessageSink};

use super::command::{ManagerCommand, Reply};
use crate::{DependencyEdge, InstanceStatus, ManagerError, ManagerResult, PluginStatus};

/// Handle for controlling a running plugin manager
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    tx: mpsc::UnboundedSender<ManagerCommand>,
}

impl ManagerHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ManagerCommand>) -> Self {
        Self { tx }
    }

    /// Helper to send a command and wait for reply
    async fn send_command<T, F>(&self, make_cmd: F) -> ManagerResult<T>
    where
        F: FnOnce(Reply<T>) -> ManagerCommand,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make_cmd(reply_tx))
            .map_err(|_| ManagerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ManagerError::ChannelClosed)?
    }

    /// Load the plugin library at `path`, returning its instance names
    pub async fn load(&self, path: impl Into<PathBuf>) -> ManagerResult<Vec<String>> {
        let path = path.into();
        self.send_command(|reply| ManagerCommand::Load { path, reply })
            .await
    }

    /// Unload a plugin; fails while any of its instances is enabled
    pub async fn remove(&self, plugin: impl Into<String>) -> ManagerResult<()> {
        let plugin = plugin.into();
        self.send_command(|reply| ManagerCommand::Remove { plugin, reply })
            .await
    }

    pub async fn enable(
        &self,
        instance: impl Into<String>,
        params: impl Into<String>,
    ) -> ManagerResult<()> {
        let instance = instance.into();
        let params = params.into();
        self.send_command(|reply| ManagerCommand::Enable {
            instance,
            params,
            reply,
        })
        .await
    }

    pub async fn disable(&self, instance: impl Into<String>) -> ManagerResult<()> {
        let instance = instance.into();
        self.send_command(|reply| ManagerCommand::Disable { instance, reply })
            .await
    }

    /// Status of `plugin`, or of every loaded plugin
    pub async fn query(&self, plugin: Option<&str>) -> ManagerResult<Vec<PluginStatus>> {
        let plugin = plugin.map(str::to_string);
        self.send_command(|reply| ManagerCommand::Query { plugin, reply })
            .await
    }

    pub async fn instance(&self, instance: impl Into<String>) -> ManagerResult<InstanceStatus> {
        let instance = instance.into();
        self.send_command(|reply| ManagerCommand::QueryInstance { instance, reply })
            .await
    }

    /// Dependency edges of `instance`, or of the whole graph
    pub async fn query_dependencies(
        &self,
        instance: Option<&str>,
    ) -> ManagerResult<Vec<DependencyEdge>> {
        let instance = instance.map(str::to_string);
        self.send_command(|reply| ManagerCommand::QueryDependencies { instance, reply })
            .await
    }

    /// Wait until every command queued so far has been processed
    pub async fn flush(&self) -> ManagerResult<()> {
        self.send_command(|reply| {
            ManagerCommand::Deferred(Box::new(move || {
                let _ = reply.send(Ok(()));
            }))
        })
        .await
    }

    /// Disable every instance and stop the dispatcher
    pub async fn shutdown(&self) -> ManagerResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ManagerCommand::Shutdown { reply: reply_tx })
            .map_err(|_| ManagerError::ChannelClosed)?;
        let tasks = reply_rx.await.map_err(|_| ManagerError::ChannelClosed)?;

        debug!(count = tasks.len(), "Waiting for scheduled instances to stop");
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Scheduled instance task failed");
            }
        }
        Ok(())
    }

    /// Sink that queues instance messages for the dispatcher
    pub fn message_sink(&self) -> Arc<dyn MessageSink> {
        Arc::new(QueueSink {
            tx: self.tx.clone(),
        })
    }
}

/// [`MessageSink`] backed by the dispatcher queue
struct QueueSink {
    tx: mpsc::UnboundedSender<ManagerCommand>,
}

impl MessageSink for QueueSink {
    fn send(&self, msg: InstanceRunMessage) -> InstanceResult {
        self.tx
            .send(ManagerCommand::Instance(msg))
            .map_err(|_| InstanceError::ChannelClosed)
    }
}
