//! Plugin Manager
//!
//! Owns the lifecycle of plugins and instances and routes messages between
//! instances.
//!
//! # Example
//!
//! ```rust,ignore
//! let manager = PluginManager::spawn(DylibLoader, tokio::runtime::Handle::current())?;
//! manager.load("/usr/lib64/hostaware/libsample.so").await?;
//! manager.enable("loadavg_watch", "").await?;
//! ```

mod command;
mod dispatcher;
mod handle;
mod router;

use command::ManagerCommand;
pub use handle::ManagerHandle;

use std::thread;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::{PluginLoader, Scheduler};
use dispatcher::Dispatcher;

/// Entry point for starting the plugin manager
pub struct PluginManager;

impl PluginManager {
    /// Start the dispatcher thread
    ///
    /// Scheduled instances run as tasks on `runtime`.
    pub fn spawn(loader: impl PluginLoader, runtime: Handle) -> std::io::Result<ManagerHandle> {
        let (command_tx, command_rx) = mpsc::unbounded_channel::<ManagerCommand>();
        let handle = ManagerHandle::new(command_tx.clone());

        let dispatcher = Dispatcher::new(
            Box::new(loader),
            command_tx,
            handle.message_sink(),
            Scheduler::new(runtime),
        );

        thread::Builder::new()
            .name("hostaware-dispatcher".to_string())
            .spawn(move || dispatcher.run(command_rx))?;

        Ok(handle)
    }
}
