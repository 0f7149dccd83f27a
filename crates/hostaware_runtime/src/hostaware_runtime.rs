//! Hostaware Runtime - Plugin manager core
//!
//! This crate contains the instance dependency graph, plugin loading, the
//! instance lifecycle engine and the publish/subscribe message router.
//!
//! # Architecture
//!
//! - A single dispatcher thread owns every plugin, instance slot, the
//!   dependency graph and the subscription table
//! - Control requests (load, enable, ...) and instance messages (subscribe,
//!   publish, ...) share one FIFO queue into the dispatcher
//! - Callers talk to the dispatcher through a cloneable [`ManagerHandle`] and
//!   wait on a oneshot reply
//! - Enabled instances are driven by the [`Scheduler`] on tokio tasks

mod error;
mod graph;
mod instance;
mod manager;
mod plugin;
mod scheduler;
mod status;

pub use error::*;
pub use graph::*;
pub use instance::*;
pub use manager::*;
pub use plugin::*;
pub use scheduler::*;
pub use status::*;

pub use hostaware_types;
