//! Hostaware Types - Shared definitions for the plugin ABI
//!
//! This crate contains everything a plugin library needs to build instances
//! for the hostaware daemon: topics, data lists, the `Instance` capability
//! trait and the context instances use to talk to the message router.
//!
//! Plugin libraries depend only on this crate and export their instances with
//! [`export_instances!`].

mod abi;
mod data;
mod instance;
mod message;
mod topic;

pub use abi::*;
pub use data::*;
pub use instance::*;
pub use message::*;
pub use topic::*;
