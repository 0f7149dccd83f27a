//! Hostaware - Host-resident plugin orchestrator
//!
//! This crate provides the daemon around `hostaware_runtime`:
//! - Configuration loading and validation
//! - Logging setup with a runtime-adjustable level
//! - The control socket server
//! - Startup orchestration (auto-load and the enable list)

pub use hostaware_runtime;

pub mod config;

pub mod logging;

// Control socket server
pub mod server;

pub mod startup;
