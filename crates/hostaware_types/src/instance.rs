//! Instance Capability Trait
//!
//! Every unit of plugin functionality implements [`Instance`]. The daemon only
//! calls these methods; what an instance collects or tunes is its own business.
//!
//! # Lifecycle
//!
//! - `enable`: called once the instance's dependencies are available
//! - `open_topic` / `close_topic`: called while enabled, as subscribers come and go
//! - `run`: called by the scheduler every `period` milliseconds while enabled
//! - `update_data`: called by the router with data from subscribed topics
//! - `disable`: called after every open topic has been closed

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{DataList, InstanceRunMessage, MessageSink, Topic};

// ─────────────────────────────────────────────────────────────────────────────
// Instance Error
// ─────────────────────────────────────────────────────────────────────────────

/// Errors reported by instance implementations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstanceError {
    #[error("{0}")]
    Failed(String),

    #[error("Topic not supported: {0}")]
    TopicNotSupported(String),

    #[error("Instance panicked: {0}")]
    Panicked(String),

    #[error("Message router is not running")]
    ChannelClosed,
}

impl InstanceError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Result type for instance operations
pub type InstanceResult<T = ()> = Result<T, InstanceError>;

// ─────────────────────────────────────────────────────────────────────────────
// Instance Kind
// ─────────────────────────────────────────────────────────────────────────────

/// Bitmask describing what an instance does
///
/// An instance with neither `TUNE` nor `SCENARIO` set is a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceKind(u32);

impl InstanceKind {
    pub const COLLECTOR: InstanceKind = InstanceKind(0);
    pub const RUN_ONCE: InstanceKind = InstanceKind(0b00010);
    pub const SCENARIO: InstanceKind = InstanceKind(0b01000);
    pub const TUNE: InstanceKind = InstanceKind(0b10000);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: InstanceKind) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_collector(self) -> bool {
        !self.contains(Self::TUNE) && !self.contains(Self::SCENARIO)
    }
}

impl BitOr for InstanceKind {
    type Output = InstanceKind;

    fn bitor(self, rhs: Self) -> Self::Output {
        InstanceKind(self.0 | rhs.0)
    }
}

impl fmt::Display for InstanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::TUNE) {
            names.push("tune");
        }
        if self.contains(Self::SCENARIO) {
            names.push("scenario");
        }
        if self.is_collector() {
            names.push("collector");
        }
        if self.contains(Self::RUN_ONCE) {
            names.push("run_once");
        }
        f.write_str(&names.join("|"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Instance Context
// ─────────────────────────────────────────────────────────────────────────────

/// Handle an instance uses to reach the message router
///
/// Every call is translated into an [`InstanceRunMessage`] and queued; nothing
/// here mutates shared state directly, so it is safe to call from `enable`,
/// `run` or `update_data`.
#[derive(Clone)]
pub struct InstanceContext {
    name: String,
    sink: Arc<dyn MessageSink>,
}

impl InstanceContext {
    pub fn new(name: impl Into<String>, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            name: name.into(),
            sink,
        }
    }

    /// Name of the instance this context belongs to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start receiving data published on `topic`
    pub fn subscribe(&self, topic: Topic) -> InstanceResult {
        self.sink
            .send(InstanceRunMessage::subscribe(&self.name, topic))
    }

    /// Stop receiving data published on `topic`
    pub fn unsubscribe(&self, topic: Topic) -> InstanceResult {
        self.sink
            .send(InstanceRunMessage::unsubscribe(&self.name, topic))
    }

    /// Publish data, handing ownership to the router
    pub fn publish(&self, data: DataList) -> InstanceResult {
        self.sink
            .send(InstanceRunMessage::publish(&self.name, data.into()))
    }

    /// Publish data the instance keeps and reuses across periods
    pub fn publish_retained(&self, data: Arc<DataList>) -> InstanceResult {
        self.sink
            .send(InstanceRunMessage::publish(&self.name, data.into()))
    }
}

impl fmt::Debug for InstanceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceContext")
            .field("name", &self.name)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Instance Trait
// ─────────────────────────────────────────────────────────────────────────────

/// The capability set every plugin instance provides
pub trait Instance: Send + 'static {
    /// Unique instance name
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Priority reported in status queries; lower is more important
    fn priority(&self) -> u32 {
        0
    }

    /// Run period in milliseconds
    fn period(&self) -> u64;

    fn kind(&self) -> InstanceKind;

    /// Topics this instance can publish
    fn supported_topics(&self) -> Vec<Topic> {
        Vec::new()
    }

    /// Names of instances that must be available before this one can be enabled
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn open_topic(&mut self, _topic: &Topic) -> InstanceResult {
        Ok(())
    }

    fn close_topic(&mut self, _topic: &Topic) -> InstanceResult {
        Ok(())
    }

    /// Receive data published on a subscribed topic
    fn update_data(&mut self, _data: &DataList) -> InstanceResult {
        Ok(())
    }

    fn enable(&mut self, ctx: &InstanceContext, params: &str) -> InstanceResult;

    fn disable(&mut self, ctx: &InstanceContext);

    fn run(&mut self, ctx: &InstanceContext);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_bits() {
        let kind = InstanceKind::TUNE | InstanceKind::RUN_ONCE;

        assert!(kind.contains(InstanceKind::TUNE));
        assert!(kind.contains(InstanceKind::RUN_ONCE));
        assert!(!kind.contains(InstanceKind::SCENARIO));
        assert!(!kind.is_collector());
        assert_eq!(kind.bits(), 0b10010);
        assert_eq!(kind.to_string(), "tune|run_once");
        assert_eq!(InstanceKind::COLLECTOR.to_string(), "collector");
    }
}
