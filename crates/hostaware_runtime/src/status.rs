//! Status Snapshots
//!
//! Plain data returned by manager queries. They are built on the dispatcher
//! thread and carry no references into live state.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use hostaware_types::{InstanceKind, Topic};

use crate::DependencyEdge;

/// State of one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub name: String,
    pub plugin: String,
    pub description: String,
    pub kind: InstanceKind,
    pub priority: u32,
    pub period: u64,
    pub available: bool,
    pub enabled: bool,
    pub enable_count: u64,
    pub open_topics: Vec<Topic>,
    pub dependencies: Vec<DependencyEdge>,
}

impl InstanceStatus {
    pub fn availability(&self) -> &'static str {
        if self.available { "available" } else { "unavailable" }
    }

    pub fn state(&self) -> &'static str {
        if self.enabled { "running" } else { "close" }
    }
}

/// State of one loaded plugin and its instances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginStatus {
    pub name: String,
    pub path: PathBuf,
    pub loaded_at: DateTime<Local>,
    pub instances: Vec<InstanceStatus>,
}

impl PluginStatus {
    /// Multi-line human readable description
    pub fn render(&self) -> String {
        let mut out = format!(
            "{}\n\tpath: {}\n\tloaded: {}\n",
            self.name,
            self.path.display(),
            self.loaded_at.format("%Y-%m-%d %H:%M:%S")
        );
        for instance in &self.instances {
            out.push_str(&format!(
                "\t{} ({}) {} {} priority={} period={}ms enabled {} times\n",
                instance.name,
                instance.kind,
                instance.availability(),
                instance.state(),
                instance.priority,
                instance.period,
                instance.enable_count,
            ));
            for topic in &instance.open_topics {
                out.push_str(&format!("\t\ttopic {topic}\n"));
            }
        }
        out
    }
}
