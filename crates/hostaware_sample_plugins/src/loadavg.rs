//! Load Average Collector

use std::path::PathBuf;

use hostaware_types::{
    DataList, Instance, InstanceContext, InstanceError, InstanceKind, InstanceResult, Topic,
};

pub const COLLECTOR_NAME: &str = "loadavg_collector";
pub const LOADAVG_TOPIC: &str = "loadavg";

/// One sample of `/proc/loadavg`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadAvg {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
    pub running: u32,
    pub total: u32,
}

impl LoadAvg {
    /// Parse the contents of `/proc/loadavg`, e.g. `0.52 0.58 0.59 2/1234 5678`
    pub fn parse(content: &str) -> Option<Self> {
        let mut fields = content.split_whitespace();
        let one = fields.next()?.parse().ok()?;
        let five = fields.next()?.parse().ok()?;
        let fifteen = fields.next()?.parse().ok()?;
        let (running, total) = fields.next()?.split_once('/')?;
        Some(Self {
            one,
            five,
            fifteen,
            running: running.parse().ok()?,
            total: total.parse().ok()?,
        })
    }
}

pub fn loadavg_topic() -> Topic {
    Topic::new(COLLECTOR_NAME, LOADAVG_TOPIC, "")
}

pub struct LoadAvgCollector {
    source: PathBuf,
    topic_open: bool,
}

impl LoadAvgCollector {
    pub fn new() -> Self {
        Self::with_source("/proc/loadavg")
    }

    pub fn with_source(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            topic_open: false,
        }
    }

    fn sample(&self) -> Option<LoadAvg> {
        let content = std::fs::read_to_string(&self.source).ok()?;
        LoadAvg::parse(&content)
    }
}

impl Default for LoadAvgCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Instance for LoadAvgCollector {
    fn name(&self) -> &str {
        COLLECTOR_NAME
    }

    fn description(&self) -> &str {
        "System load averages from /proc/loadavg"
    }

    fn period(&self) -> u64 {
        1000
    }

    fn kind(&self) -> InstanceKind {
        InstanceKind::COLLECTOR
    }

    fn supported_topics(&self) -> Vec<Topic> {
        vec![loadavg_topic()]
    }

    fn open_topic(&mut self, topic: &Topic) -> InstanceResult {
        if topic.topic_name() != LOADAVG_TOPIC {
            return Err(InstanceError::TopicNotSupported(topic.to_string()));
        }
        self.topic_open = true;
        Ok(())
    }

    fn close_topic(&mut self, _topic: &Topic) -> InstanceResult {
        self.topic_open = false;
        Ok(())
    }

    fn enable(&mut self, _ctx: &InstanceContext, _params: &str) -> InstanceResult {
        if self.sample().is_none() {
            return Err(InstanceError::failed(format!(
                "cannot read {}",
                self.source.display()
            )));
        }
        Ok(())
    }

    fn disable(&mut self, _ctx: &InstanceContext) {
        self.topic_open = false;
    }

    fn run(&mut self, ctx: &InstanceContext) {
        if !self.topic_open {
            return;
        }
        if let Some(sample) = self.sample() {
            let _ = ctx.publish(DataList::new(loadavg_topic()).with_item(sample));
        }
    }
}
