//! Load Watch Scenario
//!
//! Follows the load average collector and reports whether the one-minute load
//! is above a threshold. Enable parameters: `threshold=<load>` (default: the
//! number of CPUs).

use std::sync::Arc;

use hostaware_types::{
    DataList, Instance, InstanceContext, InstanceError, InstanceKind, InstanceResult, Topic,
};

use crate::loadavg::{COLLECTOR_NAME, LoadAvg, loadavg_topic};

pub const WATCH_NAME: &str = "loadavg_watch";
pub const BUSY_TOPIC: &str = "busy";

/// Published on the `busy` topic
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BusyState {
    pub busy: bool,
    pub load: f64,
    pub threshold: f64,
}

pub fn busy_topic() -> Topic {
    Topic::new(WATCH_NAME, BUSY_TOPIC, "")
}

fn parse_threshold(params: &str) -> InstanceResult<Option<f64>> {
    let mut threshold = None;
    for pair in params.split([',', ' ']).filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some(("threshold", value)) => {
                let value: f64 = value
                    .parse()
                    .map_err(|_| InstanceError::failed(format!("invalid threshold: {value}")))?;
                if !value.is_finite() || value < 0.0 {
                    return Err(InstanceError::failed(format!("invalid threshold: {value}")));
                }
                threshold = Some(value);
            }
            _ => return Err(InstanceError::failed(format!("unknown parameter: {pair}"))),
        }
    }
    Ok(threshold)
}

pub struct LoadWatch {
    threshold: f64,
    latest: Option<LoadAvg>,
    /// Last published state, republished while unchanged
    state: Option<Arc<DataList>>,
    topic_open: bool,
}

impl LoadWatch {
    pub fn new() -> Self {
        Self {
            threshold: default_threshold(),
            latest: None,
            state: None,
            topic_open: false,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn current_state(&self) -> Option<&BusyState> {
        self.state
            .as_ref()
            .and_then(|list| list.iter_as::<BusyState>().next())
    }
}

impl Default for LoadWatch {
    fn default() -> Self {
        Self::new()
    }
}

fn default_threshold() -> f64 {
    std::thread::available_parallelism().map_or(1.0, |n| n.get() as f64)
}

impl Instance for LoadWatch {
    fn name(&self) -> &str {
        WATCH_NAME
    }

    fn description(&self) -> &str {
        "Reports when the one-minute load average crosses a threshold"
    }

    fn priority(&self) -> u32 {
        1
    }

    fn period(&self) -> u64 {
        1000
    }

    fn kind(&self) -> InstanceKind {
        InstanceKind::SCENARIO
    }

    fn supported_topics(&self) -> Vec<Topic> {
        vec![busy_topic()]
    }

    fn dependencies(&self) -> Vec<String> {
        vec![COLLECTOR_NAME.to_string()]
    }

    fn open_topic(&mut self, topic: &Topic) -> InstanceResult {
        if topic.topic_name() != BUSY_TOPIC {
            return Err(InstanceError::TopicNotSupported(topic.to_string()));
        }
        self.topic_open = true;
        Ok(())
    }

    fn close_topic(&mut self, _topic: &Topic) -> InstanceResult {
        self.topic_open = false;
        Ok(())
    }

    fn update_data(&mut self, data: &DataList) -> InstanceResult {
        if let Some(sample) = data.iter_as::<LoadAvg>().last() {
            self.latest = Some(*sample);
        }
        Ok(())
    }

    fn enable(&mut self, ctx: &InstanceContext, params: &str) -> InstanceResult {
        self.threshold = parse_threshold(params)?.unwrap_or_else(default_threshold);
        ctx.subscribe(loadavg_topic())
    }

    fn disable(&mut self, _ctx: &InstanceContext) {
        self.latest = None;
        self.state = None;
        self.topic_open = false;
    }

    fn run(&mut self, ctx: &InstanceContext) {
        let Some(sample) = self.latest else {
            return;
        };

        let busy = sample.one > self.threshold;
        if self.current_state().is_none_or(|state| state.busy != busy) {
            let state = BusyState {
                busy,
                load: sample.one,
                threshold: self.threshold,
            };
            self.state = Some(Arc::new(DataList::new(busy_topic()).with_item(state)));
        }

        if self.topic_open {
            if let Some(state) = &self.state {
                let _ = ctx.publish_retained(Arc::clone(state));
            }
        }
    }
}
