use std::sync::Mutex;

use hostaware_types::{InstanceResult, InstanceRunMessage, MessageSink};

/// Sink that keeps every message an instance sends
#[derive(Default)]
pub struct Recorder(pub Mutex<Vec<InstanceRunMessage>>);

impl MessageSink for Recorder {
    fn send(&self, msg: InstanceRunMessage) -> InstanceResult {
        self.0.lock().unwrap().push(msg);
        Ok(())
    }
}
