//! Instance Cells
//!
//! An [`InstanceCell`] wraps one plugin instance so it can be shared between
//! the dispatcher thread and the scheduler. The scheduler holds the instance
//! lock for the whole of `run`, so the dispatcher never waits on it: calls it
//! makes into the plugin are queued on the cell and applied by whichever side
//! holds the lock next, in the order they were queued. Panics in plugin code
//! are turned into errors.

use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use libloading::Library;
use parking_lot::Mutex;
use tracing::warn;

use hostaware_types::{
    Instance, InstanceContext, InstanceError, InstanceKind, InstanceResult, Payload, Topic,
    TopicKey,
};

/// Read-only facts an instance reports about itself, captured at load time
#[derive(Debug, Clone)]
pub struct InstanceInfo {
    pub name: String,
    pub plugin: String,
    pub description: String,
    pub priority: u32,
    pub period: u64,
    pub kind: InstanceKind,
    pub supported_topics: Vec<Topic>,
    pub dependencies: Vec<String>,
}

impl InstanceInfo {
    pub fn supports(&self, topic: &Topic) -> bool {
        self.supported_topics
            .iter()
            .any(|t| t.topic_name() == topic.topic_name())
    }
}

/// Plugin call waiting for the instance lock
enum PendingCall {
    OpenTopic(Topic),
    CloseTopic(Topic),
    UpdateData(Arc<Payload>),
    Disable,
}

/// A plugin instance shared between the dispatcher and the scheduler
pub struct InstanceCell {
    info: InstanceInfo,
    ctx: InstanceContext,
    enabled: AtomicBool,
    pending: Mutex<VecDeque<PendingCall>>,
    instance: Mutex<Box<dyn Instance>>,
    /// Declared last so the instance is dropped before its code is unmapped
    _library: Option<Arc<Library>>,
}

impl InstanceCell {
    pub fn new(
        instance: Box<dyn Instance>,
        plugin: &str,
        ctx: InstanceContext,
        library: Option<Arc<Library>>,
    ) -> Self {
        let info = InstanceInfo {
            name: instance.name().to_string(),
            plugin: plugin.to_string(),
            description: instance.description().to_string(),
            priority: instance.priority(),
            period: instance.period(),
            kind: instance.kind(),
            supported_topics: instance.supported_topics(),
            dependencies: instance.dependencies(),
        };
        Self {
            info,
            ctx,
            enabled: AtomicBool::new(false),
            pending: Mutex::new(VecDeque::new()),
            instance: Mutex::new(instance),
            _library: library,
        }
    }

    pub fn info(&self) -> &InstanceInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Whether plugin calls are still waiting for an in-flight run
    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Run the instance unless it has been disabled
    ///
    /// Calls queued while the run was in flight are applied before the lock
    /// is released.
    pub fn run(&self) -> InstanceResult<bool> {
        let mut instance = self.instance.lock();
        self.apply_pending(instance.as_mut());

        let result = if self.is_enabled() {
            catch_unwind(AssertUnwindSafe(|| instance.run(&self.ctx)))
                .map(|()| true)
                .map_err(|panic| InstanceError::Panicked(panic_message(panic.as_ref())))
        } else {
            Ok(false)
        };

        self.apply_pending(instance.as_mut());
        drop(instance);
        self.apply_if_idle();
        result
    }

    /// Call the instance's `enable` and mark it enabled on success
    ///
    /// Returns `None` without calling into the plugin while a run is still
    /// in flight.
    pub fn try_enable(&self, params: &str) -> Option<InstanceResult> {
        let mut instance = self.instance.try_lock()?;
        self.apply_pending(instance.as_mut());

        let result = catch_unwind(AssertUnwindSafe(|| instance.enable(&self.ctx, params)))
            .map_err(|panic| InstanceError::Panicked(panic_message(panic.as_ref())))
            .and_then(|result| result);
        if result.is_ok() {
            self.enabled.store(true, Ordering::Release);
        }

        drop(instance);
        self.apply_if_idle();
        Some(result)
    }

    /// Mark the instance disabled and queue its `disable`
    ///
    /// No run starts after this returns; a run already in flight finishes
    /// before `disable` is called.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        self.submit(PendingCall::Disable);
    }

    /// Hand published data to the instance
    pub fn deliver(&self, payload: Arc<Payload>) {
        self.submit(PendingCall::UpdateData(payload));
    }

    fn open_topic(&self, topic: Topic) {
        self.submit(PendingCall::OpenTopic(topic));
    }

    fn close_topic(&self, topic: Topic) {
        self.submit(PendingCall::CloseTopic(topic));
    }

    fn submit(&self, call: PendingCall) {
        self.pending.lock().push_back(call);
        self.apply_if_idle();
    }

    /// Apply queued calls unless someone else holds the instance
    ///
    /// Whoever holds the lock re-checks the queue after releasing it, so a
    /// call queued while the lock was taken is never left behind.
    fn apply_if_idle(&self) {
        while let Some(mut instance) = self.instance.try_lock() {
            self.apply_pending(instance.as_mut());
            drop(instance);
            if !self.has_pending() {
                break;
            }
        }
    }

    fn apply_pending(&self, instance: &mut dyn Instance) {
        loop {
            let Some(call) = self.pending.lock().pop_front() else {
                break;
            };
            self.apply(instance, call);
        }
    }

    fn apply(&self, instance: &mut dyn Instance, call: PendingCall) {
        let name = &self.info.name;
        let result = catch_unwind(AssertUnwindSafe(|| match &call {
            PendingCall::OpenTopic(topic) => instance.open_topic(topic),
            PendingCall::CloseTopic(topic) => instance.close_topic(topic),
            PendingCall::UpdateData(payload) => instance.update_data(payload.data()),
            PendingCall::Disable => {
                instance.disable(&self.ctx);
                Ok(())
            }
        }))
        .map_err(|panic| InstanceError::Panicked(panic_message(panic.as_ref())))
        .and_then(|result| result);

        if let Err(e) = result {
            match call {
                PendingCall::OpenTopic(topic) => {
                    warn!(instance = %name, topic = %topic, error = %e, "Failed to open topic")
                }
                PendingCall::CloseTopic(topic) => {
                    warn!(instance = %name, topic = %topic, error = %e, "Failed to close topic")
                }
                PendingCall::UpdateData(payload) => {
                    warn!(instance = %name, topic = %payload.topic(), error = %e, "Subscriber failed to take data")
                }
                PendingCall::Disable => {
                    warn!(instance = %name, error = %e, "Instance panicked while disabling")
                }
            }
        }
    }
}

impl std::fmt::Debug for InstanceCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceCell")
            .field("info", &self.info)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Instance Slot
// ─────────────────────────────────────────────────────────────────────────────

/// Dispatcher-owned bookkeeping for one instance
#[derive(Debug)]
pub struct InstanceSlot {
    pub cell: Arc<InstanceCell>,
    /// Topics currently open on this instance
    pub open_topics: BTreeMap<TopicKey, Topic>,
    /// Successful enables since load; diagnostic only
    pub enable_count: u64,
}

impl InstanceSlot {
    pub fn new(cell: InstanceCell) -> Self {
        Self {
            cell: Arc::new(cell),
            open_topics: BTreeMap::new(),
            enable_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.cell.name()
    }

    pub fn is_enabled(&self) -> bool {
        self.cell.is_enabled()
    }

    /// Open `topic`; already-open topics only produce a warning
    pub fn open_topic(&mut self, topic: &Topic) {
        let key = topic.key();
        if self.open_topics.contains_key(&key) {
            warn!(instance = %self.name(), topic = %key, "Topic is already open");
            return;
        }
        self.cell.open_topic(topic.clone());
        self.open_topics.insert(key, topic.clone());
    }

    /// Close `topic`; closing an unopened topic only produces a warning
    pub fn close_topic(&mut self, topic: &Topic) {
        let key = topic.key();
        if self.open_topics.remove(&key).is_none() {
            warn!(instance = %self.name(), topic = %key, "Topic is not open");
            return;
        }
        self.cell.close_topic(topic.clone());
    }

    /// Close every open topic, iterating over a snapshot
    pub fn close_all_topics(&mut self) {
        let snapshot: Vec<Topic> = self.open_topics.values().cloned().collect();
        for topic in &snapshot {
            self.close_topic(topic);
        }
    }
}
