//! Instance Scheduler
//!
//! Drives `run` on every enabled instance. Each scheduled instance gets its own
//! tokio task ticking at the instance's period; the plugin code itself runs on
//! the blocking pool since it may read from `/proc` or sleep briefly. A run
//! that never returns stalls only its own task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use hostaware_types::InstanceKind;

use crate::InstanceCell;

struct ScheduledTask {
    stop: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// Periodic runner for enabled instances
pub struct Scheduler {
    runtime: Handle,
    tasks: HashMap<String, ScheduledTask>,
}

impl Scheduler {
    /// Create a scheduler spawning onto `runtime`
    ///
    /// The scheduler itself may live on a plain thread.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            tasks: HashMap::new(),
        }
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Start running `cell` every period; replaces an existing schedule
    pub fn schedule(&mut self, cell: Arc<InstanceCell>) {
        let name = cell.name().to_string();
        self.unschedule(&name);

        let (stop_tx, stop_rx) = oneshot::channel();
        let join = self.runtime.spawn(drive(cell, stop_rx));
        self.tasks.insert(
            name,
            ScheduledTask {
                stop: stop_tx,
                join,
            },
        );
    }

    /// Stop scheduling `name`. An in-flight run is allowed to finish.
    pub fn unschedule(&mut self, name: &str) -> Option<JoinHandle<()>> {
        let task = self.tasks.remove(name)?;
        let _ = task.stop.send(());
        Some(task.join)
    }

    /// Stop every task and hand back their join handles
    pub fn stop_all(&mut self) -> Vec<JoinHandle<()>> {
        self.tasks
            .drain()
            .map(|(_, task)| {
                let _ = task.stop.send(());
                task.join
            })
            .collect()
    }
}

async fn drive(cell: Arc<InstanceCell>, mut stop: oneshot::Receiver<()>) {
    let info = cell.info();
    let name = info.name.clone();
    let run_once = info.kind.contains(InstanceKind::RUN_ONCE);

    // Periodic instances first run one period after being enabled
    let period = Duration::from_millis(info.period.max(1));
    let start = if run_once {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(instance = %name, period = info.period, run_once, "Instance scheduled");

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let cell = Arc::clone(&cell);
                match tokio::task::spawn_blocking(move || cell.run()).await {
                    Ok(Ok(true)) => {}
                    Ok(Ok(false)) => break,
                    Ok(Err(e)) => warn!(instance = %name, error = %e, "Instance run failed"),
                    Err(e) => error!(instance = %name, error = %e, "Instance run task failed"),
                }
                if run_once {
                    break;
                }
            }
        }
    }

    debug!(instance = %name, "Instance unscheduled");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use hostaware_types::{
        Instance, InstanceContext, InstanceResult, InstanceRunMessage, MessageSink,
    };

    struct NullSink;

    impl MessageSink for NullSink {
        fn send(&self, _msg: InstanceRunMessage) -> InstanceResult {
            Ok(())
        }
    }

    struct Counter {
        kind: InstanceKind,
        runs: Arc<AtomicU32>,
    }

    impl Instance for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn period(&self) -> u64 {
            5
        }

        fn kind(&self) -> InstanceKind {
            self.kind
        }

        fn enable(&mut self, _ctx: &InstanceContext, _params: &str) -> InstanceResult {
            Ok(())
        }

        fn disable(&mut self, _ctx: &InstanceContext) {}

        fn run(&mut self, _ctx: &InstanceContext) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counter(kind: InstanceKind) -> (Arc<InstanceCell>, Arc<AtomicU32>) {
        let runs = Arc::new(AtomicU32::new(0));
        let instance = Counter {
            kind,
            runs: Arc::clone(&runs),
        };
        let ctx = InstanceContext::new("counter", Arc::new(NullSink));
        let cell = Arc::new(InstanceCell::new(Box::new(instance), "libcounter.so", ctx, None));
        cell.try_enable("").unwrap().unwrap();
        (cell, runs)
    }

    #[tokio::test]
    async fn test_periodic_runs_stop_after_unschedule() {
        let (cell, runs) = counter(InstanceKind::COLLECTOR);
        let mut scheduler = Scheduler::new(Handle::current());

        scheduler.schedule(Arc::clone(&cell));
        assert!(scheduler.is_scheduled("counter"));
        tokio::time::sleep(Duration::from_millis(60)).await;

        let join = scheduler.unschedule("counter").unwrap();
        join.await.unwrap();
        let seen = runs.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several runs, got {seen}");

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), seen);
        assert!(scheduler.is_empty());
    }

    #[tokio::test]
    async fn test_run_once_instance_runs_once() {
        let (cell, runs) = counter(InstanceKind::TUNE | InstanceKind::RUN_ONCE);
        let mut scheduler = Scheduler::new(Handle::current());

        scheduler.schedule(cell);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        for join in scheduler.stop_all() {
            join.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_disabled_cell_ends_its_task() {
        let (cell, runs) = counter(InstanceKind::COLLECTOR);
        cell.disable();

        let mut scheduler = Scheduler::new(Handle::current());
        scheduler.schedule(cell);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
