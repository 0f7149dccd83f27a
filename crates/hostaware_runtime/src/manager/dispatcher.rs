//! Dispatcher
//!
//! The single owner of plugins, instance slots, the dependency graph and the
//! subscription table. It drains the command queue in order on a dedicated
//! thread; nothing else mutates this state.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use hostaware_types::{InstanceContext, MessageKind, MessageSink, Topic, TopicKey};

use super::command::ManagerCommand;
use super::router::Subscription;
use crate::{
    DependencyEdge, DependencyGraph, InstanceCell, InstanceSlot, InstanceStatus, ManagerError,
    ManagerResult, Plugin, PluginLoader, PluginStatus, Scheduler, plugin_name,
};

pub(crate) struct Dispatcher {
    loader: Box<dyn PluginLoader>,
    /// Our own queue, for deferred replies
    queue: mpsc::UnboundedSender<ManagerCommand>,
    sink: Arc<dyn MessageSink>,
    pub(super) plugins: BTreeMap<String, Plugin>,
    pub(super) instances: HashMap<String, InstanceSlot>,
    pub(super) graph: DependencyGraph,
    pub(super) subscriptions: HashMap<TopicKey, Subscription>,
    scheduler: Scheduler,
    /// Enabled instances, oldest first
    enable_order: Vec<String>,
}

impl Dispatcher {
    pub(crate) fn new(
        loader: Box<dyn PluginLoader>,
        queue: mpsc::UnboundedSender<ManagerCommand>,
        sink: Arc<dyn MessageSink>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            loader,
            queue,
            sink,
            plugins: BTreeMap::new(),
            instances: HashMap::new(),
            graph: DependencyGraph::new(),
            subscriptions: HashMap::new(),
            scheduler,
            enable_order: Vec::new(),
        }
    }

    /// Drain the queue until shutdown or until every sender is gone
    pub(crate) fn run(mut self, mut rx: mpsc::UnboundedReceiver<ManagerCommand>) {
        info!("Plugin manager started");

        while let Some(cmd) = rx.blocking_recv() {
            if let ManagerCommand::Shutdown { reply } = cmd {
                let tasks = self.shutdown();
                let _ = reply.send(tasks);
                break;
            }
            self.handle(cmd);
        }

        info!("Plugin manager stopped");
    }

    fn handle(&mut self, cmd: ManagerCommand) {
        match cmd {
            ManagerCommand::Load { path, reply } => {
                let _ = reply.send(self.load(path));
            }

            ManagerCommand::Remove { plugin, reply } => {
                let _ = reply.send(self.remove(&plugin));
            }

            ManagerCommand::Enable {
                instance,
                params,
                reply,
            } => match self.enable(&instance, &params) {
                // Messages queued by the instance's enable sit ahead of this
                Ok(()) => self.defer(move || {
                    let _ = reply.send(Ok(()));
                }),
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },

            ManagerCommand::Disable { instance, reply } => {
                let _ = reply.send(self.disable(&instance));
            }

            ManagerCommand::Query { plugin, reply } => {
                let _ = reply.send(self.query(plugin.as_deref()));
            }

            ManagerCommand::QueryInstance { instance, reply } => {
                let status = self
                    .instances
                    .get(&instance)
                    .map(|slot| self.instance_status(slot))
                    .ok_or(ManagerError::InstanceNotFound(instance));
                let _ = reply.send(status);
            }

            ManagerCommand::QueryDependencies { instance, reply } => {
                let _ = reply.send(self.query_dependencies(instance.as_deref()));
            }

            ManagerCommand::Instance(msg) => {
                trace!(origin = %msg.origin, topic = %msg.topic(), "Instance message");
                match msg.kind {
                    MessageKind::Subscribe(topic) => self.subscribe(&msg.origin, topic),
                    MessageKind::Unsubscribe(topic) => self.unsubscribe(&msg.origin, &topic),
                    MessageKind::PublishData(payload) => self.publish(&msg.origin, payload),
                }
            }

            ManagerCommand::Deferred(f) => f(),

            ManagerCommand::Shutdown { .. } => {}
        }
    }

    fn defer(&self, f: impl FnOnce() + Send + 'static) {
        // Only fails once the receiver is gone, which drops the reply anyway
        let _ = self.queue.send(ManagerCommand::Deferred(Box::new(f)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Plugins
    // ─────────────────────────────────────────────────────────────────────────

    fn load(&mut self, path: PathBuf) -> ManagerResult<Vec<String>> {
        let name = plugin_name(&path);
        if self.plugins.contains_key(&name) {
            return Err(ManagerError::PluginAlreadyLoaded(name));
        }

        let loaded = self.loader.load(&path)?;

        let mut seen = HashSet::new();
        for instance in &loaded.instances {
            let instance_name = instance.name();
            if let Some(owner) = self.instances.get(instance_name) {
                return Err(ManagerError::InstanceAlreadyExists {
                    instance: instance_name.to_string(),
                    plugin: owner.cell.info().plugin.clone(),
                });
            }
            if !seen.insert(instance_name.to_string()) {
                return Err(ManagerError::InstanceAlreadyExists {
                    instance: instance_name.to_string(),
                    plugin: name,
                });
            }
        }

        let mut names = Vec::with_capacity(loaded.instances.len());
        for instance in loaded.instances {
            let instance_name = instance.name().to_string();
            let ctx = InstanceContext::new(&instance_name, Arc::clone(&self.sink));
            let cell = InstanceCell::new(instance, &name, ctx, loaded.library.clone());

            self.graph
                .add_instance(&instance_name, cell.info().dependencies.iter().cloned());
            self.instances
                .insert(instance_name.clone(), InstanceSlot::new(cell));
            names.push(instance_name);
        }

        info!(plugin = %name, instances = ?names, "Plugin loaded");
        self.plugins.insert(
            name.clone(),
            Plugin {
                name,
                path,
                loaded_at: Local::now(),
                instances: names.clone(),
                library: loaded.library,
            },
        );
        Ok(names)
    }

    fn remove(&mut self, name: &str) -> ManagerResult<()> {
        let plugin = self
            .plugins
            .get(name)
            .ok_or_else(|| ManagerError::PluginNotFound(name.to_string()))?;

        if let Some(running) = plugin
            .instances
            .iter()
            .find(|instance| self.instances.get(*instance).is_some_and(|s| s.is_enabled()))
        {
            return Err(ManagerError::InstanceRunning {
                plugin: name.to_string(),
                instance: running.clone(),
            });
        }

        let Some(plugin) = self.plugins.remove(name) else {
            return Err(ManagerError::PluginNotFound(name.to_string()));
        };
        for instance in &plugin.instances {
            self.instances.remove(instance);
            self.graph.delete_instance(instance);
        }
        // Subscribers of the removed topics still hold their edges here, and
        // disabling them releases those edges.
        self.disable_unavailable();
        self.subscriptions
            .retain(|_, sub| !plugin.instances.iter().any(|i| i == sub.topic.instance_name()));

        info!(plugin = %name, "Plugin removed");
        // Dropping the record releases the library once the last cell is gone
        drop(plugin);
        Ok(())
    }

    /// Disable enabled instances whose dependencies went away
    fn disable_unavailable(&mut self) {
        let stranded: Vec<String> = self
            .enable_order
            .iter()
            .rev()
            .filter(|name| !self.graph.is_available(name))
            .cloned()
            .collect();
        for name in stranded {
            warn!(instance = %name, "Dependency removed, disabling instance");
            self.disable_instance(&name);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Instances
    // ─────────────────────────────────────────────────────────────────────────

    pub(super) fn enable(&mut self, name: &str, params: &str) -> ManagerResult<()> {
        let slot = self
            .instances
            .get(name)
            .ok_or_else(|| ManagerError::InstanceNotFound(name.to_string()))?;
        if slot.is_enabled() {
            return Err(ManagerError::AlreadyEnabled(name.to_string()));
        }
        if !self.graph.is_available(name) {
            return Err(ManagerError::DependencyUnavailable {
                instance: name.to_string(),
                missing: self.graph.unresolved_dependencies(name),
            });
        }

        self.enable_dependencies(name)?;

        let Some(slot) = self.instances.get_mut(name) else {
            return Err(ManagerError::InstanceNotFound(name.to_string()));
        };
        slot.cell
            .try_enable(params)
            .ok_or_else(|| ManagerError::InstanceBusy(name.to_string()))?
            .map_err(|e| ManagerError::InstanceFailed {
                instance: name.to_string(),
                message: e.to_string(),
            })?;
        slot.enable_count += 1;

        // Subscribers that outlived a previous disable get their topics back
        let waiting: Vec<Topic> = self
            .subscriptions
            .values()
            .filter(|sub| sub.topic.instance_name() == name && !sub.subscribers.is_empty())
            .map(|sub| sub.topic.clone())
            .collect();
        for topic in &waiting {
            slot.open_topic(topic);
        }

        self.scheduler.schedule(Arc::clone(&slot.cell));
        self.enable_order.push(name.to_string());
        info!(instance = %name, "Instance enabled");
        Ok(())
    }

    /// Enable every disabled instance `name` requires, deepest first
    ///
    /// Each dependency goes through [`Self::enable`], so its own chain comes
    /// up before it does.
    fn enable_dependencies(&mut self, name: &str) -> ManagerResult<()> {
        for dep in self.graph.transitive_dependencies(name).into_iter().rev() {
            if self.instances.get(&dep).is_some_and(|slot| !slot.is_enabled()) {
                debug!(instance = %name, dependency = %dep, "Enabling dependency");
                self.enable(&dep, "")?;
            }
        }
        Ok(())
    }

    fn disable(&mut self, name: &str) -> ManagerResult<()> {
        let slot = self
            .instances
            .get(name)
            .ok_or_else(|| ManagerError::InstanceNotFound(name.to_string()))?;
        if !self.graph.is_available(name) {
            return Err(ManagerError::DependencyUnavailable {
                instance: name.to_string(),
                missing: self.graph.unresolved_dependencies(name),
            });
        }
        if !slot.is_enabled() {
            return Err(ManagerError::AlreadyDisabled(name.to_string()));
        }

        self.disable_instance(name);
        Ok(())
    }

    /// Stop deliveries to `name`, close its topics and call its `disable`
    ///
    /// The plugin calls wait for an in-flight run; this does not.
    fn disable_instance(&mut self, name: &str) -> Option<JoinHandle<()>> {
        self.drop_subscriber(name);

        let slot = self.instances.get_mut(name)?;
        slot.close_all_topics();
        slot.cell.disable();

        self.enable_order.retain(|n| n != name);
        info!(instance = %name, "Instance disabled");
        self.scheduler.unschedule(name)
    }

    /// Enabled instances ordered so that dependents come before what they
    /// depend on
    fn shutdown_order(&self) -> Vec<String> {
        let mut remaining: Vec<String> = self.enable_order.iter().rev().cloned().collect();
        let mut order = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let pos = remaining
                .iter()
                .position(|name| {
                    !self
                        .graph
                        .dependents_of(name)
                        .iter()
                        .any(|d| d != name && remaining.contains(d))
                })
                .unwrap_or(0);
            order.push(remaining.remove(pos));
        }
        order
    }

    fn shutdown(&mut self) -> Vec<JoinHandle<()>> {
        let order = self.shutdown_order();
        let mut tasks: Vec<JoinHandle<()>> = order
            .iter()
            .filter_map(|name| self.disable_instance(name))
            .collect();
        tasks.extend(self.scheduler.stop_all());
        debug!(plugins = self.plugins.len(), "Dispatcher shut down");
        tasks
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    fn query(&self, plugin: Option<&str>) -> ManagerResult<Vec<PluginStatus>> {
        match plugin {
            Some(name) => {
                let plugin = self
                    .plugins
                    .get(name)
                    .ok_or_else(|| ManagerError::PluginNotFound(name.to_string()))?;
                Ok(vec![self.plugin_status(plugin)])
            }
            None => Ok(self
                .plugins
                .values()
                .map(|plugin| self.plugin_status(plugin))
                .collect()),
        }
    }

    fn plugin_status(&self, plugin: &Plugin) -> PluginStatus {
        PluginStatus {
            name: plugin.name.clone(),
            path: plugin.path.clone(),
            loaded_at: plugin.loaded_at,
            instances: plugin
                .instances
                .iter()
                .filter_map(|name| self.instances.get(name))
                .map(|slot| self.instance_status(slot))
                .collect(),
        }
    }

    fn instance_status(&self, slot: &InstanceSlot) -> InstanceStatus {
        let info = slot.cell.info();
        InstanceStatus {
            name: info.name.clone(),
            plugin: info.plugin.clone(),
            description: info.description.clone(),
            kind: info.kind,
            priority: info.priority,
            period: info.period,
            available: self.graph.is_available(&info.name),
            enabled: slot.is_enabled(),
            enable_count: slot.enable_count,
            open_topics: slot.open_topics.values().cloned().collect(),
            dependencies: self
                .graph
                .query_dependencies(&info.name)
                .unwrap_or_default(),
        }
    }

    fn query_dependencies(&self, instance: Option<&str>) -> ManagerResult<Vec<DependencyEdge>> {
        match instance {
            Some(name) => self
                .graph
                .query_dependencies(name)
                .ok_or_else(|| ManagerError::InstanceNotFound(name.to_string())),
            None => Ok(self.graph.query_all_dependencies()),
        }
    }
}
