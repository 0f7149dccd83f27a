//! Message Router
//!
//! Applies instance messages on the dispatcher thread:
//! - `Subscribe` enables the publisher if needed, opens the topic and records
//!   a `subscriber -> publisher` dependency edge
//! - `Unsubscribe` removes the subscriber and closes topics nobody listens to
//! - `PublishData` hands the data to every enabled subscriber in the order
//!   they subscribed. A subscriber busy in `run` takes it once the run
//!   returns, so a slow subscriber never holds up the others
//!
//! Failures here never reach a caller; they are logged and the message is
//! dropped.

use std::sync::Arc;

use hostaware_types::{Payload, Topic};
use tracing::{debug, trace, warn};

use super::dispatcher::Dispatcher;

/// Subscribers of one topic, in registration order
#[derive(Debug, Clone)]
pub(crate) struct Subscription {
    pub topic: Topic,
    pub subscribers: Vec<String>,
}

impl Dispatcher {
    pub(super) fn subscribe(&mut self, subscriber: &str, topic: Topic) {
        let key = topic.key();
        let publisher = topic.instance_name().to_string();

        match self.instances.get(subscriber) {
            Some(slot) if slot.is_enabled() => {}
            Some(_) => {
                warn!(subscriber, topic = %key, "Ignoring subscribe from disabled instance");
                return;
            }
            None => {
                warn!(subscriber, topic = %key, "Ignoring subscribe from unknown instance");
                return;
            }
        }

        let Some(publisher_slot) = self.instances.get(&publisher) else {
            warn!(subscriber, topic = %key, "Publisher instance does not exist");
            return;
        };
        if !publisher_slot.cell.info().supports(&topic) {
            warn!(subscriber, topic = %key, "Publisher does not support topic");
            return;
        }

        if self
            .subscriptions
            .get(&key)
            .is_some_and(|sub| sub.subscribers.iter().any(|s| s == subscriber))
        {
            debug!(subscriber, topic = %key, "Already subscribed");
            return;
        }

        if subscriber != publisher
            && self
                .graph
                .transitive_dependencies(&publisher)
                .iter()
                .any(|dep| dep == subscriber)
        {
            warn!(subscriber, topic = %key, "Subscription would create a dependency cycle");
            return;
        }

        let publisher_enabled = publisher_slot.is_enabled();
        if !publisher_enabled {
            if let Err(e) = self.enable(&publisher, "") {
                warn!(subscriber, topic = %key, error = %e, "Failed to enable publisher");
                return;
            }
        }

        let Some(publisher_slot) = self.instances.get_mut(&publisher) else {
            return;
        };
        if !publisher_slot.open_topics.contains_key(&key) {
            publisher_slot.open_topic(&topic);
        }

        self.subscriptions
            .entry(key.clone())
            .or_insert_with(|| Subscription {
                topic,
                subscribers: Vec::new(),
            })
            .subscribers
            .push(subscriber.to_string());

        if subscriber != publisher {
            self.graph.add_edge(subscriber, &publisher);
        }
        debug!(subscriber, topic = %key, "Subscribed");
    }

    pub(super) fn unsubscribe(&mut self, subscriber: &str, topic: &Topic) {
        let key = topic.key();
        let Some(sub) = self.subscriptions.get_mut(&key) else {
            trace!(subscriber, topic = %key, "Unsubscribe from topic without subscribers");
            return;
        };
        let Some(pos) = sub.subscribers.iter().position(|s| s == subscriber) else {
            trace!(subscriber, topic = %key, "Unsubscribe from topic not subscribed to");
            return;
        };
        sub.subscribers.remove(pos);

        if sub.subscribers.is_empty() {
            self.subscriptions.remove(&key);
            if let Some(publisher) = self.instances.get_mut(topic.instance_name()) {
                if publisher.open_topics.contains_key(&key) {
                    publisher.close_topic(topic);
                }
            }
        }

        self.release_edge(subscriber, topic.instance_name());
        debug!(subscriber, topic = %key, "Unsubscribed");
    }

    /// Remove `subscriber` from every topic it listens to
    pub(super) fn drop_subscriber(&mut self, subscriber: &str) {
        let topics: Vec<Topic> = self
            .subscriptions
            .values()
            .filter(|sub| sub.subscribers.iter().any(|s| s == subscriber))
            .map(|sub| sub.topic.clone())
            .collect();
        for topic in &topics {
            self.unsubscribe(subscriber, topic);
        }
    }

    /// Drop the `subscriber -> publisher` edge once no subscription or
    /// declared dependency needs it
    fn release_edge(&mut self, subscriber: &str, publisher: &str) {
        if subscriber == publisher {
            return;
        }
        let still_subscribed = self.subscriptions.values().any(|sub| {
            sub.topic.instance_name() == publisher
                && sub.subscribers.iter().any(|s| s == subscriber)
        });
        let declared = self
            .instances
            .get(subscriber)
            .is_some_and(|slot| slot.cell.info().dependencies.iter().any(|d| d == publisher));
        if !still_subscribed && !declared {
            self.graph.delete_edge(subscriber, publisher);
        }
    }

    pub(super) fn publish(&self, origin: &str, payload: Payload) {
        let topic = payload.topic();
        if topic.instance_name() != origin {
            warn!(origin, topic = %topic, "Dropping publish on another instance's topic");
            return;
        }

        let key = topic.key();
        let Some(publisher) = self.instances.get(origin) else {
            return;
        };
        if !publisher.open_topics.contains_key(&key) {
            trace!(origin, topic = %key, "Dropping publish on unopened topic");
            return;
        }
        let Some(sub) = self.subscriptions.get(&key) else {
            return;
        };

        // Owned data is freed once the last subscriber has taken it; retained
        // data only loses these references
        let payload = Arc::new(payload);
        for name in &sub.subscribers {
            let Some(slot) = self.instances.get(name) else {
                continue;
            };
            if slot.is_enabled() {
                slot.cell.deliver(Arc::clone(&payload));
            }
        }
    }
}
