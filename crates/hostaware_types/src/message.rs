//! Instance Run Messages
//!
//! Commands instances produce for the message router. Each message is consumed
//! exactly once by the dispatcher.

use crate::{InstanceResult, Payload, Topic};

/// What an instance asks the router to do
#[derive(Debug)]
pub enum MessageKind {
    Subscribe(Topic),
    Unsubscribe(Topic),
    PublishData(Payload),
}

/// A command queued by an instance
#[derive(Debug)]
pub struct InstanceRunMessage {
    /// Instance that produced the message
    pub origin: String,
    pub kind: MessageKind,
}

impl InstanceRunMessage {
    pub fn subscribe(origin: impl Into<String>, topic: Topic) -> Self {
        Self {
            origin: origin.into(),
            kind: MessageKind::Subscribe(topic),
        }
    }

    pub fn unsubscribe(origin: impl Into<String>, topic: Topic) -> Self {
        Self {
            origin: origin.into(),
            kind: MessageKind::Unsubscribe(topic),
        }
    }

    pub fn publish(origin: impl Into<String>, payload: Payload) -> Self {
        Self {
            origin: origin.into(),
            kind: MessageKind::PublishData(payload),
        }
    }

    pub fn topic(&self) -> &Topic {
        match &self.kind {
            MessageKind::Subscribe(topic) | MessageKind::Unsubscribe(topic) => topic,
            MessageKind::PublishData(payload) => payload.topic(),
        }
    }
}

/// Destination for instance messages (implemented by the router's queue)
pub trait MessageSink: Send + Sync {
    fn send(&self, msg: InstanceRunMessage) -> InstanceResult;
}
