//! Topics
//!
//! A topic names one data stream produced by an instance.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator used when deriving a [`TopicKey`]; keeps `("ab", "c")` and
/// `("a", "bc")` apart.
const KEY_SEPARATOR: &str = "::";

/// One data stream an instance can produce
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic {
    instance_name: String,
    topic_name: String,
    #[serde(default)]
    params: String,
}

impl Topic {
    /// Create a topic
    pub fn new(
        instance_name: impl Into<String>,
        topic_name: impl Into<String>,
        params: impl Into<String>,
    ) -> Self {
        Self {
            instance_name: instance_name.into(),
            topic_name: topic_name.into(),
            params: params.into(),
        }
    }

    /// Name of the instance publishing this topic
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Topic name within the publishing instance
    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    /// Free-form parameters (empty when unused)
    pub fn params(&self) -> &str {
        &self.params
    }

    /// Canonical map key for this topic
    pub fn key(&self) -> TopicKey {
        TopicKey(format!(
            "{}{sep}{}{sep}{}",
            self.instance_name,
            self.topic_name,
            self.params,
            sep = KEY_SEPARATOR
        ))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}/{}", self.instance_name, self.topic_name)
        } else {
            write!(f, "{}/{}?{}", self.instance_name, self.topic_name, self.params)
        }
    }
}

/// Canonical string key derived from a [`Topic`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicKey(String);

impl TopicKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Topic> for TopicKey {
    fn from(topic: &Topic) -> Self {
        topic.key()
    }
}
