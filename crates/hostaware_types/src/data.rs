//! Data Lists
//!
//! The unit exchanged between a publishing instance and its subscribers.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::Topic;

// ─────────────────────────────────────────────────────────────────────────────
// Data Item
// ─────────────────────────────────────────────────────────────────────────────

/// A single type-erased value carried by a [`DataList`]
///
/// Subscribers recover the concrete type with [`DataItem::downcast_ref`].
pub struct DataItem(Box<dyn Any + Send + Sync>);

impl DataItem {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl fmt::Debug for DataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataItem(..)")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Data List
// ─────────────────────────────────────────────────────────────────────────────

/// Items published on one topic in one period
#[derive(Debug)]
pub struct DataList {
    pub topic: Topic,
    pub items: Vec<DataItem>,
}

impl DataList {
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            items: Vec::new(),
        }
    }

    /// Builder-style push
    pub fn with_item<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.push(value);
        self
    }

    pub fn push<T: Any + Send + Sync>(&mut self, value: T) {
        self.items.push(DataItem::new(value));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over the items of type `T`, skipping anything else
    pub fn iter_as<T: Any>(&self) -> impl Iterator<Item = &T> {
        self.items.iter().filter_map(|item| item.downcast_ref::<T>())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payload
// ─────────────────────────────────────────────────────────────────────────────

/// A published data list together with its ownership mode
///
/// `Owned` hands the list to the router, which drops it once every subscriber
/// has seen it. `Retained` shares a list the publisher keeps and reuses across
/// periods; the router only drops its own reference.
#[derive(Debug)]
pub enum Payload {
    Owned(DataList),
    Retained(Arc<DataList>),
}

impl Payload {
    pub fn data(&self) -> &DataList {
        match self {
            Payload::Owned(data) => data,
            Payload::Retained(data) => data.as_ref(),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.data().topic
    }

    /// Whether the router releases the data after delivery
    pub fn owns_payload(&self) -> bool {
        matches!(self, Payload::Owned(_))
    }
}

impl From<DataList> for Payload {
    fn from(data: DataList) -> Self {
        Payload::Owned(data)
    }
}

impl From<Arc<DataList>> for Payload {
    fn from(data: Arc<DataList>) -> Self {
        Payload::Retained(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_downcast() {
        let data = DataList::new(Topic::new("pmu", "cycles", ""))
            .with_item(42u64)
            .with_item("label".to_string())
            .with_item(7u64);

        assert_eq!(data.len(), 3);
        assert_eq!(data.items[0].downcast_ref::<u64>(), Some(&42));
        assert!(data.items[1].is::<String>());
        assert_eq!(data.iter_as::<u64>().copied().collect::<Vec<_>>(), vec![42, 7]);
    }

    #[test]
    fn test_retained_payload_outlives_router_copy() {
        let shared = Arc::new(DataList::new(Topic::new("cpu", "static", "")).with_item(1u8));
        let payload = Payload::from(Arc::clone(&shared));

        assert!(!payload.owns_payload());
        drop(payload);
        assert_eq!(Arc::strong_count(&shared), 1);
        assert_eq!(shared.len(), 1);
    }
}
