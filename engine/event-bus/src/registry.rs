//! Subscriber registry keyed by topic

use crate::event::{EventEnvelope, HandlerResult, Topic};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub(crate) type ErasedHandler = Arc<dyn Fn(&EventEnvelope) -> HandlerResult + Send + Sync>;

pub(crate) struct Subscriber {
    pub(crate) id: u64,
    pub(crate) handler: ErasedHandler,
}

/// Identifies one registration; pass it back to `EventBus::unsubscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    topic: Topic,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Concurrent map of topic to subscribers
///
/// Readers take a snapshot of the subscriber list so handlers run without any
/// registry lock held and may themselves subscribe or unsubscribe.
#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    topics: DashMap<Topic, Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, topic: Topic, handler: ErasedHandler) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.topics
            .entry(topic)
            .or_default()
            .push(Arc::new(Subscriber { id, handler }));
        SubscriptionHandle { id, topic }
    }

    /// Returns whether the subscription was still registered
    pub(crate) fn remove(&self, handle: &SubscriptionHandle) -> bool {
        let removed = match self.topics.get_mut(&handle.topic) {
            Some(mut subscribers) => {
                let before = subscribers.len();
                subscribers.retain(|s| s.id != handle.id);
                subscribers.len() != before
            }
            None => false,
        };
        self.topics
            .remove_if(&handle.topic, |_, subscribers| subscribers.is_empty());
        removed
    }

    /// Subscribers for the envelope: exact type, then categories, then all
    pub(crate) fn subscribers_for(&self, envelope: &EventEnvelope) -> Vec<Arc<Subscriber>> {
        let mut out = Vec::new();
        for topic in envelope.topics() {
            if let Some(subscribers) = self.topics.get(&topic) {
                out.extend(subscribers.iter().cloned());
            }
        }
        out
    }

    pub(crate) fn len(&self) -> usize {
        self.topics.iter().map(|entry| entry.value().len()).sum()
    }
}
