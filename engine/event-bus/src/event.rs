//! Event types carried by the bus

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Result returned by subscriber handlers
pub type HandlerResult = anyhow::Result<()>;

/// A named group of event types
///
/// Stands in for a supertype: an event type lists the categories it belongs to,
/// and a category subscriber receives every event of every member type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Category(&'static str);

impl Category {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Marker for types that can be published on the bus
///
/// ```
/// use event_bus::{Category, Event};
///
/// const INBOUND: Category = Category::new("inbound");
///
/// struct MessageReceived {
///     chat_id: i64,
/// }
///
/// impl Event for MessageReceived {
///     const CATEGORIES: &'static [Category] = &[INBOUND];
/// }
/// ```
pub trait Event: Any + Send + Sync + 'static {
    /// Categories this event type belongs to
    const CATEGORIES: &'static [Category] = &[];
}

/// Subscription target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Topic {
    Type(TypeId),
    Category(Category),
    All,
}

/// A published event with its type information erased
///
/// Handlers subscribed by category or to all events receive the envelope and
/// recover the concrete event with [`EventEnvelope::downcast_ref`].
#[derive(Clone)]
pub struct EventEnvelope {
    type_id: TypeId,
    type_name: &'static str,
    categories: &'static [Category],
    payload: Arc<dyn Any + Send + Sync>,
    published_at: Instant,
}

impl EventEnvelope {
    pub fn new<E: Event>(event: E) -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            categories: E::CATEGORIES,
            payload: Arc::new(event),
            published_at: Instant::now(),
        }
    }

    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.payload.as_ref().downcast_ref::<E>()
    }

    pub fn is<E: Event>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn categories(&self) -> &'static [Category] {
        self.categories
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }

    pub fn published_at(&self) -> Instant {
        self.published_at
    }

    /// Topics this envelope is delivered to, in dispatch order, without duplicates
    pub(crate) fn topics(&self) -> Vec<Topic> {
        let mut topics = Vec::with_capacity(self.categories.len() + 2);
        topics.push(Topic::Type(self.type_id));
        for (i, category) in self.categories.iter().enumerate() {
            if !self.categories[..i].contains(category) {
                topics.push(Topic::Category(*category));
            }
        }
        topics.push(Topic::All);
        topics
    }
}

impl fmt::Debug for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEnvelope")
            .field("type_name", &self.type_name)
            .field("categories", &self.categories)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INBOUND: Category = Category::new("inbound");
    const AUDIT: Category = Category::new("audit");

    #[derive(Debug, PartialEq)]
    struct Ping(u32);
    impl Event for Ping {}

    struct Tagged;
    impl Event for Tagged {
        const CATEGORIES: &'static [Category] = &[INBOUND, AUDIT, INBOUND];
    }

    #[test]
    fn test_downcast() {
        let envelope = EventEnvelope::new(Ping(7));
        assert!(envelope.is::<Ping>());
        assert!(!envelope.is::<Tagged>());
        assert_eq!(envelope.downcast_ref::<Ping>(), Some(&Ping(7)));
        assert!(envelope.downcast_ref::<Tagged>().is_none());
    }

    #[test]
    fn test_topics_without_categories() {
        let envelope = EventEnvelope::new(Ping(1));
        assert_eq!(
            envelope.topics(),
            vec![Topic::Type(TypeId::of::<Ping>()), Topic::All]
        );
    }

    #[test]
    fn test_topics_deduplicate_categories() {
        let envelope = EventEnvelope::new(Tagged);
        assert!(envelope.has_category(AUDIT));
        assert_eq!(
            envelope.topics(),
            vec![
                Topic::Type(TypeId::of::<Tagged>()),
                Topic::Category(INBOUND),
                Topic::Category(AUDIT),
                Topic::All,
            ]
        );
    }
}
