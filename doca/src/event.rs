//! Domain events and the pending-events buffer carried by aggregates.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Timezone-aware "now" used as the default event timestamp.
pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Upcast helper so trait objects can be downcast to their concrete type.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// An immutable fact describing a domain state change.
///
/// Implementors are plain structs; they are shared as [`EventRef`] once
/// emitted so the same value can travel from the aggregate to the
/// repository buffer and on to the event bus without copying.
pub trait Event: AsAny + Debug {
    /// Creation timestamp.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Short event name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("Event")
    }
}

impl dyn Event {
    pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Event>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

pub type EventRef = Arc<dyn Event>;

/// Ordered buffer of events not yet handed to a repository.
#[derive(Clone, Debug, Default)]
pub struct PendingEvents(Vec<EventRef>);

impl PendingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<E: Event>(&mut self, event: E) {
        self.0.push(Arc::new(event));
    }

    pub fn extend<I: IntoIterator<Item = EventRef>>(&mut self, events: I) {
        self.0.extend(events);
    }

    pub fn as_slice(&self) -> &[EventRef] {
        &self.0
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Move every pending event out, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<EventRef> {
        std::mem::take(&mut self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct WheelChanged {
        position: &'static str,
        at: DateTime<Utc>,
    }

    impl Event for WheelChanged {
        fn timestamp(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[derive(Debug)]
    struct Other;

    impl Event for Other {
        fn timestamp(&self) -> DateTime<Utc> {
            DateTime::<Utc>::UNIX_EPOCH
        }
    }

    #[test]
    fn default_name_is_the_bare_type_name() {
        let e = WheelChanged { position: "top_left", at: utc_now() };
        assert_eq!(e.name(), "WheelChanged");
    }

    #[test]
    fn downcast_through_trait_object() {
        let e: EventRef = Arc::new(WheelChanged { position: "top_left", at: utc_now() });
        assert!(e.is::<WheelChanged>());
        assert!(!e.is::<Other>());
        assert_eq!(e.downcast_ref::<WheelChanged>().map(|w| w.position), Some("top_left"));
    }

    #[test]
    fn take_preserves_order_and_empties() {
        let mut pending = PendingEvents::new();
        pending.push(WheelChanged { position: "a", at: utc_now() });
        pending.push(Other);
        let taken = pending.take();
        assert_eq!(taken.len(), 2);
        assert!(taken[0].is::<WheelChanged>());
        assert!(taken[1].is::<Other>());
        assert!(pending.is_empty());
    }
}
