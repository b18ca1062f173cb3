//! Entities and aggregate roots.

use std::fmt::Display;

use crate::event::{Event, EventRef, PendingEvents};

/// A domain object defined by its identity rather than its attributes.
pub trait Entity {
    type Id: Clone + Eq + Display;

    /// Human readable kind used in errors, e.g. `"Budget"`.
    const KIND: &'static str;

    fn id(&self) -> Self::Id;

    /// Entities are the same when their ids are equal.
    fn same_identity(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        self.id() == other.id()
    }
}

/// Root of an aggregate: the only entry point that emits domain events.
///
/// Implementors own a [`PendingEvents`] buffer and expose it through the two
/// accessors; everything else is provided.
pub trait AggregateRoot: Entity {
    fn pending(&self) -> &PendingEvents;
    fn pending_mut(&mut self) -> &mut PendingEvents;

    fn add_event<E: Event>(&mut self, event: E)
    where
        Self: Sized,
    {
        self.pending_mut().push(event);
    }

    fn add_events<I: IntoIterator<Item = EventRef>>(&mut self, events: I)
    where
        Self: Sized,
    {
        self.pending_mut().extend(events);
    }

    fn get_events(&self) -> &[EventRef] {
        self.pending().as_slice()
    }

    fn clear_events(&mut self) {
        self.pending_mut().clear();
    }

    /// Harvest: return the pending events and clear them in one step.
    fn take_events(&mut self) -> Vec<EventRef> {
        self.pending_mut().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::utc_now;
    use chrono::{DateTime, Utc};

    #[derive(Debug)]
    struct WheelChanged {
        new_reference: String,
        at: DateTime<Utc>,
    }

    impl Event for WheelChanged {
        fn timestamp(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[derive(Clone, Debug)]
    struct Wheel {
        position: String,
        reference: String,
    }

    struct Car {
        vin: String,
        wheels: Vec<Wheel>,
        events: PendingEvents,
    }

    impl Entity for Car {
        type Id = String;
        const KIND: &'static str = "Car";

        fn id(&self) -> String {
            self.vin.to_lowercase()
        }
    }

    impl AggregateRoot for Car {
        fn pending(&self) -> &PendingEvents {
            &self.events
        }

        fn pending_mut(&mut self) -> &mut PendingEvents {
            &mut self.events
        }
    }

    impl Car {
        fn change_wheel(&mut self, new_wheel: Wheel) {
            self.wheels.retain(|w| w.position != new_wheel.position);
            self.add_event(WheelChanged {
                new_reference: new_wheel.reference.clone(),
                at: utc_now(),
            });
            self.wheels.push(new_wheel);
        }
    }

    fn car() -> Car {
        let wheels = ["top_left", "top_right", "bottom_left", "bottom_right"]
            .iter()
            .map(|p| Wheel { position: p.to_string(), reference: "ref1".into() })
            .collect();
        Car { vin: "VIN123".into(), wheels, events: PendingEvents::new() }
    }

    #[test]
    fn aggregate_records_events() {
        let mut car = car();
        car.change_wheel(Wheel { position: "top_left".into(), reference: "ref2".into() });

        assert_eq!(car.get_events().len(), 1);
        assert_eq!(car.wheels.len(), 4);
        assert!(car.wheels.iter().any(|w| w.reference == "ref2"));
        let event = car.get_events()[0].downcast_ref::<WheelChanged>().map(|e| e.new_reference.clone());
        assert_eq!(event.as_deref(), Some("ref2"));
    }

    #[test]
    fn take_events_clears_the_aggregate() {
        let mut car = car();
        car.change_wheel(Wheel { position: "top_left".into(), reference: "ref2".into() });
        car.change_wheel(Wheel { position: "top_right".into(), reference: "ref3".into() });

        let taken = car.take_events();
        assert_eq!(taken.len(), 2);
        assert!(car.get_events().is_empty());
        assert!(car.take_events().is_empty());
    }

    #[test]
    fn identity_ignores_attributes() {
        let a = car();
        let mut b = car();
        b.vin = "vin123".into();
        b.wheels.clear();
        assert!(a.same_identity(&b));
    }
}
