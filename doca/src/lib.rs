//! Ports, adapters, units of work and post-commit domain events.
//!
//! The crate holds the coordination layer an application core is built on:
//!
//! - a registry of declared ports ([`port`]),
//! - the process-wide adapter binding table and injector ([`injector`]),
//! - repositories that record the events of the aggregates they are handed
//!   ([`repository`]),
//! - the unit of work that commits repositories together and only then
//!   publishes their events ([`unit_of_work`]),
//! - the context-scoped event bus ([`event_bus`]).
//!
//! Concrete storage lives in adapter crates; [`adapters::memory`] is kept
//! here for tests and demos.

pub mod adapters;
pub mod aggregate;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod injector;
pub mod port;
pub mod repository;
pub mod session;
pub mod unit_of_work;
pub mod use_case;

pub use aggregate::{AggregateRoot, Entity};
pub use error::{BusError, DocaError, EntityError, Result, SessionError};
pub use event::{utc_now, AsAny, Event, EventRef, PendingEvents};
pub use event_bus::EventBus;
pub use injector::{
    bind, bind_factory, bind_instance, bootstrap, clear, inject, inject_repository, is_bound,
    Adapter, AdaptersConfig,
};
pub use port::{Port, PortInfo, PortKind};
pub use repository::{Repository, RepositoryState, Store, Tracked};
pub use session::{downcast_session, Session, SessionRef};
pub use unit_of_work::{Member, Members, Scope, UnitOfWork, UowState};
pub use use_case::{execute, Command, UseCase};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Mutex, MutexGuard, PoisonError};

    static BINDINGS: Mutex<()> = Mutex::new(());

    /// Serializes tests that touch the process-wide binding table.
    pub(crate) fn serial() -> MutexGuard<'static, ()> {
        BINDINGS.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
