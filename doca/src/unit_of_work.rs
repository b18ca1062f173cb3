//! Unit of work: a transactional boundary over repositories sharing a
//! session.
//!
//! ```ignore
//! doca::unit_of_work! {
//!     pub struct BudgetUow {
//!         pub budgets: dyn BudgetRepository,
//!     }
//! }
//!
//! let mut uow = UnitOfWork::<BudgetUow>::new()?;
//! uow.run(|members| members.budgets.save(&mut budget, true))?;
//! ```
//!
//! Entering ([`UnitOfWork::begin`]) reconciles the members' sessions. The
//! returned [`Scope`] commits only through [`Scope::commit`]; every other
//! way out of the scope (an explicit rollback, an early return, a panic, a
//! dropped future) rolls back and discards the buffered events.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::{DocaError, Result};
use crate::event::EventRef;
use crate::event_bus::EventBus;
use crate::injector;
use crate::port::Port;
use crate::repository::Repository;
use crate::session::SessionRef;

/// A repository member of a unit of work.
///
/// Derefs to the port so members are used like the injected adapter.
pub struct Member<P: Port + ?Sized> {
    name: &'static str,
    port: Arc<P>,
    repository: Arc<dyn Repository>,
}

impl<P: Port + ?Sized> Member<P> {
    /// Inject the adapter bound to `P`, which must be a repository port.
    pub fn inject(name: &'static str) -> Result<Self> {
        let (port, repository) = injector::inject_repository::<P>()?;
        Ok(Self { name, port, repository })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn port(&self) -> &Arc<P> {
        &self.port
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }
}

impl<P: Port + ?Sized> Deref for Member<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.port
    }
}

impl<P: Port + ?Sized> fmt::Debug for Member<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("port", &P::NAME)
            .finish()
    }
}

/// The declared set of repositories of a unit of work.
///
/// Implemented by [`unit_of_work!`](crate::unit_of_work).
pub trait Members: Sized {
    /// Resolve every member through the injector.
    fn inject() -> Result<Self>;

    /// Members in declaration order.
    fn repositories(&self) -> Vec<(&'static str, Arc<dyn Repository>)>;
}

/// Declare a unit of work struct whose fields are repository ports.
#[macro_export]
macro_rules! unit_of_work {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($fvis:vis $field:ident : $port:ty),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $($fvis $field: $crate::Member<$port>,)+
        }

        impl $crate::Members for $name {
            fn inject() -> $crate::Result<Self> {
                ::core::result::Result::Ok(Self {
                    $($field: $crate::Member::<$port>::inject(stringify!($field))?,)+
                })
            }

            fn repositories(
                &self,
            ) -> ::std::vec::Vec<(&'static str, ::std::sync::Arc<dyn $crate::Repository>)> {
                ::std::vec![
                    $((self.$field.name(), ::std::sync::Arc::clone(self.$field.repository())),)+
                ]
            }
        }
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UowState {
    Created,
    Active,
    Committed,
    RolledBack,
}

impl UowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UowState::Created => "created",
            UowState::Active => "active",
            UowState::Committed => "committed",
            UowState::RolledBack => "rolled back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UowState::Committed | UowState::RolledBack)
    }
}

impl fmt::Display for UowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-use transactional boundary over the members `M`.
pub struct UnitOfWork<M: Members> {
    members: M,
    state: UowState,
    session: Option<SessionRef>,
    bus: Option<EventBus>,
}

impl<M: Members> UnitOfWork<M> {
    pub fn new() -> Result<Self> {
        Ok(Self::from_members(M::inject()?))
    }

    pub fn from_members(members: M) -> Self {
        Self {
            members,
            state: UowState::Created,
            session: None,
            bus: None,
        }
    }

    /// Publish to `bus` instead of the context's current bus.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn state(&self) -> UowState {
        self.state
    }

    /// The reconciled session; only set once the unit of work was entered.
    pub fn session(&self) -> Result<SessionRef> {
        self.session.clone().ok_or(DocaError::SessionNotSet)
    }

    pub fn repositories(&self) -> Vec<(&'static str, Arc<dyn Repository>)> {
        self.members.repositories()
    }

    pub fn members(&self) -> &M {
        &self.members
    }

    fn expect_state(&self, expected: UowState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(DocaError::InvalidState {
                expected: expected.as_str(),
                found: self.state.as_str(),
            })
        }
    }

    /// Enter the unit of work.
    ///
    /// All members must report the same session; it then becomes the
    /// session of every member. On error the unit of work stays created
    /// and nothing is committed.
    pub fn begin(&mut self) -> Result<Scope<'_, M>> {
        self.expect_state(UowState::Created)?;

        let mut shared: Option<SessionRef> = None;
        let repositories = self.members.repositories();
        for (name, repository) in &repositories {
            let session = repository.session()?;
            match &shared {
                None => shared = Some(session),
                Some(expected) if **expected == *session => {}
                Some(expected) => {
                    error!(
                        member = *name,
                        expected = expected.url(),
                        found = session.url(),
                        "unit of work cannot manage different sessions"
                    );
                    return Err(DocaError::DifferentSessions {
                        expected: expected.url().to_string(),
                        found: session.url().to_string(),
                    });
                }
            }
        }
        let session = shared.ok_or(DocaError::SessionNotSet)?;
        for (_, repository) in &repositories {
            repository.set_session(Arc::clone(&session));
        }

        debug!(url = session.url(), members = repositories.len(), "unit of work entered");
        self.session = Some(session);
        self.state = UowState::Active;
        Ok(Scope { uow: self, finished: false })
    }

    /// Run `work` inside the unit of work: `Ok` commits, `Err` rolls back
    /// and hands the error back.
    pub fn run<T, E, F>(&mut self, work: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&M) -> std::result::Result<T, E>,
        E: From<DocaError>,
    {
        let scope = self.begin()?;
        match work(&*scope) {
            Ok(value) => {
                scope.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = scope.rollback() {
                    error!(error = %rollback_err, "rollback after failed work");
                }
                Err(err)
            }
        }
    }

    /// Drain every member's buffer, in member order.
    fn collect_events(&self) -> Vec<EventRef> {
        self.members
            .repositories()
            .into_iter()
            .flat_map(|(_, repository)| repository.take_events())
            .collect()
    }

    fn commit(&mut self) -> Result<usize> {
        self.expect_state(UowState::Active)?;
        let session = self.session()?;

        if let Err(err) = session.commit() {
            let discarded = self.collect_events().len();
            self.state = UowState::RolledBack;
            error!(url = session.url(), events = discarded, error = %err, "Error while committing the session");
            if let Err(rollback_err) = session.rollback() {
                error!(url = session.url(), error = %rollback_err, "rollback after failed commit");
            }
            self.release_sessions();
            return Err(err.into());
        }
        self.state = UowState::Committed;
        self.release_sessions();

        let events = self.collect_events();
        let bus = self.bus.clone().unwrap_or_else(EventBus::current);
        let published = bus.publish(events);
        debug!(url = session.url(), events = published, "unit of work committed");
        Ok(published)
    }

    fn rollback(&mut self) -> Result<()> {
        self.expect_state(UowState::Active)?;
        let session = self.session()?;

        let discarded = self.collect_events().len();
        if discarded > 0 {
            warn!(url = session.url(), events = discarded, "discarding events of rolled back unit of work");
        }
        self.state = UowState::RolledBack;
        let rolled_back = session.rollback();
        self.release_sessions();
        rolled_back?;
        debug!(url = session.url(), "unit of work rolled back");
        Ok(())
    }

    /// Detach the shared session from every member so a member outliving
    /// this unit of work starts over with a fresh session.
    fn release_sessions(&self) {
        for (_, repository) in self.members.repositories() {
            repository.clear_session();
        }
    }
}

impl<M: Members> fmt::Debug for UnitOfWork<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("state", &self.state)
            .field("session", &self.session.as_ref().map(|s| s.url().to_string()))
            .finish()
    }
}

/// An entered unit of work. Dropping it without [`commit`](Scope::commit)
/// rolls back.
#[must_use = "dropping the scope rolls the unit of work back"]
pub struct Scope<'a, M: Members> {
    uow: &'a mut UnitOfWork<M>,
    finished: bool,
}

impl<M: Members> Scope<'_, M> {
    pub fn session(&self) -> Result<SessionRef> {
        self.uow.session()
    }

    /// Commit the session, then publish the collected events.
    ///
    /// On commit failure the events are discarded and the session error is
    /// returned as is. Returns the number of events published.
    pub fn commit(mut self) -> Result<usize> {
        self.finished = true;
        self.uow.commit()
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.uow.rollback()
    }
}

impl<M: Members> Deref for Scope<'_, M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.uow.members
    }
}

impl<M: Members> Drop for Scope<'_, M> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.uow.rollback() {
            error!(error = %err, "rollback on scope exit failed");
        }
    }
}
