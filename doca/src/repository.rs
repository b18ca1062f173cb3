//! Repositories and event tracking.
//!
//! Every repository adapter is a [`Tracked`] proxy around a storage
//! implementation ([`Store`]). The proxy owns the [`RepositoryState`]: the
//! pending-events buffer and the lazily started session. Operations that take
//! aggregates go through [`Tracked::track`] / [`Tracked::track_all`], which
//! move the aggregates' pending events into the buffer before the storage
//! code runs. The buffer is drained only by the unit of work holding the
//! repository.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::aggregate::AggregateRoot;
use crate::error::SessionError;
use crate::event::EventRef;
use crate::session::{downcast_session, Session, SessionRef};

type SessionStarter = Arc<dyn Fn() -> Result<SessionRef, SessionError> + Send + Sync>;

/// Pending events and session slot owned by one repository instance.
pub struct RepositoryState {
    events: Mutex<Vec<EventRef>>,
    session: Mutex<Option<SessionRef>>,
    starter: SessionStarter,
}

impl RepositoryState {
    pub fn new<F>(starter: F) -> Self
    where
        F: Fn() -> Result<SessionRef, SessionError> + Send + Sync + 'static,
    {
        Self {
            events: Mutex::new(Vec::new()),
            session: Mutex::new(None),
            starter: Arc::new(starter),
        }
    }

    /// Current session, starting one on first use.
    pub fn session(&self) -> Result<SessionRef, SessionError> {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = slot.as_ref() {
            return Ok(Arc::clone(session));
        }
        let session = (self.starter)()?;
        debug!(url = session.url(), "session started");
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    pub fn set_session(&self, session: SessionRef) {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(session);
    }

    /// Forget the current session; the next use starts a fresh one.
    pub fn clear_session(&self) -> Option<SessionRef> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn has_session(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Harvest an aggregate: append its pending events and clear them.
    pub fn harvest<A: AggregateRoot + ?Sized>(&self, aggregate: &mut A) {
        let taken = aggregate.take_events();
        if taken.is_empty() {
            return;
        }
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.extend(taken);
    }

    /// Drain the buffer, oldest first.
    pub fn take_events(&self) -> Vec<EventRef> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *events)
    }

    pub fn pending_events(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl fmt::Debug for RepositoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryState")
            .field("pending_events", &self.pending_events())
            .field("has_session", &self.has_session())
            .finish()
    }
}

/// Base contract of every repository port.
///
/// Only [`Tracked`] implements it, so every repository an application can
/// bind records the events of the aggregates it is handed.
pub trait Repository: Send + Sync + 'static {
    fn state(&self) -> &RepositoryState;

    fn into_repository_ref(self: Arc<Self>) -> Arc<dyn Repository>;

    fn session(&self) -> Result<SessionRef, SessionError> {
        self.state().session()
    }

    fn set_session(&self, session: SessionRef) {
        self.state().set_session(session);
    }

    fn clear_session(&self) {
        self.state().clear_session();
    }

    fn take_events(&self) -> Vec<EventRef> {
        self.state().take_events()
    }

    fn pending_events(&self) -> usize {
        self.state().pending_events()
    }
}

impl dyn Repository {
    /// The current session as a concrete session type.
    pub fn session_as<S: Session>(&self) -> Result<Arc<S>, SessionError> {
        let session = self.session()?;
        let url = session.url().to_string();
        downcast_session::<S>(session).ok_or_else(|| {
            SessionError::Storage(format!("session {url} is not a {}", std::any::type_name::<S>()))
        })
    }
}

/// Storage side of a repository adapter.
pub trait Store: Send + Sync + 'static {
    type Session: Session;

    fn start_session(&self) -> Result<Self::Session, SessionError>;
}

/// Event-tracking proxy around a [`Store`].
///
/// Port traits are implemented for `Tracked<MyStore>`; each operation that
/// receives aggregates wraps its body in [`track`](Tracked::track) so the
/// harvest happens exactly once, before the storage code sees the aggregate.
pub struct Tracked<S: Store> {
    store: Arc<S>,
    state: RepositoryState,
}

impl<S: Store> Tracked<S> {
    pub fn new(store: S) -> Self {
        let store = Arc::new(store);
        let starter = Arc::clone(&store);
        let state = RepositoryState::new(move || {
            let session: SessionRef = Arc::new(starter.start_session()?);
            Ok(session)
        });
        Self { store, state }
    }

    pub fn shared(store: S) -> Arc<Self> {
        Arc::new(Self::new(store))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The current session as the store's concrete session type.
    pub fn typed_session(&self) -> Result<Arc<S::Session>, SessionError> {
        let repository: &dyn Repository = self;
        repository.session_as::<S::Session>()
    }

    /// Harvest `aggregate`, then run `op` on it.
    pub fn track<A, T>(&self, aggregate: &mut A, op: impl FnOnce(&mut A) -> T) -> T
    where
        A: AggregateRoot,
    {
        self.state.harvest(aggregate);
        op(aggregate)
    }

    /// Harvest every aggregate of a sequence argument in order, then run `op`.
    pub fn track_all<A, T>(&self, aggregates: &mut [A], op: impl FnOnce(&mut [A]) -> T) -> T
    where
        A: AggregateRoot,
    {
        for aggregate in aggregates.iter_mut() {
            self.state.harvest(aggregate);
        }
        op(aggregates)
    }
}

impl<S: Store> Repository for Tracked<S> {
    fn state(&self) -> &RepositoryState {
        &self.state
    }

    fn into_repository_ref(self: Arc<Self>) -> Arc<dyn Repository> {
        self
    }
}

impl<S: Store> fmt::Debug for Tracked<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("store", &std::any::type_name::<S>())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Entity;
    use crate::event::{utc_now, Event, PendingEvents};
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Renamed {
        to: String,
        at: DateTime<Utc>,
    }

    impl Event for Renamed {
        fn timestamp(&self) -> DateTime<Utc> {
            self.at
        }
    }

    struct Doc {
        id: u32,
        title: String,
        events: PendingEvents,
    }

    impl Doc {
        fn new(id: u32) -> Self {
            Self { id, title: String::new(), events: PendingEvents::new() }
        }

        fn rename(&mut self, to: &str) {
            self.title = to.to_string();
            self.add_event(Renamed { to: to.to_string(), at: utc_now() });
        }
    }

    impl Entity for Doc {
        type Id = u32;
        const KIND: &'static str = "Doc";
        fn id(&self) -> u32 {
            self.id
        }
    }

    impl AggregateRoot for Doc {
        fn pending(&self) -> &PendingEvents {
            &self.events
        }
        fn pending_mut(&mut self) -> &mut PendingEvents {
            &mut self.events
        }
    }

    struct NullSession;

    impl Session for NullSession {
        fn url(&self) -> &str {
            "null://"
        }
        fn commit(&self) -> Result<(), SessionError> {
            Ok(())
        }
        fn rollback(&self) -> Result<(), SessionError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingStore {
        starts: AtomicUsize,
        saved: Mutex<Vec<String>>,
    }

    impl Store for CountingStore {
        type Session = NullSession;

        fn start_session(&self) -> Result<NullSession, SessionError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(NullSession)
        }
    }

    impl Tracked<CountingStore> {
        fn save(&self, doc: &mut Doc) -> usize {
            self.track(doc, |doc| {
                let mut saved = self.store().saved.lock().unwrap();
                saved.push(doc.title.clone());
                doc.get_events().len()
            })
        }

        fn save_all(&self, docs: &mut [Doc]) {
            self.track_all(docs, |docs| {
                let mut saved = self.store().saved.lock().unwrap();
                saved.extend(docs.iter().map(|d| d.title.clone()));
            })
        }
    }

    fn titles(events: &[EventRef]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| e.downcast_ref::<Renamed>().map(|r| r.to.clone()))
            .collect()
    }

    #[test]
    fn harvest_moves_events_in_order_before_the_operation() {
        let repo = Tracked::new(CountingStore::default());
        let mut doc = Doc::new(1);
        doc.rename("e1");
        doc.rename("e2");

        let seen_by_store = repo.save(&mut doc);

        assert_eq!(seen_by_store, 0);
        assert!(doc.get_events().is_empty());
        assert_eq!(titles(&repo.take_events()), vec!["e1", "e2"]);
    }

    #[test]
    fn second_call_harvests_nothing_new() {
        let repo = Tracked::new(CountingStore::default());
        let mut doc = Doc::new(1);
        doc.rename("e1");

        repo.save(&mut doc);
        repo.save(&mut doc);

        assert_eq!(repo.pending_events(), 1);
        assert_eq!(repo.store().saved.lock().unwrap().len(), 2);
    }

    #[test]
    fn sequence_arguments_are_harvested_per_element() {
        let repo = Tracked::new(CountingStore::default());
        let mut docs = vec![Doc::new(1), Doc::new(2)];
        docs[0].rename("a1");
        docs[1].rename("b1");
        docs[0].rename("a2");

        repo.save_all(&mut docs);

        assert_eq!(titles(&repo.take_events()), vec!["a1", "a2", "b1"]);
        assert!(docs.iter().all(|d| d.get_events().is_empty()));
    }

    #[test]
    fn take_events_empties_the_buffer() {
        let repo = Tracked::new(CountingStore::default());
        let mut doc = Doc::new(7);
        doc.rename("x");
        repo.save(&mut doc);

        assert_eq!(repo.take_events().len(), 1);
        assert!(repo.take_events().is_empty());
    }

    #[test]
    fn session_is_started_lazily_once() {
        let repo = Tracked::new(CountingStore::default());
        assert!(!repo.state().has_session());

        let first = repo.session().unwrap();
        let second = repo.session().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(repo.store().starts.load(Ordering::SeqCst), 1);
        assert!(repo.typed_session().is_ok());
    }

    #[test]
    fn cleared_session_is_started_again_on_next_use() {
        let repo = Tracked::new(CountingStore::default());
        let first = repo.session().unwrap();

        repo.clear_session();
        assert!(!repo.state().has_session());
        let second = repo.session().unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(repo.store().starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn set_session_replaces_the_lazy_one() {
        let repo = Tracked::new(CountingStore::default());
        let shared: SessionRef = Arc::new(NullSession);
        repo.set_session(Arc::clone(&shared));

        assert!(Arc::ptr_eq(&repo.session().unwrap(), &shared));
        assert_eq!(repo.store().starts.load(Ordering::SeqCst), 0);
    }
}
