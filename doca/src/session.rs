//! Storage session contract consumed by repositories and units of work.

use std::fmt;
use std::sync::Arc;

use crate::error::SessionError;
use crate::event::AsAny;

/// An opaque storage connection / transaction scope.
///
/// Two sessions are the same session when they are of the same concrete type
/// and report the same canonical [`url`](Session::url).
pub trait Session: AsAny {
    /// Canonical identity of the backend this session talks to.
    fn url(&self) -> &str;

    fn commit(&self) -> Result<(), SessionError>;

    fn rollback(&self) -> Result<(), SessionError>;
}

pub type SessionRef = Arc<dyn Session>;

impl PartialEq for dyn Session {
    fn eq(&self, other: &Self) -> bool {
        self.as_any().type_id() == other.as_any().type_id() && self.url() == other.url()
    }
}

impl fmt::Debug for dyn Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("url", &self.url()).finish()
    }
}

/// Downcast a shared session to its concrete type.
pub fn downcast_session<S: Session>(session: SessionRef) -> Option<Arc<S>> {
    session.into_any_arc().downcast::<S>().ok()
}
