//! Error taxonomy for the coordination layer.

use thiserror::Error;

/// Failure reported by a storage session (start, commit or rollback).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session could not be started: {0}")]
    Start(String),
    #[error("commit failed: {0}")]
    Commit(String),
    #[error("rollback failed: {0}")]
    Rollback(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Identity-level failures raised by repositories and aggregates.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityError {
    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: &'static str, id: String },
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
}

impl EntityError {
    pub fn already_exists(kind: &'static str, id: impl Into<String>) -> Self {
        Self::AlreadyExists { kind, id: id.into() }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }
}

/// Failure to enqueue a single event on the bus.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("event queue is full ({capacity} events)")]
    Full { capacity: usize },
    #[error("event queue lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum DocaError {
    #[error("port {0} not found")]
    PortNotFound(String),

    #[error("port name {name} already registered for {existing}, cannot register {attempted}")]
    DuplicateRegistration {
        name: &'static str,
        existing: &'static str,
        attempted: &'static str,
    },

    #[error("adapter for {0} port not configured")]
    AdapterNotConfigured(&'static str),

    #[error("adapter configured under {port} was built for {adapter_port}")]
    AdapterMismatch {
        port: String,
        adapter_port: &'static str,
    },

    #[error("{0} is not a repository")]
    NotARepository(&'static str),

    #[error("unit of work cannot manage different sessions ({expected} vs {found})")]
    DifferentSessions { expected: String, found: String },

    #[error("unit of work session not set")]
    SessionNotSet,

    #[error("unit of work is {found}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Entity(#[from] EntityError),
}

pub type Result<T> = std::result::Result<T, DocaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_not_configured_message_names_the_port() {
        let err = DocaError::AdapterNotConfigured("EmailService");
        assert_eq!(err.to_string(), "adapter for EmailService port not configured");
    }

    #[test]
    fn session_errors_pass_through_unchanged() {
        let err: DocaError = SessionError::Commit("disk full".into()).into();
        assert_eq!(err.to_string(), "commit failed: disk full");
        assert!(matches!(err, DocaError::Session(SessionError::Commit(_))));
    }

    #[test]
    fn entity_error_display() {
        let err = EntityError::already_exists("Budget", "home");
        assert_eq!(err.to_string(), "Budget home already exists");
    }
}
