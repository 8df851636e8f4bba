//! Observability events for relaydb
//!
//! Every lifecycle transition a proxy handle goes through is named here.
//! Events are explicit and typed.

use std::fmt;

/// Observable events in relaydb
///
/// These events cover:
/// - Resource lifecycle (attach, close)
/// - Call channel transports
/// - Query preparation and execution
/// - Listener and callback registration
/// - Replicator sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Resource lifecycle
    /// Resource linked under its parent
    ResourceAttached,
    /// Resource closed and finalized
    ResourceClosed,
    /// Finalizer or child teardown reported a failure
    ResourceCloseFailed,

    // Transport
    /// Worker thread hosting the remote engine is running
    WorkerStarted,
    /// Worker thread drained its queue and exited
    WorkerStopped,

    // Database
    /// Remote database handle opened
    DatabaseOpened,

    // Query operations
    /// Query compiled in the remote context
    QueryPrepared,
    /// Remote compilation rejected the query
    QueryPrepareFailed,
    /// Query compiled after its handle closed; remote object released
    QueryReleasedAfterClose,
    /// Parameter snapshot replaced
    QueryParametersSet,
    /// Query executed
    QueryExecuted,

    // Listeners and callbacks
    /// Change listener subscribed
    ListenerAdded,
    /// Change listener unsubscribed
    ListenerRemoved,
    /// Adapter registered in the local callback registry
    CallbackRegistered,
    /// Adapter removed from the local callback registry
    CallbackUnregistered,

    // Replicator operations
    /// Remote replicator created
    ReplicatorCreated,
    /// Remote replicator creation failed, registrations rolled back
    ReplicatorCreateFailed,
    /// Replicator start requested
    ReplicatorStarted,
    /// Replicator stop acknowledged
    ReplicatorStopped,
    /// A teardown step failed; teardown continued
    ReplicatorTeardownFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ResourceAttached => "RESOURCE_ATTACHED",
            Event::ResourceClosed => "RESOURCE_CLOSED",
            Event::ResourceCloseFailed => "RESOURCE_CLOSE_FAILED",

            Event::WorkerStarted => "WORKER_STARTED",
            Event::WorkerStopped => "WORKER_STOPPED",

            Event::DatabaseOpened => "DATABASE_OPENED",

            Event::QueryPrepared => "QUERY_PREPARED",
            Event::QueryPrepareFailed => "QUERY_PREPARE_FAILED",
            Event::QueryReleasedAfterClose => "QUERY_RELEASED_AFTER_CLOSE",
            Event::QueryParametersSet => "QUERY_PARAMETERS_SET",
            Event::QueryExecuted => "QUERY_EXECUTED",

            Event::ListenerAdded => "LISTENER_ADDED",
            Event::ListenerRemoved => "LISTENER_REMOVED",
            Event::CallbackRegistered => "CALLBACK_REGISTERED",
            Event::CallbackUnregistered => "CALLBACK_UNREGISTERED",

            Event::ReplicatorCreated => "REPLICATOR_CREATED",
            Event::ReplicatorCreateFailed => "REPLICATOR_CREATE_FAILED",
            Event::ReplicatorStarted => "REPLICATOR_STARTED",
            Event::ReplicatorStopped => "REPLICATOR_STOPPED",
            Event::ReplicatorTeardownFailed => "REPLICATOR_TEARDOWN_FAILED",
        }
    }

    /// Returns true if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::ResourceCloseFailed
                | Event::QueryPrepareFailed
                | Event::ReplicatorCreateFailed
                | Event::ReplicatorTeardownFailed
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_upper_snake() {
        let events = [
            Event::ResourceAttached,
            Event::ResourceClosed,
            Event::QueryPrepared,
            Event::ListenerRemoved,
            Event::ReplicatorCreateFailed,
        ];
        for event in events {
            let name = event.as_str();
            assert!(name.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_failure_classification() {
        assert!(Event::ReplicatorCreateFailed.is_failure());
        assert!(Event::QueryPrepareFailed.is_failure());
        assert!(!Event::QueryPrepared.is_failure());
        assert!(!Event::ResourceClosed.is_failure());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Event::WorkerStarted), "WORKER_STARTED");
    }
}
