//! Observability subsystem for relaydb
//!
//! Provides:
//! - Typed lifecycle events
//! - Structured logging (JSON lines emitted through `tracing`)
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on the proxied operation
//! 3. Logging never fails the caller
//!
//! # Usage
//!
//! ```ignore
//! use relaydb::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::QueryPrepared, &[("query_id", "7")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
///
/// Failure events go out at WARN, everything else at INFO.
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_failure() {
        Severity::Warn
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::WorkerStarted);
        log_event(Event::WorkerStopped);
    }

    #[test]
    fn test_log_event_with_fields() {
        log_event_with_fields(Event::ReplicatorCreateFailed, &[("reason", "bad target")]);
    }
}
