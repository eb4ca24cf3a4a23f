//! Observability subsystem
//!
//! Provides:
//! - Structured logging (JSON)
//! - Counters for planning and iteration
//! - Typed query lifecycle events
//!
//! Observability is read-only: nothing here changes query results.
//!
//! # Usage
//!
//! ```ignore
//! use dsquery::observability::{log_event_with_fields, Event, QueryMetrics};
//!
//! log_event_with_fields(Event::QueryPlanned, &[("branches", "3")]);
//! QueryMetrics::global().increment_queries_planned();
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, QueryMetrics};

/// Log a lifecycle event at its own severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
