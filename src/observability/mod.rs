//! Observability for the query layer
//!
//! - Structured JSON logging with a process-wide severity threshold
//! - Typed events
//! - Atomic counters per access path and for filter handles
//!
//! Observability is read-only: nothing here changes planning or execution.

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, QueryMetrics};

/// Log a query event with fields.
///
/// The severity follows the event: invariant violations are FATAL,
/// rejections WARN, engine failures ERROR, planner decisions TRACE.
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let severity = match event {
        Event::PlannerInvariant => Severity::Fatal,
        Event::EngineFailure => Severity::Error,
        Event::QueryRejected => Severity::Warn,
        Event::IndexSelected | Event::QueryPrepared | Event::QueryExecuted => Severity::Trace,
        Event::ConfigLoaded | Event::WhereClauseInstalled | Event::RowsDeleted => Severity::Info,
    };
    Logger::log(severity, event.as_str(), fields);
}
