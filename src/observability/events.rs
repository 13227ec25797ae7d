//! Observable query events
//!
//! Events are explicit and typed.

use std::fmt;

/// Observable events emitted by the query layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Configuration loaded
    ConfigLoaded,
    /// Where clause installed on a query definition
    WhereClauseInstalled,
    /// Candidate indexes scored
    QueryPrepared,
    /// Access path chosen for one execution
    IndexSelected,
    /// Query executed
    QueryExecuted,
    /// Query rejected with a user error
    QueryRejected,
    /// Engine operation failed
    EngineFailure,
    /// Planner invariant violated
    PlannerInvariant,
    /// Rows deleted by a query
    RowsDeleted,
}

impl Event {
    /// Returns the event name used in log output
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::WhereClauseInstalled => "WHERE_CLAUSE_INSTALLED",
            Event::QueryPrepared => "QUERY_PREPARED",
            Event::IndexSelected => "QUERY_INDEX_SELECTED",
            Event::QueryExecuted => "QUERY_EXECUTED",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::EngineFailure => "ENGINE_FAILURE",
            Event::PlannerInvariant => "PLANNER_INVARIANT",
            Event::RowsDeleted => "ROWS_DELETED",
        }
    }

    /// Returns true if this event reports an invariant violation
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::PlannerInvariant)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
