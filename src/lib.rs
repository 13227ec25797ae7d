//! clusterq - access-path planning for parameterized queries
//!
//! Maps a where clause over a table to a primary-key lookup, a unique-key
//! lookup, an ordered-index range scan or a full table scan, and drives the
//! storage engine accordingly.

pub mod config;
pub mod observability;
pub mod planner;
pub mod query;
pub mod store;

pub use config::QueryConfig;
pub use query::{Query, QueryDefinition, QueryError, QueryResult, Session};
