//! Query layer
//!
//! Predicate trees over a domain type, parameter binding, and execution
//! through the access path the planner selects.
//!
//! # Usage
//!
//! 1. `Session::create_definition` for a table
//! 2. Build the where clause from `get(field)` properties and `param(name)`
//! 3. Share the definition behind `Arc`; `Session::create_query` per caller
//! 4. Bind, then `get_result_data`, `explain` or `delete_persistent_all`

mod binding;
mod definition;
mod domain;
mod errors;
mod execution;
mod predicate;
mod result;
mod session;
mod sorter;

pub use binding::BindingContext;
pub use definition::QueryDefinition;
pub use domain::{DomainType, Field};
pub use errors::{ErrorKind, QueryError, QueryErrorCode, QueryResult};
pub use execution::Query;
pub use predicate::{Comparison, DefinitionId, Parameter, ParameterShape, Predicate, Property};
pub use result::ResultData;
pub use session::Session;
pub use sorter::{ResultSorter, SortDirection, SortSpec};

pub(crate) use predicate::list_is_usable;
