//! Access-path planner
//!
//! Turns a where clause and the indexes of a table into the access path of
//! one execution.
//!
//! # Flow
//!
//! 1. `CandidateSet::build` scores every index against the top-level terms
//!    (once per where clause)
//! 2. `select` picks the index for the bound values and requested ordering
//! 3. `bounds` emits key values or scan bounds, and the residual filter
//!
//! # Selection priority
//!
//! 1. Fully covered unique index (primary key first)
//! 2. Ordered index with the highest score whose leading column can bound
//! 3. Ordered index that only delivers the requested order
//! 4. Table scan

mod bounds;
mod candidate;
mod explain;
mod selector;

pub use bounds::{
    build_residual_filter, plan_scan_bounds, set_key_values, BoundCall, BoundMask, FilterGuard,
    ScanBounds,
};
pub use candidate::{
    CandidateColumn, CandidateIndex, CandidateKind, CandidateSet, RangeTerm, ScanType, TermRef,
    NO_INDEX, UNIQUE_SCORE,
};
pub use explain::{ExplainPlan, INDEX_USED_KEY, SCAN_TYPE_KEY};
pub use selector::{select, supports_ordering, unique_is_usable, usability, Usability};
