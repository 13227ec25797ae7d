//! Operation, filter and cursor contracts of the storage engine

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use super::errors::StoreResult;

/// Bound placed on one index column of a scan, read as `column <op> value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundType {
    /// Lower and upper bound at once
    Eq,
    /// Inclusive lower bound
    Ge,
    /// Exclusive lower bound
    Gt,
    /// Inclusive upper bound
    Le,
    /// Exclusive upper bound
    Lt,
}

impl BoundType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoundType::Eq => "=",
            BoundType::Ge => ">=",
            BoundType::Gt => ">",
            BoundType::Le => "<=",
            BoundType::Lt => "<",
        }
    }

    /// True for bounds that limit the low end of the range
    pub fn is_lower(&self) -> bool {
        matches!(self, BoundType::Eq | BoundType::Ge | BoundType::Gt)
    }

    /// True for bounds that limit the high end of the range
    pub fn is_upper(&self) -> bool {
        matches!(self, BoundType::Eq | BoundType::Le | BoundType::Lt)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, BoundType::Gt | BoundType::Lt)
    }
}

impl fmt::Display for BoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical group opened by [`ScanFilter::begin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterGroup {
    And,
    Or,
    /// Negated AND
    Nand,
}

/// Binary comparison evaluated by a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryCondition {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl BinaryCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryCondition::Eq => "=",
            BinaryCondition::Ne => "<>",
            BinaryCondition::Lt => "<",
            BinaryCondition::Le => "<=",
            BinaryCondition::Gt => ">",
            BinaryCondition::Ge => ">=",
            BinaryCondition::Like => "LIKE",
        }
    }
}

/// One instruction of an interpreted filter program
#[derive(Debug, Clone, PartialEq)]
pub enum FilterInstruction {
    Begin(FilterGroup),
    End,
    Compare {
        condition: BinaryCondition,
        column: String,
        value: Value,
    },
    IsNull(String),
    IsNotNull(String),
}

/// Filter program attached to a scan and evaluated per row by the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterpretedCode {
    instructions: Vec<FilterInstruction>,
}

impl InterpretedCode {
    pub fn new(instructions: Vec<FilterInstruction>) -> Self {
        Self { instructions }
    }

    pub fn instructions(&self) -> &[FilterInstruction] {
        &self.instructions
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// How an index scan delivers rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanOptions {
    /// Deliver rows in index order
    pub ordered: bool,
    /// Deliver rows in reverse index order (requires `ordered`)
    pub descending: bool,
    /// Bounds are split into ranges terminated by `end_of_bound`
    pub multi_range: bool,
}

/// Column name to value
pub type Row = BTreeMap<String, Value>;

/// One row delivered by a cursor
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub values: Row,
    /// Range that produced the row, for multi-range scans
    pub range_no: Option<u32>,
}

impl ResultRow {
    pub fn new(values: Row) -> Self {
        Self {
            values,
            range_no: None,
        }
    }

    /// Value of `column`, `Null` if not retrieved
    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&Value::Null)
    }
}

/// Forward-only, single-pass result cursor
pub trait ResultCursor {
    fn next(&mut self) -> StoreResult<Option<ResultRow>>;
}

/// Common part of every engine operation
pub trait Operation {
    /// Adds `column` to the columns retrieved per row
    fn get_value(&mut self, column: &str) -> StoreResult<()>;

    /// Sends the operation to the engine
    fn execute(self: Box<Self>) -> StoreResult<Box<dyn ResultCursor>>;
}

/// Point lookup on a unique index or the primary key
pub trait KeyLookupOperation: Operation {
    fn equal(&mut self, column: &str, value: &Value) -> StoreResult<()>;
}

/// Operations that accept a server-side filter
pub trait ScanOperation: Operation {
    fn set_interpreted_code(&mut self, code: InterpretedCode) -> StoreResult<()>;
}

/// Ordered index scan
pub trait IndexScanOperation: ScanOperation {
    /// Adds a bound on an index column. Lower and upper bounds must each be
    /// set on a prefix of the index columns, in index order.
    fn set_bound(&mut self, column: &str, bound: BoundType, value: &Value) -> StoreResult<()>;

    /// Closes the current range of a multi-range scan
    fn end_of_bound(&mut self, range_no: u32) -> StoreResult<()>;
}

/// Full table scan
pub trait TableScanOperation: ScanOperation {}

/// Builder for server-side filters.
///
/// A filter is an engine resource: it must be released exactly once.
pub trait ScanFilter {
    fn begin(&mut self, group: FilterGroup) -> StoreResult<()>;
    fn end(&mut self) -> StoreResult<()>;
    fn cmp(&mut self, condition: BinaryCondition, column: &str, value: &Value)
        -> StoreResult<()>;
    fn is_null(&mut self, column: &str) -> StoreResult<()>;
    fn is_not_null(&mut self, column: &str) -> StoreResult<()>;

    /// Returns the finished program; fails on unbalanced groups
    fn code(&self) -> StoreResult<InterpretedCode>;

    /// Frees the engine-side handle
    fn release(&mut self);
}
