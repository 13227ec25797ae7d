//! Storage access
//!
//! The query layer reaches the storage engine only through the traits in this
//! module: table metadata, key lookups, index scans with per-column bounds,
//! table scans, server-side filters and forward-only cursors.
//!
//! `MemoryStore` is a complete in-memory implementation used by tests and by
//! embedders that want the planner without a cluster.

mod errors;
mod filter;
mod key;
mod memory;
mod meta;
mod operation;

use std::sync::Arc;

use serde_json::Value;

pub use errors::{StoreError, StoreResult};
pub use filter::{FilterNode, MemoryFilter};
pub use key::{compare_values, IndexKey};
pub use memory::{MemoryStore, VecCursor};
pub use meta::{ColumnMeta, ColumnType, IndexKind, IndexMeta, TableBuilder, TableMeta, PRIMARY_INDEX};
pub use operation::{
    BinaryCondition, BoundType, FilterGroup, FilterInstruction, IndexScanOperation,
    InterpretedCode, KeyLookupOperation, Operation, ResultCursor, ResultRow, Row, ScanFilter,
    ScanOperation, ScanOptions, TableScanOperation,
};

/// Entry point to a storage engine
pub trait Store: Send + Sync {
    /// Table metadata by name
    fn table(&self, name: &str) -> StoreResult<Arc<TableMeta>>;

    /// Point lookup through a unique index (or the primary key)
    fn key_lookup(&self, table: &str, index: &str) -> StoreResult<Box<dyn KeyLookupOperation>>;

    /// Range scan through an ordered index
    fn index_scan(
        &self,
        table: &str,
        index: &str,
        options: ScanOptions,
    ) -> StoreResult<Box<dyn IndexScanOperation>>;

    /// Full table scan
    fn table_scan(&self, table: &str) -> StoreResult<Box<dyn TableScanOperation>>;

    /// New server-side filter; the caller must release it
    fn create_filter(&self, table: &str) -> StoreResult<Box<dyn ScanFilter>>;

    /// Deletes the row with the given primary key values, in key column order
    fn delete(&self, table: &str, key: &[Value]) -> StoreResult<bool>;
}
