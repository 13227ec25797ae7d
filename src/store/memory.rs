//! In-memory reference engine
//!
//! Rows live in a `BTreeMap` keyed by primary key, so table scans are
//! deterministic. Index scans evaluate composite prefix bounds the way an
//! ordered index does: a bound over the first `n` index columns compares the
//! row's first `n` key values lexicographically, and the strictness of the
//! last bound column decides inclusivity.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use super::filter::{FilterNode, MemoryFilter};
use super::key::IndexKey;
use super::meta::{IndexMeta, TableMeta};
use super::operation::{
    BoundType, IndexScanOperation, InterpretedCode, KeyLookupOperation, Operation, ResultCursor,
    ResultRow, Row, ScanFilter, ScanOperation, ScanOptions, TableScanOperation,
};
use super::Store;

type PrimaryKey = Vec<IndexKey>;

struct MemoryTable {
    meta: Arc<TableMeta>,
    rows: BTreeMap<PrimaryKey, Row>,
}

impl MemoryTable {
    fn key_of(&self, row: &Row, columns: &[String]) -> PrimaryKey {
        columns
            .iter()
            .map(|name| {
                let value = row.get(name).unwrap_or(&Value::Null);
                self.meta
                    .column(name)
                    .and_then(|c| IndexKey::for_column(c.column_type, value))
                    .unwrap_or(IndexKey::Null)
            })
            .collect()
    }
}

#[derive(Default)]
struct Inner {
    tables: RwLock<BTreeMap<String, MemoryTable>>,
    filters_created: AtomicU64,
    filters_released: Arc<AtomicU64>,
}

/// Cheaply clonable handle to an in-memory database
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, MemoryTable>> {
        self.inner
            .tables
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, MemoryTable>> {
        self.inner
            .tables
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create_table(&self, meta: TableMeta) -> StoreResult<()> {
        let mut tables = self.write();
        if tables.contains_key(&meta.name) {
            return Err(StoreError::TableExists(meta.name));
        }
        tables.insert(
            meta.name.clone(),
            MemoryTable {
                meta: Arc::new(meta),
                rows: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Inserts one row given as a JSON object.
    ///
    /// Missing nullable columns are stored as null.
    pub fn insert(&self, table: &str, row: Value) -> StoreResult<()> {
        let mut tables = self.write();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        let object = match row {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::InvalidValue {
                    column: "*".into(),
                    reason: format!("row must be an object, got {}", other),
                })
            }
        };

        let mut values = Row::new();
        for (name, value) in object {
            let column = t.meta.require_column(&name)?;
            if !column.column_type.accepts(&value) {
                return Err(StoreError::InvalidValue {
                    column: name,
                    reason: format!("expected {}", column.column_type.as_str()),
                });
            }
            values.insert(name, value);
        }
        for column in &t.meta.columns {
            let value = values.entry(column.name.clone()).or_insert(Value::Null);
            if value.is_null() && !column.nullable {
                return Err(StoreError::InvalidValue {
                    column: column.name.clone(),
                    reason: "column is not nullable".into(),
                });
            }
        }

        let pk = t.key_of(&values, &t.meta.primary_key);
        if t.rows.contains_key(&pk) {
            return Err(StoreError::DuplicateKey(super::meta::PRIMARY_INDEX.to_string()));
        }
        for index in t.meta.indexes.iter().filter(|i| i.is_unique()) {
            let key = t.key_of(&values, &index.columns);
            if key.iter().any(IndexKey::is_null) {
                continue;
            }
            if t.rows.values().any(|r| t.key_of(r, &index.columns) == key) {
                return Err(StoreError::DuplicateKey(index.name.clone()));
            }
        }

        t.rows.insert(pk, values);
        Ok(())
    }

    pub fn row_count(&self, table: &str) -> StoreResult<usize> {
        self.read()
            .get(table)
            .map(|t| t.rows.len())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }

    /// Filters handed out by `create_filter`
    pub fn filters_created(&self) -> u64 {
        self.inner.filters_created.load(AtomicOrdering::Relaxed)
    }

    /// Filters released by their holders
    pub fn filters_released(&self) -> u64 {
        self.inner.filters_released.load(AtomicOrdering::Relaxed)
    }

    fn meta(&self, table: &str) -> StoreResult<Arc<TableMeta>> {
        self.read()
            .get(table)
            .map(|t| t.meta.clone())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }

    /// Runs `f` over a snapshot of the table's rows, in primary key order.
    fn with_rows<T>(
        &self,
        table: &str,
        f: impl FnOnce(&MemoryTable) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let tables = self.read();
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        f(t)
    }
}

impl Store for MemoryStore {
    fn table(&self, name: &str) -> StoreResult<Arc<TableMeta>> {
        self.meta(name)
    }

    fn key_lookup(&self, table: &str, index: &str) -> StoreResult<Box<dyn KeyLookupOperation>> {
        let meta = self.meta(table)?;
        let index = meta.require_index(index)?.clone();
        if !index.is_unique() {
            return Err(StoreError::InvalidBound(format!(
                "index '{}' does not support key lookups",
                index.name
            )));
        }
        Ok(Box::new(MemoryKeyLookup {
            store: self.clone(),
            projection: Projection::new(meta),
            index,
            keys: BTreeMap::new(),
        }))
    }

    fn index_scan(
        &self,
        table: &str,
        index: &str,
        options: ScanOptions,
    ) -> StoreResult<Box<dyn IndexScanOperation>> {
        let meta = self.meta(table)?;
        let index = meta.require_index(index)?.clone();
        if index.is_unique() {
            return Err(StoreError::InvalidBound(format!(
                "index '{}' is not an ordered index",
                index.name
            )));
        }
        Ok(Box::new(MemoryIndexScan {
            store: self.clone(),
            projection: Projection::new(meta),
            index,
            options,
            ranges: Vec::new(),
            current: ScanRange::default(),
            code: None,
        }))
    }

    fn table_scan(&self, table: &str) -> StoreResult<Box<dyn TableScanOperation>> {
        let meta = self.meta(table)?;
        Ok(Box::new(MemoryTableScan {
            store: self.clone(),
            projection: Projection::new(meta),
            code: None,
        }))
    }

    fn create_filter(&self, table: &str) -> StoreResult<Box<dyn ScanFilter>> {
        let meta = self.meta(table)?;
        self.inner
            .filters_created
            .fetch_add(1, AtomicOrdering::Relaxed);
        Ok(Box::new(MemoryFilter::new(
            meta,
            self.inner.filters_released.clone(),
        )))
    }

    fn delete(&self, table: &str, key: &[Value]) -> StoreResult<bool> {
        let mut tables = self.write();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        if key.len() != t.meta.primary_key.len() {
            return Err(StoreError::MissingKey(t.meta.primary_key.join(",")));
        }
        let mut row = Row::new();
        for (column, value) in t.meta.primary_key.iter().zip(key) {
            row.insert(column.clone(), value.clone());
        }
        let pk = t.key_of(&row, &t.meta.primary_key);
        Ok(t.rows.remove(&pk).is_some())
    }
}

/// Columns retrieved by an operation; all columns when none were requested
struct Projection {
    meta: Arc<TableMeta>,
    columns: Vec<String>,
}

impl Projection {
    fn new(meta: Arc<TableMeta>) -> Self {
        Self {
            meta,
            columns: Vec::new(),
        }
    }

    fn add(&mut self, column: &str) -> StoreResult<()> {
        self.meta.require_column(column)?;
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
        Ok(())
    }

    fn apply(&self, row: &Row) -> Row {
        if self.columns.is_empty() {
            return row.clone();
        }
        self.columns
            .iter()
            .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
            .collect()
    }
}

fn compile_filter(code: &Option<InterpretedCode>) -> StoreResult<Option<FilterNode>> {
    match code {
        Some(code) => FilterNode::compile(code),
        None => Ok(None),
    }
}

struct MemoryKeyLookup {
    store: MemoryStore,
    projection: Projection,
    index: IndexMeta,
    keys: BTreeMap<String, Value>,
}

impl Operation for MemoryKeyLookup {
    fn get_value(&mut self, column: &str) -> StoreResult<()> {
        self.projection.add(column)
    }

    fn execute(self: Box<Self>) -> StoreResult<Box<dyn ResultCursor>> {
        for column in &self.index.columns {
            if !self.keys.contains_key(column) {
                return Err(StoreError::MissingKey(column.clone()));
            }
        }
        let table_name = self.projection.meta.name.clone();
        let rows = self.store.with_rows(&table_name, |t| {
            let lookup_row: Row = self
                .keys
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let wanted = t.key_of(&lookup_row, &self.index.columns);
            // A null key component never matches.
            if wanted.iter().any(IndexKey::is_null) {
                return Ok(Vec::new());
            }
            Ok(t.rows
                .values()
                .find(|row| t.key_of(row, &self.index.columns) == wanted)
                .map(|row| ResultRow::new(self.projection.apply(row)))
                .into_iter()
                .collect())
        })?;
        Ok(Box::new(VecCursor::new(rows)))
    }
}

impl KeyLookupOperation for MemoryKeyLookup {
    fn equal(&mut self, column: &str, value: &Value) -> StoreResult<()> {
        if self.index.position(column).is_none() {
            return Err(StoreError::InvalidBound(format!(
                "column '{}' is not part of index '{}'",
                column, self.index.name
            )));
        }
        self.keys.insert(column.to_string(), value.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct ScanRange {
    lower: Vec<IndexKey>,
    lower_strict: bool,
    upper: Vec<IndexKey>,
    upper_strict: bool,
    range_no: Option<u32>,
}

impl ScanRange {
    fn is_empty(&self) -> bool {
        self.lower.is_empty() && self.upper.is_empty()
    }

    fn contains(&self, key: &[IndexKey]) -> bool {
        use std::cmp::Ordering;

        if !self.lower.is_empty() {
            let prefix = &key[..self.lower.len()];
            match prefix.cmp(&self.lower[..]) {
                Ordering::Less => return false,
                Ordering::Equal if self.lower_strict => return false,
                _ => {}
            }
        }
        if !self.upper.is_empty() {
            let prefix = &key[..self.upper.len()];
            match prefix.cmp(&self.upper[..]) {
                Ordering::Greater => return false,
                Ordering::Equal if self.upper_strict => return false,
                _ => {}
            }
        }
        true
    }
}

struct MemoryIndexScan {
    store: MemoryStore,
    projection: Projection,
    index: IndexMeta,
    options: ScanOptions,
    ranges: Vec<ScanRange>,
    current: ScanRange,
    code: Option<InterpretedCode>,
}

impl Operation for MemoryIndexScan {
    fn get_value(&mut self, column: &str) -> StoreResult<()> {
        self.projection.add(column)
    }

    fn execute(mut self: Box<Self>) -> StoreResult<Box<dyn ResultCursor>> {
        if !self.current.is_empty() || self.ranges.is_empty() {
            let current = std::mem::take(&mut self.current);
            self.ranges.push(current);
        }
        let filter = compile_filter(&self.code)?;
        let table_name = self.projection.meta.name.clone();

        let mut matched = self.store.with_rows(&table_name, |t| {
            let mut matched = Vec::new();
            for (pk, row) in &t.rows {
                let key = t.key_of(row, &self.index.columns);
                let Some(range) = self.ranges.iter().find(|r| r.contains(&key)) else {
                    continue;
                };
                if let Some(filter) = &filter {
                    if !filter.matches(row) {
                        continue;
                    }
                }
                let mut result = ResultRow::new(self.projection.apply(row));
                result.range_no = range.range_no;
                matched.push((key, pk.clone(), result));
            }
            Ok(matched)
        })?;

        matched.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        if self.options.descending {
            matched.reverse();
        }
        Ok(Box::new(VecCursor::new(
            matched.into_iter().map(|(_, _, row)| row).collect(),
        )))
    }
}

impl ScanOperation for MemoryIndexScan {
    fn set_interpreted_code(&mut self, code: InterpretedCode) -> StoreResult<()> {
        self.code = Some(code);
        Ok(())
    }
}

impl IndexScanOperation for MemoryIndexScan {
    fn set_bound(&mut self, column: &str, bound: BoundType, value: &Value) -> StoreResult<()> {
        let position = self.index.position(column).ok_or_else(|| {
            StoreError::InvalidBound(format!(
                "column '{}' is not part of index '{}'",
                column, self.index.name
            ))
        })?;
        let column_type = self.projection.meta.require_column(column)?.column_type;
        let key = IndexKey::for_column(column_type, value).ok_or_else(|| {
            StoreError::InvalidValue {
                column: column.to_string(),
                reason: format!("expected {}", column_type.as_str()),
            }
        })?;

        if bound.is_lower() {
            if position != self.current.lower.len() {
                return Err(StoreError::InvalidBound(format!(
                    "lower bound on '{}' skips a preceding index column",
                    column
                )));
            }
            self.current.lower.push(key.clone());
            self.current.lower_strict = bound.is_strict();
        }
        if bound.is_upper() {
            if position != self.current.upper.len() {
                return Err(StoreError::InvalidBound(format!(
                    "upper bound on '{}' skips a preceding index column",
                    column
                )));
            }
            self.current.upper.push(key);
            self.current.upper_strict = bound.is_strict();
        }
        Ok(())
    }

    fn end_of_bound(&mut self, range_no: u32) -> StoreResult<()> {
        if !self.options.multi_range {
            return Err(StoreError::InvalidBound(
                "end_of_bound on a single-range scan".into(),
            ));
        }
        let mut range = std::mem::take(&mut self.current);
        range.range_no = Some(range_no);
        self.ranges.push(range);
        Ok(())
    }
}

struct MemoryTableScan {
    store: MemoryStore,
    projection: Projection,
    code: Option<InterpretedCode>,
}

impl Operation for MemoryTableScan {
    fn get_value(&mut self, column: &str) -> StoreResult<()> {
        self.projection.add(column)
    }

    fn execute(self: Box<Self>) -> StoreResult<Box<dyn ResultCursor>> {
        let filter = compile_filter(&self.code)?;
        let table_name = self.projection.meta.name.clone();
        let rows = self.store.with_rows(&table_name, |t| {
            Ok(t.rows
                .values()
                .filter(|row| filter.as_ref().map_or(true, |f| f.matches(row)))
                .map(|row| ResultRow::new(self.projection.apply(row)))
                .collect())
        })?;
        Ok(Box::new(VecCursor::new(rows)))
    }
}

impl ScanOperation for MemoryTableScan {
    fn set_interpreted_code(&mut self, code: InterpretedCode) -> StoreResult<()> {
        self.code = Some(code);
        Ok(())
    }
}

impl TableScanOperation for MemoryTableScan {}

/// Cursor over rows materialized at execute time
pub struct VecCursor {
    rows: VecDeque<ResultRow>,
}

impl VecCursor {
    pub fn new(rows: Vec<ResultRow>) -> Self {
        Self { rows: rows.into() }
    }
}

impl ResultCursor for VecCursor {
    fn next(&mut self) -> StoreResult<Option<ResultRow>> {
        Ok(self.rows.pop_front())
    }
}
