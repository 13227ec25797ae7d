//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use clusterq::config::QueryConfig;
use clusterq::query::Session;
use clusterq::store::{
    BinaryCondition, BoundType, ColumnType, FilterGroup, IndexScanOperation, InterpretedCode,
    KeyLookupOperation, MemoryStore, Operation, ResultCursor, ScanFilter, ScanOperation,
    ScanOptions, Store, StoreError, StoreResult, TableMeta, TableScanOperation,
};
use serde_json::{json, Value};

// =============================================================================
// Tables
// =============================================================================

/// person(id PRIMARY, age, name) with an ordered index on (age, name)
pub fn person_table() -> TableMeta {
    TableMeta::builder("person")
        .column("id", ColumnType::Int)
        .nullable_column("age", ColumnType::Int)
        .nullable_column("name", ColumnType::String)
        .primary_key(&["id"])
        .ordered_index("idx_age_name", &["age", "name"])
        .build()
        .unwrap()
}

/// t(id PRIMARY, a, b, c) with an ordered index on (a, b, c)
pub fn abc_table() -> TableMeta {
    TableMeta::builder("t")
        .column("id", ColumnType::Int)
        .nullable_column("a", ColumnType::Int)
        .nullable_column("b", ColumnType::Int)
        .nullable_column("c", ColumnType::Int)
        .primary_key(&["id"])
        .ordered_index("idx_abc", &["a", "b", "c"])
        .build()
        .unwrap()
}

pub fn person_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.create_table(person_table()).unwrap();
    let rows = [
        (1, json!(30), json!("Ann")),
        (2, json!(25), json!("Bob")),
        (3, json!(40), json!("X")),
        (4, json!(30), json!("X")),
        (5, Value::Null, json!("Eve")),
        (6, json!(35), json!("X")),
    ];
    for (id, age, name) in rows {
        store
            .insert("person", json!({"id": id, "age": age, "name": name}))
            .unwrap();
    }
    store
}

pub fn abc_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.create_table(abc_table()).unwrap();
    let mut id = 0;
    for a in 1..=3 {
        for b in 1..=3 {
            for c in 1..=3 {
                id += 1;
                store
                    .insert("t", json!({"id": id, "a": a, "b": b, "c": c}))
                    .unwrap();
            }
        }
    }
    store
}

pub fn session(store: impl Store + 'static) -> Session {
    Session::new(Arc::new(store), QueryConfig::default())
}

pub fn ids(rows: &[clusterq::store::ResultRow]) -> Vec<i64> {
    rows.iter().map(|r| r.get("id").as_i64().unwrap()).collect()
}

// =============================================================================
// Recording store
// =============================================================================

/// Delegates to a memory store and records every engine call.
///
/// With `fail_filters` set, every filter condition fails.
#[derive(Clone, Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub fail_filters: bool,
}

impl RecordingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            calls: Arc::default(),
            fail_filters: false,
        }
    }

    pub fn failing_filters(inner: MemoryStore) -> Self {
        Self {
            fail_filters: true,
            ..Self::new(inner)
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded bound and key calls only
    pub fn bounds(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("bound ") || c.starts_with("key ") || c.starts_with("end "))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Store for RecordingStore {
    fn table(&self, name: &str) -> StoreResult<Arc<TableMeta>> {
        self.inner.table(name)
    }

    fn key_lookup(&self, table: &str, index: &str) -> StoreResult<Box<dyn KeyLookupOperation>> {
        self.record(format!("key_lookup {}", index));
        Ok(Box::new(RecordingLookup {
            inner: self.inner.key_lookup(table, index)?,
            calls: self.calls.clone(),
        }))
    }

    fn index_scan(
        &self,
        table: &str,
        index: &str,
        options: ScanOptions,
    ) -> StoreResult<Box<dyn IndexScanOperation>> {
        self.record(format!("index_scan {}", index));
        Ok(Box::new(RecordingScan {
            inner: self.inner.index_scan(table, index, options)?,
            calls: self.calls.clone(),
        }))
    }

    fn table_scan(&self, table: &str) -> StoreResult<Box<dyn TableScanOperation>> {
        self.record("table_scan".to_string());
        self.inner.table_scan(table)
    }

    fn create_filter(&self, table: &str) -> StoreResult<Box<dyn ScanFilter>> {
        self.record("create_filter".to_string());
        let inner = self.inner.create_filter(table)?;
        if self.fail_filters {
            Ok(Box::new(FailingFilter { inner }))
        } else {
            Ok(inner)
        }
    }

    fn delete(&self, table: &str, key: &[Value]) -> StoreResult<bool> {
        self.inner.delete(table, key)
    }
}

struct RecordingLookup {
    inner: Box<dyn KeyLookupOperation>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Operation for RecordingLookup {
    fn get_value(&mut self, column: &str) -> StoreResult<()> {
        self.inner.get_value(column)
    }

    fn execute(self: Box<Self>) -> StoreResult<Box<dyn ResultCursor>> {
        self.inner.execute()
    }
}

impl KeyLookupOperation for RecordingLookup {
    fn equal(&mut self, column: &str, value: &Value) -> StoreResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("key {} = {}", column, value));
        self.inner.equal(column, value)
    }
}

struct RecordingScan {
    inner: Box<dyn IndexScanOperation>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Operation for RecordingScan {
    fn get_value(&mut self, column: &str) -> StoreResult<()> {
        self.inner.get_value(column)
    }

    fn execute(self: Box<Self>) -> StoreResult<Box<dyn ResultCursor>> {
        self.inner.execute()
    }
}

impl ScanOperation for RecordingScan {
    fn set_interpreted_code(&mut self, code: InterpretedCode) -> StoreResult<()> {
        self.inner.set_interpreted_code(code)
    }
}

impl IndexScanOperation for RecordingScan {
    fn set_bound(&mut self, column: &str, bound: BoundType, value: &Value) -> StoreResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("bound {} {} {}", column, bound, value));
        self.inner.set_bound(column, bound, value)
    }

    fn end_of_bound(&mut self, range_no: u32) -> StoreResult<()> {
        self.calls.lock().unwrap().push(format!("end {}", range_no));
        self.inner.end_of_bound(range_no)
    }
}

struct FailingFilter {
    inner: Box<dyn ScanFilter>,
}

impl ScanFilter for FailingFilter {
    fn begin(&mut self, group: FilterGroup) -> StoreResult<()> {
        self.inner.begin(group)
    }

    fn end(&mut self) -> StoreResult<()> {
        self.inner.end()
    }

    fn cmp(&mut self, _: BinaryCondition, column: &str, _: &Value) -> StoreResult<()> {
        Err(StoreError::Filter(format!("condition on '{}' refused", column)))
    }

    fn is_null(&mut self, column: &str) -> StoreResult<()> {
        Err(StoreError::Filter(format!("condition on '{}' refused", column)))
    }

    fn is_not_null(&mut self, column: &str) -> StoreResult<()> {
        Err(StoreError::Filter(format!("condition on '{}' refused", column)))
    }

    fn code(&self) -> StoreResult<InterpretedCode> {
        self.inner.code()
    }

    fn release(&mut self) {
        self.inner.release()
    }
}
