//! Bound-Setting Tests
//!
//! Tests for the calls the engine receives:
//! - Key values of point lookups
//! - Equality prefixes and range bounds of index scans
//! - One range per IN value, each closed with its ordinal
//! - Strict comparisons only on the last contributing column
//! - Errors raised before any engine call

mod common;

use std::sync::Arc;

use clusterq::planner::ScanType;
use clusterq::query::{Predicate, QueryDefinition, QueryErrorCode, Session};
use common::{abc_store, ids, person_store, RecordingStore};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn recording_person() -> (RecordingStore, Session) {
    let store = RecordingStore::new(person_store());
    (store.clone(), common::session(store))
}

fn recording_abc() -> (RecordingStore, Session) {
    let store = RecordingStore::new(abc_store());
    (store.clone(), common::session(store))
}

fn install(
    session: &Session,
    table: &str,
    build: impl FnOnce(&QueryDefinition) -> Predicate,
) -> Arc<QueryDefinition> {
    let mut def = session.create_definition(table).unwrap();
    let pred = build(&def);
    def.where_clause(pred).unwrap();
    Arc::new(def)
}

// =============================================================================
// Key Lookups
// =============================================================================

/// Primary key equality sets the key and nothing else.
#[test]
fn test_primary_key_values() {
    let (store, session) = recording_person();
    let def = install(&session, "person", |d| {
        d.get("id").unwrap().equal(&d.param("id"))
    });

    let mut query = session.create_query(&def);
    query.bind("id", json!(4)).unwrap();
    let data = query.get_result_data().unwrap();
    assert_eq!(data.scan_type(), ScanType::PrimaryKey);
    assert_eq!(ids(&data.collect_rows().unwrap()), vec![4]);

    assert_eq!(store.bounds(), vec!["key id = 4"]);
    assert!(!store.calls().contains(&"create_filter".to_string()));
}

// =============================================================================
// Index Scans
// =============================================================================

/// age >= :a AND name = :n on (age, name): the equality after an open upper
/// side is split into a lower bound and kept in the filter.
#[test]
fn test_round_trip_bounds() {
    let (store, session) = recording_person();
    let def = install(&session, "person", |d| {
        d.get("age")
            .unwrap()
            .greater_equal(&d.param("a"))
            .and(d.get("name").unwrap().equal(&d.param("n")))
            .unwrap()
    });

    let mut query = session.create_query(&def);
    query.bind("a", json!(30)).unwrap();
    query.bind("n", json!("X")).unwrap();

    let index = query.get_best_candidate_index().unwrap();
    assert_eq!(index.name(), "idx_age_name");
    assert_eq!(index.score(), 2);
    assert_eq!(index.scan_type(), ScanType::IndexScan);

    let rows = query.get_result_data().unwrap().collect_rows().unwrap();
    assert_eq!(ids(&rows), vec![4, 6, 3]);
    assert_eq!(
        store.bounds(),
        vec!["bound age >= 30", "bound name >= \"X\""]
    );
    assert!(store.calls().contains(&"create_filter".to_string()));
}

/// Equality on the first K of N columns sets exactly K equality bounds.
#[test]
fn test_equality_prefix_idempotence() {
    let columns = ["a", "b", "c"];
    for k in 1..=columns.len() {
        let (store, session) = recording_abc();
        let def = install(&session, "t", |d| {
            let mut pred = d.get(columns[0]).unwrap().equal(&d.param(columns[0]));
            for column in &columns[1..k] {
                pred = pred
                    .and(d.get(column).unwrap().equal(&d.param(column)))
                    .unwrap();
            }
            pred
        });

        let mut query = session.create_query(&def);
        for column in &columns[..k] {
            query.bind(column, json!(2)).unwrap();
        }
        let rows = query.get_result_data().unwrap().collect_rows().unwrap();
        assert_eq!(rows.len(), 3usize.pow((columns.len() - k) as u32));

        let bounds = store.bounds();
        assert_eq!(bounds.len(), k, "k = {}", k);
        assert!(bounds.iter().all(|b| b.contains(" = ")));
        assert!(!store.calls().contains(&"create_filter".to_string()));
    }
}

/// a > :x AND b > :y: only b, the last lower contributor, stays strict.
#[test]
fn test_strictness_demotion() {
    let (store, session) = recording_abc();
    let def = install(&session, "t", |d| {
        d.get("a")
            .unwrap()
            .greater_than(&d.param("x"))
            .and(d.get("b").unwrap().greater_than(&d.param("y")))
            .unwrap()
    });

    let mut query = session.create_query(&def);
    query.bind("x", json!(2)).unwrap();
    query.bind("y", json!(2)).unwrap();
    let rows = query.get_result_data().unwrap().collect_rows().unwrap();

    assert_eq!(store.bounds(), vec!["bound a >= 2", "bound b > 2"]);
    // a = 3 and b = 3, any c
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.get("a") == &json!(3) && r.get("b") == &json!(3)));
}

/// A null parameter sets no bound on its column.
#[test]
fn test_null_parameter_sets_no_bound() {
    let (store, session) = recording_person();
    let def = install(&session, "person", |d| {
        d.get("age")
            .unwrap()
            .equal(&d.param("a"))
            .and(d.get("name").unwrap().greater_equal(&d.param("n")))
            .unwrap()
    });

    let mut query = session.create_query(&def);
    query.bind("a", json!(30)).unwrap();
    query.bind("n", Value::Null).unwrap();
    let rows = query.get_result_data().unwrap().collect_rows().unwrap();

    assert_eq!(store.bounds(), vec!["bound age = 30"]);
    // name >= null is false for every row
    assert!(rows.is_empty());
}

// =============================================================================
// Multi-Range Scans
// =============================================================================

/// M IN values on the leading column give M ranges closed by 0..M.
#[test]
fn test_in_expansion_cardinality() {
    for m in 1..=3i64 {
        let (store, session) = recording_abc();
        let def = install(&session, "t", |d| {
            d.get("a")
                .unwrap()
                .in_values(&d.param("as"))
                .and(d.get("b").unwrap().equal(&d.param("b")))
                .unwrap()
        });

        let values: Vec<i64> = (1..=m).collect();
        let mut query = session.create_query(&def);
        query.bind("as", json!(values)).unwrap();
        query.bind("b", json!(1)).unwrap();
        let rows = query.get_result_data().unwrap().collect_rows().unwrap();
        assert_eq!(rows.len() as i64, 3 * m);

        let mut expected = Vec::new();
        for (i, value) in values.iter().enumerate() {
            expected.push(format!("bound a = {}", value));
            expected.push("bound b = 1".to_string());
            expected.push(format!("end {}", i));
        }
        assert_eq!(store.bounds(), expected);
        assert!(rows.iter().all(|r| r.range_no.is_some()));
    }
}

/// A single-column IN index expands every value in one pass.
#[test]
fn test_in_on_single_column_index() {
    let store = clusterq::store::MemoryStore::new();
    store
        .create_table(
            clusterq::store::TableMeta::builder("tag")
                .column("id", clusterq::store::ColumnType::Int)
                .column("label", clusterq::store::ColumnType::String)
                .primary_key(&["id"])
                .ordered_index("idx_label", &["label"])
                .build()
                .unwrap(),
        )
        .unwrap();
    for (id, label) in [(1, "red"), (2, "green"), (3, "blue"), (4, "red")] {
        store
            .insert("tag", json!({"id": id, "label": label}))
            .unwrap();
    }
    let recording = RecordingStore::new(store);
    let session = common::session(recording.clone());
    let def = install(&session, "tag", |d| {
        d.get("label").unwrap().in_values(&d.param("labels"))
    });

    let mut query = session.create_query(&def);
    query.bind("labels", json!(["red", "blue"])).unwrap();
    let rows = query.get_result_data().unwrap().collect_rows().unwrap();

    assert_eq!(
        recording.bounds(),
        vec![
            "bound label = \"red\"",
            "end 0",
            "bound label = \"blue\"",
            "end 1"
        ]
    );
    let mut found = ids(&rows);
    found.sort();
    assert_eq!(found, vec![1, 3, 4]);
    assert!(!recording.calls().contains(&"create_filter".to_string()));
}

/// Two IN terms on one index fail before the engine sees anything.
#[test]
fn test_too_many_in_predicates() {
    let (store, session) = recording_person();
    let def = install(&session, "person", |d| {
        d.get("age")
            .unwrap()
            .in_values(&d.param("ages"))
            .and(d.get("name").unwrap().in_values(&d.param("names")))
            .unwrap()
    });

    let mut query = session.create_query(&def);
    query.bind("ages", json!([30, 40])).unwrap();
    query.bind("names", json!(["X"])).unwrap();

    let err = query.get_result_data().err().unwrap();
    assert_eq!(err.code(), QueryErrorCode::CqTooManyInPredicates);
    assert!(err.message().contains("idx_age_name"));
    assert!(store.calls().is_empty());
}
