//! In-memory result sorting
//!
//! Used when ordering was requested but the access path does not deliver
//! rows in index order (table scans and key lookups).

use std::cmp::Ordering;

use serde_json::Value;

use crate::store::ResultRow;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Requested ordering: fields and the columns behind them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub direction: SortDirection,
    pub fields: Vec<String>,
    /// Physical columns in comparison order
    pub columns: Vec<String>,
}

impl SortSpec {
    pub fn describe(&self) -> String {
        format!("{} {}", self.fields.join(", "), self.direction.as_str())
    }
}

/// Sorts result rows
pub struct ResultSorter;

impl ResultSorter {
    /// Sorts rows by the sort columns. Stable.
    pub fn sort(rows: &mut [ResultRow], spec: &SortSpec) {
        rows.sort_by(|a, b| {
            let ordering = spec
                .columns
                .iter()
                .map(|c| Self::compare_values(a.values.get(c), b.values.get(c)))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal);

            match spec.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }

    /// Compares two column values.
    ///
    /// Ordering rules:
    /// - missing < null < bool < number < string
    /// - For same types, natural ordering
    fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a_val), Some(b_val)) => {
                let type_order = |v: &Value| -> u8 {
                    match v {
                        Value::Null => 0,
                        Value::Bool(_) => 1,
                        Value::Number(_) => 2,
                        Value::String(_) => 3,
                        Value::Array(_) => 4,
                        Value::Object(_) => 5,
                    }
                };

                let a_type = type_order(a_val);
                let b_type = type_order(b_val);
                if a_type != b_type {
                    return a_type.cmp(&b_type);
                }

                match (a_val, b_val) {
                    (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
                    (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
                        (Some(xi), Some(yi)) => xi.cmp(&yi),
                        _ => {
                            let xf = x.as_f64().unwrap_or(0.0);
                            let yf = y.as_f64().unwrap_or(0.0);
                            xf.partial_cmp(&yf).unwrap_or(Ordering::Equal)
                        }
                    },
                    (Value::String(x), Value::String(y)) => x.cmp(y),
                    _ => Ordering::Equal,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Row;
    use serde_json::json;

    fn row(id: i64, age: Value) -> ResultRow {
        let mut values = Row::new();
        values.insert("id".into(), json!(id));
        values.insert("age".into(), age);
        ResultRow::new(values)
    }

    fn spec(direction: SortDirection, columns: &[&str]) -> SortSpec {
        SortSpec {
            direction,
            fields: columns.iter().map(|c| c.to_string()).collect(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn ids(rows: &[ResultRow]) -> Vec<i64> {
        rows.iter().map(|r| r.get("id").as_i64().unwrap()).collect()
    }

    #[test]
    fn test_sort_ascending_nulls_first() {
        let mut rows = vec![row(1, json!(30)), row(2, Value::Null), row(3, json!(20))];
        ResultSorter::sort(&mut rows, &spec(SortDirection::Asc, &["age"]));
        assert_eq!(ids(&rows), vec![2, 3, 1]);
    }

    #[test]
    fn test_sort_descending() {
        let mut rows = vec![row(1, json!(30)), row(2, json!(25)), row(3, json!(40))];
        ResultSorter::sort(&mut rows, &spec(SortDirection::Desc, &["age"]));
        assert_eq!(ids(&rows), vec![3, 1, 2]);
    }

    #[test]
    fn test_sort_stable_with_tie_breaker() {
        let mut rows = vec![row(3, json!(25)), row(1, json!(25)), row(2, json!(20))];
        ResultSorter::sort(&mut rows, &spec(SortDirection::Asc, &["age"]));
        assert_eq!(ids(&rows), vec![2, 3, 1]);

        ResultSorter::sort(&mut rows, &spec(SortDirection::Asc, &["age", "id"]));
        assert_eq!(ids(&rows), vec![2, 1, 3]);
    }
}
