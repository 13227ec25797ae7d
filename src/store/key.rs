//! Ordered key values for the in-memory engine
//!
//! Ordering is total and deterministic: Null < Bool < Int < Float < String.
//! Within a column all non-null keys share one variant, so the cross-variant
//! order only matters for nulls.

use std::cmp::Ordering;

use serde_json::Value;

use super::meta::ColumnType;

/// A serialized column value with total ordering
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Null,
    Bool(bool),
    Int(i64),
    /// f64 bits remapped for total ordering
    Float(u64),
    String(String),
}

impl IndexKey {
    /// Create a key from a float
    pub fn from_float(v: f64) -> Self {
        let bits = v.to_bits();
        let ordered = if (bits >> 63) == 1 {
            !bits
        } else {
            bits ^ (1 << 63)
        };
        IndexKey::Float(ordered)
    }

    /// Create a key for a value stored in a column of `column_type`.
    ///
    /// Returns None for values the column cannot hold.
    pub fn for_column(column_type: ColumnType, value: &Value) -> Option<Self> {
        match (column_type, value) {
            (_, Value::Null) => Some(IndexKey::Null),
            (ColumnType::Bool, Value::Bool(b)) => Some(IndexKey::Bool(*b)),
            (ColumnType::Int, Value::Number(n)) => n.as_i64().map(IndexKey::Int),
            (ColumnType::Float, Value::Number(n)) => n.as_f64().map(IndexKey::from_float),
            (ColumnType::String, Value::String(s)) => Some(IndexKey::String(s.clone())),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, IndexKey::Null)
    }
}

/// Compares a stored value with a filter operand.
///
/// Returns None when either side is null or the types do not compare;
/// such comparisons never match.
pub fn compare_values(actual: &Value, operand: &Value) -> Option<Ordering> {
    match (actual, operand) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(ai), Some(bi)) = (a.as_i64(), b.as_i64()) {
                return Some(ai.cmp(&bi));
            }
            match (a.as_f64(), b.as_f64()) {
                (Some(af), Some(bf)) => af.partial_cmp(&bf),
                _ => None,
            }
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_ordering() {
        let keys = vec![
            IndexKey::Null,
            IndexKey::Bool(false),
            IndexKey::Bool(true),
            IndexKey::Int(-100),
            IndexKey::Int(0),
            IndexKey::Int(100),
            IndexKey::String("aaa".into()),
            IndexKey::String("zzz".into()),
        ];

        for i in 1..keys.len() {
            assert!(keys[i - 1] < keys[i], "Keys should be ordered");
        }
    }

    #[test]
    fn test_float_ordering() {
        assert!(IndexKey::from_float(-2.5) < IndexKey::from_float(-1.0));
        assert!(IndexKey::from_float(-1.0) < IndexKey::from_float(0.0));
        assert!(IndexKey::from_float(0.5) < IndexKey::from_float(10.0));
    }

    #[test]
    fn test_for_column() {
        assert_eq!(IndexKey::for_column(ColumnType::Int, &json!(42)), Some(IndexKey::Int(42)));
        assert_eq!(
            IndexKey::for_column(ColumnType::Float, &json!(3)),
            Some(IndexKey::from_float(3.0))
        );
        assert_eq!(IndexKey::for_column(ColumnType::String, &json!(null)), Some(IndexKey::Null));
        assert_eq!(IndexKey::for_column(ColumnType::Int, &json!("42")), None);
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(30), &json!(18)), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!("a"), &json!("b")), Some(Ordering::Less));
        assert_eq!(compare_values(&json!(null), &json!(1)), None);
        assert_eq!(compare_values(&json!("1"), &json!(1)), None);
    }
}
