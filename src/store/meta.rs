//! Table, column and index metadata

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{StoreError, StoreResult};

/// Name the engine gives the unique index over the primary key
pub const PRIMARY_INDEX: &str = "PRIMARY";

/// Column value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Bool,
    Int,
    Float,
    String,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Bool => "bool",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::String => "string",
        }
    }

    /// Returns true if `value` is a legal value of this type.
    ///
    /// Null is legal for every type; nullability is checked separately.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ColumnType::Bool, Value::Bool(_)) => true,
            (ColumnType::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (ColumnType::Float, Value::Number(_)) => true,
            (ColumnType::String, Value::String(_)) => true,
            _ => false,
        }
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

/// Index kinds the planner distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    /// Hash index with unique keys; supports point lookups only
    Unique,
    /// Ordered index; supports range scans
    Ordered,
}

/// Index definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub name: String,
    pub kind: IndexKind,
    pub columns: Vec<String>,
}

impl IndexMeta {
    pub fn is_unique(&self) -> bool {
        self.kind == IndexKind::Unique
    }

    /// Position of `column` within the index key
    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

/// Table definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub columns: Vec<ColumnMeta>,
    pub primary_key: Vec<String>,
    pub indexes: Vec<IndexMeta>,
}

impl TableMeta {
    /// Starts a table definition
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn index(&self, name: &str) -> Option<&IndexMeta> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn require_column(&self, name: &str) -> StoreResult<&ColumnMeta> {
        self.column(name).ok_or_else(|| StoreError::ColumnNotFound {
            table: self.name.clone(),
            column: name.to_string(),
        })
    }

    pub fn require_index(&self, name: &str) -> StoreResult<&IndexMeta> {
        self.index(name).ok_or_else(|| StoreError::IndexNotFound {
            table: self.name.clone(),
            index: name.to_string(),
        })
    }
}

/// Builder for [`TableMeta`]
#[derive(Debug, Clone)]
pub struct TableBuilder {
    name: String,
    columns: Vec<ColumnMeta>,
    primary_key: Vec<String>,
    indexes: Vec<IndexMeta>,
}

impl TableBuilder {
    /// Adds a non-nullable column
    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnMeta {
            name: name.into(),
            column_type,
            nullable: false,
        });
        self
    }

    /// Adds a nullable column
    pub fn nullable_column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnMeta {
            name: name.into(),
            column_type,
            nullable: true,
        });
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn unique_index(self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.index(name, IndexKind::Unique, columns)
    }

    pub fn ordered_index(self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.index(name, IndexKind::Ordered, columns)
    }

    fn index(mut self, name: impl Into<String>, kind: IndexKind, columns: &[&str]) -> Self {
        self.indexes.push(IndexMeta {
            name: name.into(),
            kind,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Validates the definition and adds the `PRIMARY` unique index first.
    pub fn build(self) -> StoreResult<TableMeta> {
        if self.primary_key.is_empty() {
            return Err(StoreError::InvalidDefinition(format!(
                "table '{}' has no primary key",
                self.name
            )));
        }

        let mut indexes = Vec::with_capacity(self.indexes.len() + 1);
        indexes.push(IndexMeta {
            name: PRIMARY_INDEX.to_string(),
            kind: IndexKind::Unique,
            columns: self.primary_key.clone(),
        });
        indexes.extend(self.indexes);

        let table = TableMeta {
            name: self.name,
            columns: self.columns,
            primary_key: self.primary_key,
            indexes,
        };

        for (i, column) in table.columns.iter().enumerate() {
            if table.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(StoreError::InvalidDefinition(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }
        for pk in &table.primary_key {
            if table.require_column(pk)?.nullable {
                return Err(StoreError::InvalidDefinition(format!(
                    "primary key column '{}' must not be nullable",
                    pk
                )));
            }
        }
        for (i, index) in table.indexes.iter().enumerate() {
            if index.columns.is_empty() {
                return Err(StoreError::InvalidDefinition(format!(
                    "index '{}' has no columns",
                    index.name
                )));
            }
            if table.indexes[..i].iter().any(|other| other.name == index.name) {
                return Err(StoreError::InvalidDefinition(format!(
                    "duplicate index '{}'",
                    index.name
                )));
            }
            for column in &index.columns {
                table.require_column(column)?;
            }
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person() -> TableBuilder {
        TableMeta::builder("person")
            .column("id", ColumnType::Int)
            .nullable_column("age", ColumnType::Int)
            .nullable_column("name", ColumnType::String)
            .primary_key(&["id"])
    }

    #[test]
    fn test_primary_index_added_first() {
        let table = person().ordered_index("idx_age_name", &["age", "name"]).build().unwrap();

        assert_eq!(table.indexes[0].name, PRIMARY_INDEX);
        assert!(table.indexes[0].is_unique());
        assert_eq!(table.indexes[0].columns, vec!["id"]);
        assert_eq!(table.index("idx_age_name").unwrap().position("name"), Some(1));
    }

    #[test]
    fn test_index_on_unknown_column_rejected() {
        let err = person().ordered_index("idx_x", &["x"]).build().unwrap_err();
        assert!(matches!(err, StoreError::ColumnNotFound { .. }));
    }

    #[test]
    fn test_missing_primary_key_rejected() {
        let err = TableMeta::builder("t").column("a", ColumnType::Int).build().unwrap_err();
        assert!(matches!(err, StoreError::InvalidDefinition(_)));
    }

    #[test]
    fn test_column_type_accepts() {
        assert!(ColumnType::Int.accepts(&json!(3)));
        assert!(!ColumnType::Int.accepts(&json!(3.5)));
        assert!(ColumnType::Float.accepts(&json!(3)));
        assert!(ColumnType::String.accepts(&json!(null)));
        assert!(!ColumnType::Bool.accepts(&json!("true")));
    }
}
