//! Storage access errors

use thiserror::Error;

/// Result type for storage access operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a storage engine behind the [`Store`](super::Store) traits
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Index '{index}' not found on table '{table}'")]
    IndexNotFound { table: String, index: String },

    #[error("Column '{column}' not found on table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error("Invalid table definition: {0}")]
    InvalidDefinition(String),

    #[error("Invalid value for column '{column}': {reason}")]
    InvalidValue { column: String, reason: String },

    #[error("Duplicate key for index '{0}'")]
    DuplicateKey(String),

    #[error("Missing value for key column '{0}'")]
    MissingKey(String),

    #[error("Invalid bound: {0}")]
    InvalidBound(String),

    #[error("Filter error: {0}")]
    Filter(String),

    #[error("Filter already released")]
    FilterReleased,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_object() {
        let err = StoreError::IndexNotFound {
            table: "person".into(),
            index: "idx_age".into(),
        };
        assert_eq!(err.to_string(), "Index 'idx_age' not found on table 'person'");
        assert_eq!(StoreError::FilterReleased.to_string(), "Filter already released");
    }
}
