//! Query error types
//!
//! Every code belongs to one kind:
//! - USER (REJECT): the caller built or bound the query wrongly; fix and retry
//! - INTERNAL (FATAL): a planner invariant was violated
//! - ENGINE (ERROR): the storage engine failed; the cause is attached
//! - UNSUPPORTED (ERROR): the operation is not implemented for this predicate

use std::fmt;

use crate::store::StoreError;

/// Error families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    User,
    Internal,
    Engine,
    Unsupported,
}

impl ErrorKind {
    pub fn severity(&self) -> &'static str {
        match self {
            ErrorKind::User => "REJECT",
            ErrorKind::Internal => "FATAL",
            ErrorKind::Engine | ErrorKind::Unsupported => "ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.severity())
    }
}

/// Query error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorCode {
    /// Predicates combined across query definitions
    CqMixedDefinitions,
    /// Parameter bound with an empty name
    CqParameterNameRequired,
    /// Parameter name not used by the query
    CqUnknownParameter,
    /// Field name not defined by the domain type
    CqUnknownField,
    /// Marked parameter left unbound at execution
    CqParameterUnbound,
    /// IN parameter bound to a non-array value
    CqParameterNotCollection,
    /// Parameter bound to a value of the wrong type
    CqParameterTypeMismatch,
    /// One parameter used with two different value shapes
    CqParameterShapeConflict,
    /// More than one IN predicate over one index
    CqTooManyInPredicates,
    /// Skip or limit set on a bulk delete
    CqLimitsOnDelete,
    /// Composite property used with a non-equality operator
    CqComplexPropertyOperator,
    /// Invalid configuration
    CqConfigInvalid,
    /// Invalid domain type definition
    CqInvalidDomain,
    /// Non-equality term in a key lookup
    CqNonEqualityKeyTerm,
    /// Planner invariant violated
    CqPlannerInvariant,
    /// Storage engine failure
    CqEngineAccess,
    /// Operation not implemented for this predicate
    CqNotImplemented,
}

impl QueryErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            QueryErrorCode::CqMixedDefinitions => "CQ_MIXED_DEFINITIONS",
            QueryErrorCode::CqParameterNameRequired => "CQ_PARAMETER_NAME_REQUIRED",
            QueryErrorCode::CqUnknownParameter => "CQ_UNKNOWN_PARAMETER",
            QueryErrorCode::CqUnknownField => "CQ_UNKNOWN_FIELD",
            QueryErrorCode::CqParameterUnbound => "CQ_PARAMETER_UNBOUND",
            QueryErrorCode::CqParameterNotCollection => "CQ_PARAMETER_NOT_COLLECTION",
            QueryErrorCode::CqParameterTypeMismatch => "CQ_PARAMETER_TYPE_MISMATCH",
            QueryErrorCode::CqParameterShapeConflict => "CQ_PARAMETER_SHAPE_CONFLICT",
            QueryErrorCode::CqTooManyInPredicates => "CQ_TOO_MANY_IN_PREDICATES",
            QueryErrorCode::CqLimitsOnDelete => "CQ_LIMITS_ON_DELETE",
            QueryErrorCode::CqComplexPropertyOperator => "CQ_COMPLEX_PROPERTY_OPERATOR",
            QueryErrorCode::CqConfigInvalid => "CQ_CONFIG_INVALID",
            QueryErrorCode::CqInvalidDomain => "CQ_INVALID_DOMAIN",
            QueryErrorCode::CqNonEqualityKeyTerm => "CQ_NON_EQUALITY_KEY_TERM",
            QueryErrorCode::CqPlannerInvariant => "CQ_PLANNER_INVARIANT",
            QueryErrorCode::CqEngineAccess => "CQ_ENGINE_ACCESS",
            QueryErrorCode::CqNotImplemented => "CQ_NOT_IMPLEMENTED",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryErrorCode::CqNonEqualityKeyTerm | QueryErrorCode::CqPlannerInvariant => {
                ErrorKind::Internal
            }
            QueryErrorCode::CqEngineAccess => ErrorKind::Engine,
            QueryErrorCode::CqNotImplemented => ErrorKind::Unsupported,
            _ => ErrorKind::User,
        }
    }
}

impl fmt::Display for QueryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Query error with code, message and optional engine cause
#[derive(Debug, Clone)]
pub struct QueryError {
    code: QueryErrorCode,
    message: String,
    source: Option<StoreError>,
}

impl QueryError {
    fn new(code: QueryErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn mixed_definitions() -> Self {
        Self::new(
            QueryErrorCode::CqMixedDefinitions,
            "Cannot combine predicates from different query definitions",
        )
    }

    pub fn parameter_name_required() -> Self {
        Self::new(
            QueryErrorCode::CqParameterNameRequired,
            "Parameter name must not be empty",
        )
    }

    pub fn unknown_parameter(name: &str) -> Self {
        Self::new(
            QueryErrorCode::CqUnknownParameter,
            format!("Parameter '{}' is not used by this query", name),
        )
    }

    pub fn unknown_field(domain: &str, field: &str) -> Self {
        Self::new(
            QueryErrorCode::CqUnknownField,
            format!("Field '{}' is not defined on '{}'", field, domain),
        )
    }

    pub fn parameter_unbound(name: &str) -> Self {
        Self::new(
            QueryErrorCode::CqParameterUnbound,
            format!("Parameter '{}' must be bound before execution", name),
        )
    }

    pub fn parameter_not_collection(name: &str, value_type: &str) -> Self {
        Self::new(
            QueryErrorCode::CqParameterNotCollection,
            format!(
                "Parameter '{}' of an IN predicate must be an array, got {}",
                name, value_type
            ),
        )
    }

    pub fn parameter_type_mismatch(name: &str, expected: &str, value_type: &str) -> Self {
        Self::new(
            QueryErrorCode::CqParameterTypeMismatch,
            format!(
                "Parameter '{}' expects {}, got {}",
                name, expected, value_type
            ),
        )
    }

    pub fn parameter_shape_conflict(name: &str, first: &str, second: &str) -> Self {
        Self::new(
            QueryErrorCode::CqParameterShapeConflict,
            format!(
                "Parameter '{}' is used as {} and as {}",
                name, first, second
            ),
        )
    }

    pub fn too_many_in_predicates(index: &str) -> Self {
        Self::new(
            QueryErrorCode::CqTooManyInPredicates,
            format!("Too many IN predicates for index '{}'", index),
        )
    }

    pub fn limits_on_delete() -> Self {
        Self::new(
            QueryErrorCode::CqLimitsOnDelete,
            "Skip and limit cannot be used with delete_persistent_all",
        )
    }

    pub fn complex_property_operator(field: &str, operator: &str) -> Self {
        Self::new(
            QueryErrorCode::CqComplexPropertyOperator,
            format!(
                "Composite field '{}' supports only equality, not {}",
                field, operator
            ),
        )
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::new(QueryErrorCode::CqConfigInvalid, reason)
    }

    pub fn invalid_domain(reason: impl Into<String>) -> Self {
        Self::new(QueryErrorCode::CqInvalidDomain, reason)
    }

    pub fn non_equality_key_term(term: &str) -> Self {
        Self::new(
            QueryErrorCode::CqNonEqualityKeyTerm,
            format!("Key lookup term '{}' is not an equality", term),
        )
    }

    pub fn planner_invariant(reason: impl Into<String>) -> Self {
        Self::new(QueryErrorCode::CqPlannerInvariant, reason)
    }

    pub fn not_implemented(operation: &str, predicate: &str) -> Self {
        Self::new(
            QueryErrorCode::CqNotImplemented,
            format!("{}() is not implemented for {} predicates", operation, predicate),
        )
    }

    /// Wraps an engine failure with context
    pub fn engine(context: impl Into<String>, source: StoreError) -> Self {
        Self {
            code: QueryErrorCode::CqEngineAccess,
            message: context.into(),
            source: Some(source),
        }
    }

    pub fn code(&self) -> QueryErrorCode {
        self.code
    }

    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// User and engine errors leave the process healthy; internal faults do not.
    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::Internal
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn store_error(&self) -> Option<&StoreError> {
        self.source.as_ref()
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind(), self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Names a JSON value's type for error messages
pub(crate) fn value_type_name(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_kinds() {
        assert_eq!(QueryError::mixed_definitions().kind(), ErrorKind::User);
        assert_eq!(QueryError::non_equality_key_term("a > :x").kind(), ErrorKind::Internal);
        assert_eq!(
            QueryError::not_implemented("or", "And").kind(),
            ErrorKind::Unsupported
        );
        assert!(!QueryError::planner_invariant("x").is_recoverable());
        assert!(QueryError::parameter_unbound("a").is_recoverable());
    }

    #[test]
    fn test_messages_are_templated() {
        let err = QueryError::too_many_in_predicates("idx_age_name");
        assert_eq!(err.code().code(), "CQ_TOO_MANY_IN_PREDICATES");
        assert!(err.message().contains("idx_age_name"));

        let err = QueryError::parameter_type_mismatch("age", "int", "string");
        assert!(err.to_string().contains("[REJECT] CQ_PARAMETER_TYPE_MISMATCH"));
    }

    #[test]
    fn test_engine_error_keeps_cause() {
        let err = QueryError::engine(
            "Error building filter",
            StoreError::Filter("end() without begin()".into()),
        );
        assert_eq!(err.kind(), ErrorKind::Engine);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("caused by: Filter error"));
    }

    #[test]
    fn test_value_type_name() {
        assert_eq!(value_type_name(&serde_json::json!(1)), "int");
        assert_eq!(value_type_name(&serde_json::json!(1.5)), "float");
        assert_eq!(value_type_name(&serde_json::json!([1])), "array");
    }
}
