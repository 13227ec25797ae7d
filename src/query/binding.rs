//! Parameter bindings for one execution
//!
//! A context is a copy-on-write snapshot: cloning is cheap and binding into
//! a clone never changes the context another execution is reading.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::errors::{value_type_name, QueryError, QueryResult};

/// Named parameter values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingContext {
    values: Arc<BTreeMap<String, Value>>,
}

impl BindingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name`, replacing any earlier value.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        Arc::make_mut(&mut self.values).insert(name.into(), value);
    }

    pub fn unbind(&mut self, name: &str) -> Option<Value> {
        Arc::make_mut(&mut self.values).remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Value of a parameter that must be bound
    pub fn value(&self, name: &str) -> QueryResult<&Value> {
        self.get(name)
            .ok_or_else(|| QueryError::parameter_unbound(name))
    }

    /// Value of a parameter if bound and not null
    pub fn non_null(&self, name: &str) -> Option<&Value> {
        self.get(name).filter(|v| !v.is_null())
    }

    pub fn int(&self, name: &str) -> QueryResult<Option<i64>> {
        self.typed(name, "int", Value::as_i64)
    }

    pub fn float(&self, name: &str) -> QueryResult<Option<f64>> {
        self.typed(name, "float", Value::as_f64)
    }

    pub fn bool(&self, name: &str) -> QueryResult<Option<bool>> {
        self.typed(name, "bool", Value::as_bool)
    }

    pub fn string(&self, name: &str) -> QueryResult<Option<&str>> {
        self.typed(name, "string", Value::as_str)
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        expected: &str,
        read: impl Fn(&'a Value) -> Option<T>,
    ) -> QueryResult<Option<T>> {
        let value = self.value(name)?;
        if value.is_null() {
            return Ok(None);
        }
        read(value).map(Some).ok_or_else(|| {
            QueryError::parameter_type_mismatch(name, expected, value_type_name(value))
        })
    }

    /// True when no bound value is null
    pub fn has_no_null_parameters(&self) -> bool {
        self.values.values().all(|v| !v.is_null())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
