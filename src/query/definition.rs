//! Query definitions
//!
//! A definition owns one where clause over one domain type, the registry of
//! parameters that clause references, and the candidate indexes scored for
//! it. Build it with `&mut`, then share it behind `Arc`; the candidate set is
//! computed once on first use and read without locks afterwards.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::config::QueryConfig;
use crate::observability::{log_event, Event};
use crate::planner::CandidateSet;

use super::binding::BindingContext;
use super::domain::DomainType;
use super::errors::{QueryError, QueryResult};
use super::predicate::{DefinitionId, Parameter, ParameterShape, Predicate, Property};

static NEXT_DEFINITION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
struct ParameterState {
    marked: bool,
    shape: ParameterShape,
}

/// Where clause, parameters and candidate indexes of one query shape
#[derive(Debug)]
pub struct QueryDefinition {
    id: DefinitionId,
    domain: Arc<DomainType>,
    config: QueryConfig,
    where_clause: Option<Predicate>,
    parameters: BTreeMap<String, ParameterState>,
    prepared: OnceLock<CandidateSet>,
}

impl QueryDefinition {
    pub fn new(domain: DomainType, config: QueryConfig) -> Self {
        Self {
            id: NEXT_DEFINITION_ID.fetch_add(1, Ordering::Relaxed),
            domain: Arc::new(domain),
            config,
            where_clause: None,
            parameters: BTreeMap::new(),
            prepared: OnceLock::new(),
        }
    }

    pub fn id(&self) -> DefinitionId {
        self.id
    }

    pub fn domain(&self) -> &DomainType {
        &self.domain
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Property for a field of the domain type
    pub fn get(&self, field: &str) -> QueryResult<Property> {
        let field = self.domain.require_field(field)?;
        Ok(Property::new(self.id, field.clone()))
    }

    pub fn param(&self, name: &str) -> Parameter {
        Parameter::new(self.id, name)
    }

    /// Negation of any predicate of this definition, And and Or included
    pub fn not(&self, predicate: Predicate) -> QueryResult<Predicate> {
        if predicate.definition() != self.id {
            return Err(QueryError::mixed_definitions());
        }
        Ok(Predicate::Not(Box::new(predicate)))
    }

    /// Installs the where clause, replacing any earlier one.
    ///
    /// Parameters of the old clause are unmarked, those of the new one
    /// marked, and the candidate indexes are scored again on next use.
    pub fn where_clause(&mut self, predicate: Predicate) -> QueryResult<()> {
        predicate.validate(self.id)?;
        check_parameter_shapes(&predicate)?;

        if let Some(old) = self.where_clause.take() {
            self.unmark_parameters(&old);
        }
        self.mark_parameters(&predicate);

        log_event(
            Event::WhereClauseInstalled,
            &[
                ("table", self.domain.table_name()),
                ("where", &predicate.to_string()),
            ],
        );
        self.where_clause = Some(predicate);
        self.prepared = OnceLock::new();
        Ok(())
    }

    pub fn where_predicate(&self) -> Option<&Predicate> {
        self.where_clause.as_ref()
    }

    fn mark_parameters(&mut self, predicate: &Predicate) {
        for (parameter, shape) in predicate.parameters() {
            match self.parameters.get_mut(parameter.name()) {
                Some(state) if state.marked => {}
                Some(state) => {
                    state.marked = true;
                    state.shape = shape;
                }
                None => {
                    self.parameters.insert(
                        parameter.name().to_string(),
                        ParameterState {
                            marked: true,
                            shape,
                        },
                    );
                }
            }
        }
    }

    fn unmark_parameters(&mut self, predicate: &Predicate) {
        for (parameter, _) in predicate.parameters() {
            if let Some(state) = self.parameters.get_mut(parameter.name()) {
                state.marked = false;
            }
        }
    }

    /// Whether the installed where clause references `name`
    pub fn is_marked(&self, name: &str) -> bool {
        self.parameters.get(name).map(|s| s.marked).unwrap_or(false)
    }

    /// Shape a parameter must be bound to; None for names never used
    pub fn parameter_shape(&self, name: &str) -> Option<&ParameterShape> {
        self.parameters.get(name).map(|s| &s.shape)
    }

    /// Every marked parameter must be bound
    pub fn check_bound(&self, context: &BindingContext) -> QueryResult<()> {
        for (name, state) in &self.parameters {
            if state.marked && !context.is_bound(name) {
                return Err(QueryError::parameter_unbound(name));
            }
        }
        Ok(())
    }

    /// Scores the candidate indexes for the where clause, once.
    pub fn prepare(&self) -> &CandidateSet {
        self.prepared.get_or_init(|| {
            let set = CandidateSet::build(
                &self.domain,
                self.where_clause.as_ref(),
                &self.config.primary_index_name,
            );
            log_event(
                Event::QueryPrepared,
                &[
                    ("candidates", &set.ordered().len().to_string()),
                    ("table", self.domain.table_name()),
                    ("unique", &set.unique().is_some().to_string()),
                ],
            );
            set
        })
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.get().is_some()
    }
}

/// A parameter used by several terms must accept one value shape.
fn check_parameter_shapes(predicate: &Predicate) -> QueryResult<()> {
    let mut seen: BTreeMap<&str, ParameterShape> = BTreeMap::new();
    for (parameter, shape) in predicate.parameters() {
        match seen.get(parameter.name()) {
            Some(first) if *first != shape => {
                return Err(QueryError::parameter_shape_conflict(
                    parameter.name(),
                    &first.describe(),
                    &shape.describe(),
                ));
            }
            Some(_) => {}
            None => {
                seen.insert(parameter.name(), shape);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryErrorCode;
    use crate::store::{ColumnType, TableMeta};
    use serde_json::json;

    fn definition() -> QueryDefinition {
        let table = TableMeta::builder("person")
            .column("id", ColumnType::Int)
            .nullable_column("age", ColumnType::Int)
            .nullable_column("name", ColumnType::String)
            .primary_key(&["id"])
            .ordered_index("idx_age_name", &["age", "name"])
            .build()
            .unwrap();
        QueryDefinition::new(DomainType::new(Arc::new(table)), QueryConfig::default())
    }

    #[test]
    fn test_unknown_field() {
        let def = definition();
        let err = def.get("salary").unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::CqUnknownField);
        assert!(err.message().contains("salary"));
    }

    #[test]
    fn test_where_clause_marks_and_unmarks() {
        let mut def = definition();
        let age = def.get("age").unwrap();
        let name = def.get("name").unwrap();

        def.where_clause(age.equal(&def.param("a"))).unwrap();
        assert!(def.is_marked("a"));

        def.where_clause(name.equal(&def.param("n"))).unwrap();
        assert!(!def.is_marked("a"));
        assert!(def.is_marked("n"));
        assert!(def.parameter_shape("a").is_some());
        assert!(def.parameter_shape("zzz").is_none());
    }

    #[test]
    fn test_parameter_shape_conflict() {
        let mut def = definition();
        let age = def.get("age").unwrap();
        let name = def.get("name").unwrap();
        def.where_clause(age.equal(&def.param("a"))).unwrap();

        let pred = age
            .equal(&def.param("p"))
            .and(name.equal(&def.param("p")))
            .unwrap();
        let err = def.where_clause(pred).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::CqParameterShapeConflict);
        assert!(err.message().contains("'p'"));
        assert!(err.message().contains("int") && err.message().contains("string"));
        // the earlier clause stays installed
        assert!(def.is_marked("a"));
        assert!(!def.is_marked("p"));

        let pred = age
            .equal(&def.param("p"))
            .and(age.in_values(&def.param("p")))
            .unwrap();
        assert_eq!(
            def.where_clause(pred).unwrap_err().code(),
            QueryErrorCode::CqParameterShapeConflict
        );

        // the same shape twice is fine
        let pred = age
            .greater_equal(&def.param("p"))
            .and(age.less_equal(&def.param("p")))
            .unwrap();
        def.where_clause(pred).unwrap();
        assert!(def.is_marked("p"));
    }

    #[test]
    fn test_check_bound() {
        let mut def = definition();
        let age = def.get("age").unwrap();
        def.where_clause(age.between(&def.param("lo"), &def.param("hi")))
            .unwrap();

        let mut ctx = BindingContext::new();
        ctx.bind("lo", json!(1));
        let err = def.check_bound(&ctx).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::CqParameterUnbound);
        assert!(err.message().contains("hi"));

        ctx.bind("hi", serde_json::Value::Null);
        assert!(def.check_bound(&ctx).is_ok());
    }

    #[test]
    fn test_reinstall_resets_prepared() {
        let mut def = definition();
        let age = def.get("age").unwrap();
        def.where_clause(age.equal(&def.param("a"))).unwrap();

        assert_eq!(def.prepare().ordered().len(), 1);
        assert!(def.is_prepared());

        let name = def.get("name").unwrap();
        def.where_clause(name.equal(&def.param("n"))).unwrap();
        assert!(!def.is_prepared());
        assert!(def.prepare().ordered().is_empty());
    }

    #[test]
    fn test_foreign_predicate_rejected() {
        let mut def = definition();
        let other = definition();
        let pred = other.get("age").unwrap().equal(&other.param("a"));

        assert_eq!(
            def.where_clause(pred.clone()).unwrap_err().code(),
            QueryErrorCode::CqMixedDefinitions
        );
        assert_eq!(def.not(pred).unwrap_err().code(), QueryErrorCode::CqMixedDefinitions);

        let mixed = def.get("age").unwrap().equal(&other.param("a"));
        assert_eq!(
            def.where_clause(mixed).unwrap_err().code(),
            QueryErrorCode::CqMixedDefinitions
        );
    }

    #[test]
    fn test_not_wraps_conjunctions() {
        let def = definition();
        let age = def.get("age").unwrap();
        let and = age
            .greater_than(&def.param("a"))
            .and(age.less_than(&def.param("b")))
            .unwrap();
        assert!(matches!(def.not(and).unwrap(), Predicate::Not(_)));
    }
}
