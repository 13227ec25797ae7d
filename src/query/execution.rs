//! Query execution
//!
//! A `Query` is one caller's view of a shared `QueryDefinition`: its own
//! parameter values, ordering and limits.
//!
//! Execution flow:
//! 1. Check that every parameter of the where clause is bound
//! 2. Select the access path for the bound values and ordering
//! 3. Plan key values or scan bounds (pure, before any engine call)
//! 4. Create the operation, set bounds and the residual filter
//! 5. Execute, release the filter
//! 6. Sort in memory if ordering was requested but not delivered
//! 7. Apply skip and limit while reading

use std::sync::Arc;

use serde_json::Value;

use crate::observability::{log_event, Event, QueryMetrics};
use crate::planner::{
    build_residual_filter, plan_scan_bounds, select, set_key_values, CandidateIndex, CandidateSet,
    ExplainPlan, ScanType,
};
use crate::store::{Operation, ResultCursor, ScanOperation, ScanOptions, Store, VecCursor};

use super::binding::BindingContext;
use super::definition::QueryDefinition;
use super::errors::{ErrorKind, QueryError, QueryResult};
use super::result::ResultData;
use super::sorter::{ResultSorter, SortDirection, SortSpec};

/// One executable instance of a query definition
pub struct Query {
    definition: Arc<QueryDefinition>,
    store: Arc<dyn Store>,
    metrics: Arc<QueryMetrics>,
    context: BindingContext,
    ordering: Option<SortSpec>,
    skip: u64,
    limit: Option<u64>,
}

impl Query {
    pub(crate) fn new(
        definition: Arc<QueryDefinition>,
        store: Arc<dyn Store>,
        metrics: Arc<QueryMetrics>,
    ) -> Self {
        Self {
            definition,
            store,
            metrics,
            context: BindingContext::new(),
            ordering: None,
            skip: 0,
            limit: None,
        }
    }

    pub fn definition(&self) -> &QueryDefinition {
        &self.definition
    }

    pub fn context(&self) -> &BindingContext {
        &self.context
    }

    /// Binds a parameter value.
    ///
    /// The name must be used by the definition and the value must fit the
    /// parameter's shape. Null is accepted for every parameter.
    pub fn bind(&mut self, name: &str, value: Value) -> QueryResult<()> {
        let checked = self.check_binding(name, &value);
        self.observe(checked)?;
        self.context.bind(name, value);
        Ok(())
    }

    fn check_binding(&self, name: &str, value: &Value) -> QueryResult<()> {
        if name.is_empty() {
            return Err(QueryError::parameter_name_required());
        }
        let shape = self
            .definition
            .parameter_shape(name)
            .ok_or_else(|| QueryError::unknown_parameter(name))?;
        shape.check(name, value)
    }

    /// Requests result ordering by the given fields; no fields clears it.
    pub fn set_ordering(&mut self, direction: SortDirection, fields: &[&str]) -> QueryResult<()> {
        if fields.is_empty() {
            self.ordering = None;
            return Ok(());
        }

        let domain = self.definition.domain();
        let mut columns = Vec::new();
        for name in fields {
            let field = self.observe(domain.require_field(name).map(|f| f.column_names()))?;
            columns.extend(field);
        }
        self.ordering = Some(SortSpec {
            direction,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            columns,
        });
        Ok(())
    }

    pub fn set_limits(&mut self, skip: u64, limit: Option<u64>) {
        self.skip = skip;
        self.limit = limit;
    }

    fn ordering_fields(&self) -> Option<&[String]> {
        self.ordering.as_ref().map(|o| o.fields.as_slice())
    }

    /// Access path the next execution would take
    pub fn get_best_candidate_index(&self) -> QueryResult<&CandidateIndex> {
        self.observe(self.definition.check_bound(&self.context))?;
        let set = self.definition.prepare();
        Ok(select(set, &self.context, self.ordering_fields()))
    }

    /// Describes the access path without executing
    pub fn explain(&self) -> QueryResult<ExplainPlan> {
        let index = self.get_best_candidate_index()?;
        let set = self.definition.prepare();
        let ordering = self.ordering.as_ref().map(SortSpec::describe);
        self.observe(ExplainPlan::describe(set, index, &self.context, ordering))
    }

    /// Executes the query
    pub fn get_result_data(&self) -> QueryResult<ResultData> {
        let result = self.execute(true);
        self.observe(result)
    }

    /// Deletes every matching row by primary key and returns the count.
    ///
    /// Skip and limit are rejected.
    pub fn delete_persistent_all(&self) -> QueryResult<u64> {
        let result = self.delete_matching();
        self.observe(result)
    }

    fn delete_matching(&self) -> QueryResult<u64> {
        if self.skip > 0 || self.limit.is_some() {
            return Err(QueryError::limits_on_delete());
        }

        let rows = self.execute(false)?.collect_rows()?;
        let table = self.definition.domain().table();

        let mut deleted = 0;
        for row in &rows {
            let key: Vec<Value> = table
                .primary_key
                .iter()
                .map(|column| row.get(column).clone())
                .collect();
            let removed = self
                .store
                .delete(&table.name, &key)
                .map_err(|e| QueryError::engine(format!("Error deleting from '{}'", table.name), e))?;
            if removed {
                deleted += 1;
            }
        }

        log_event(
            Event::RowsDeleted,
            &[("count", &deleted.to_string()), ("table", &table.name)],
        );
        Ok(deleted)
    }

    fn execute(&self, apply_limits: bool) -> QueryResult<ResultData> {
        self.definition.check_bound(&self.context)?;
        let set = self.definition.prepare();
        let index = select(set, &self.context, self.ordering_fields());
        self.trace_selection(index);

        let cursor = match index.scan_type() {
            ScanType::PrimaryKey | ScanType::UniqueKey => self.key_lookup(set, index)?,
            ScanType::IndexScan => self.index_scan(set, index)?,
            ScanType::TableScan => self.table_scan(set)?,
        };
        self.metrics.record_execution(index.scan_type());
        log_event(
            Event::QueryExecuted,
            &[
                ("index", index.name()),
                ("scan_type", index.scan_type().as_str()),
                ("table", self.definition.domain().table_name()),
            ],
        );

        let cursor: Box<dyn ResultCursor> = match &self.ordering {
            Some(ordering) if index.scan_type() != ScanType::IndexScan => {
                let mut rows = ResultData::new(cursor, index.scan_type(), String::new(), 0, None)
                    .collect_rows()?;
                ResultSorter::sort(&mut rows, ordering);
                Box::new(VecCursor::new(rows))
            }
            _ => cursor,
        };

        let (skip, limit) = if apply_limits {
            (self.skip, self.limit)
        } else {
            (0, None)
        };
        Ok(ResultData::new(
            cursor,
            index.scan_type(),
            index.name().to_string(),
            skip,
            limit,
        ))
    }

    fn key_lookup(
        &self,
        set: &CandidateSet,
        index: &CandidateIndex,
    ) -> QueryResult<Box<dyn ResultCursor>> {
        let table = self.definition.domain().table();
        let engine = |e| QueryError::engine(format!("Error reading '{}'", table.name), e);

        let mut op = self
            .store
            .key_lookup(&table.name, index.name())
            .map_err(engine)?;
        set_key_values(index, set.terms(), &self.context, op.as_mut())?;
        for column in &table.columns {
            op.get_value(&column.name).map_err(engine)?;
        }
        op.execute().map_err(engine)
    }

    fn index_scan(
        &self,
        set: &CandidateSet,
        index: &CandidateIndex,
    ) -> QueryResult<Box<dyn ResultCursor>> {
        let table = self.definition.domain().table();
        let engine = |e| QueryError::engine(format!("Error scanning '{}'", index.name()), e);

        // Planned first: too many IN terms must fail before the engine is touched.
        let bounds = plan_scan_bounds(index, &self.context, set.terms().len())?;

        let options = ScanOptions {
            ordered: self.ordering.is_some(),
            descending: matches!(
                self.ordering.as_ref().map(|o| o.direction),
                Some(SortDirection::Desc)
            ),
            multi_range: bounds.multi_range,
        };
        let mut op = self
            .store
            .index_scan(&table.name, index.name(), options)
            .map_err(engine)?;
        bounds.apply(op.as_mut()).map_err(engine)?;

        let residual = bounds.residual(set.terms());
        let filter = build_residual_filter(
            self.store.as_ref(),
            &table.name,
            &residual,
            &self.context,
            &self.metrics,
        )?;
        if let Some(filter) = &filter {
            op.set_interpreted_code(filter.code()?).map_err(engine)?;
        }
        for column in &table.columns {
            op.get_value(&column.name).map_err(engine)?;
        }
        op.execute().map_err(engine)
    }

    fn table_scan(&self, set: &CandidateSet) -> QueryResult<Box<dyn ResultCursor>> {
        let table = self.definition.domain().table();
        let engine = |e| QueryError::engine(format!("Error scanning '{}'", table.name), e);

        let mut op = self.store.table_scan(&table.name).map_err(engine)?;
        let terms: Vec<_> = set.terms().iter().collect();
        let filter = build_residual_filter(
            self.store.as_ref(),
            &table.name,
            &terms,
            &self.context,
            &self.metrics,
        )?;
        if let Some(filter) = &filter {
            op.set_interpreted_code(filter.code()?).map_err(engine)?;
        }
        for column in &table.columns {
            op.get_value(&column.name).map_err(engine)?;
        }
        op.execute().map_err(engine)
    }

    fn trace_selection(&self, index: &CandidateIndex) {
        if !self.definition.config().trace_index_selection {
            return;
        }
        log_event(
            Event::IndexSelected,
            &[
                ("index", index.name()),
                ("scan_type", index.scan_type().as_str()),
                ("score", &index.score().to_string()),
                ("table", self.definition.domain().table_name()),
            ],
        );
    }

    /// Counts and logs a failure by kind, then hands the result back.
    fn observe<T>(&self, result: QueryResult<T>) -> QueryResult<T> {
        if let Err(e) = &result {
            let code = e.code().code();
            match e.kind() {
                ErrorKind::User => {
                    self.metrics.increment_rejected();
                    log_event(
                        Event::QueryRejected,
                        &[("code", code), ("message", e.message())],
                    );
                }
                ErrorKind::Internal => {
                    log_event(
                        Event::PlannerInvariant,
                        &[("code", code), ("message", e.message())],
                    );
                }
                ErrorKind::Engine => {
                    log_event(Event::EngineFailure, &[("error", &e.to_string())]);
                }
                ErrorKind::Unsupported => {}
            }
        }
        result
    }
}
