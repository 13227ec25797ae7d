//! Session: entry point of the query layer

use std::sync::Arc;

use crate::config::QueryConfig;
use crate::observability::{MetricsSnapshot, QueryMetrics};
use crate::store::Store;

use super::definition::QueryDefinition;
use super::domain::DomainType;
use super::errors::{QueryError, QueryResult};
use super::execution::Query;

/// Binds a store, a configuration and the metrics of every query created
/// through it
pub struct Session {
    store: Arc<dyn Store>,
    config: QueryConfig,
    metrics: Arc<QueryMetrics>,
}

impl Session {
    pub fn new(store: Arc<dyn Store>, config: QueryConfig) -> Self {
        Self {
            store,
            config,
            metrics: Arc::new(QueryMetrics::new()),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Domain type of a table, one field per column
    pub fn domain_type(&self, table: &str) -> QueryResult<DomainType> {
        let meta = self
            .store
            .table(table)
            .map_err(|e| QueryError::engine(format!("Error loading table '{}'", table), e))?;
        Ok(DomainType::new(meta))
    }

    pub fn create_definition(&self, table: &str) -> QueryResult<QueryDefinition> {
        Ok(self.definition_for(self.domain_type(table)?))
    }

    /// Definition over a prepared domain type, composite fields included
    pub fn definition_for(&self, domain: DomainType) -> QueryDefinition {
        QueryDefinition::new(domain, self.config.clone())
    }

    pub fn create_query(&self, definition: &Arc<QueryDefinition>) -> Query {
        Query::new(
            Arc::clone(definition),
            Arc::clone(&self.store),
            Arc::clone(&self.metrics),
        )
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryErrorCode;
    use crate::store::{ColumnType, MemoryStore, TableMeta};
    use serde_json::json;

    fn session() -> Session {
        let store = MemoryStore::new();
        let table = TableMeta::builder("person")
            .column("id", ColumnType::Int)
            .nullable_column("name", ColumnType::String)
            .primary_key(&["id"])
            .build()
            .unwrap();
        store.create_table(table).unwrap();
        store.insert("person", json!({"id": 1, "name": "Ann"})).unwrap();
        Session::new(Arc::new(store), QueryConfig::default())
    }

    #[test]
    fn test_unknown_table() {
        let err = session().create_definition("nope").unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::CqEngineAccess);
        assert!(err.store_error().is_some());
    }

    #[test]
    fn test_queries_share_metrics() {
        let session = session();
        let mut def = session.create_definition("person").unwrap();
        let id = def.get("id").unwrap();
        def.where_clause(id.equal(&def.param("id"))).unwrap();
        let def = Arc::new(def);

        for id in [1, 2] {
            let mut query = session.create_query(&def);
            query.bind("id", json!(id)).unwrap();
            query.get_result_data().unwrap();
        }

        let snapshot = session.metrics();
        assert_eq!(snapshot.primary_key_lookups, 2);
        assert_eq!(snapshot.executions(), 2);
    }
}
