//! Domain types: a table plus named fields
//!
//! Every column is a field of the same name. A composite field is one more
//! name over several columns; its values are arrays in column order.

use std::sync::Arc;

use crate::store::{ColumnMeta, ColumnType, TableMeta};

use super::errors::{QueryError, QueryResult};

/// A named field backed by one or more columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    columns: Vec<ColumnMeta>,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn is_composite(&self) -> bool {
        self.columns.len() > 1
    }

    /// Type of the first column; the only column unless composite
    pub fn column_type(&self) -> ColumnType {
        self.columns[0].column_type
    }
}

/// A table seen through its fields
#[derive(Debug, Clone)]
pub struct DomainType {
    table: Arc<TableMeta>,
    fields: Vec<Field>,
}

impl DomainType {
    pub fn new(table: Arc<TableMeta>) -> Self {
        let fields = table
            .columns
            .iter()
            .map(|c| Field {
                name: c.name.clone(),
                columns: vec![c.clone()],
            })
            .collect();
        Self { table, fields }
    }

    /// Adds a composite field over `columns`, in that order.
    pub fn with_composite_field(mut self, name: &str, columns: &[&str]) -> QueryResult<Self> {
        if columns.len() < 2 {
            return Err(QueryError::invalid_domain(format!(
                "composite field '{}' needs at least two columns",
                name
            )));
        }
        if self.field(name).is_some() {
            return Err(QueryError::invalid_domain(format!(
                "field '{}' already defined on '{}'",
                name, self.table.name
            )));
        }
        let mut metas = Vec::with_capacity(columns.len());
        for column in columns {
            let meta = self
                .table
                .column(column)
                .ok_or_else(|| QueryError::unknown_field(&self.table.name, column))?;
            metas.push(meta.clone());
        }
        self.fields.push(Field {
            name: name.to_string(),
            columns: metas,
        });
        Ok(self)
    }

    pub fn table(&self) -> &TableMeta {
        &self.table
    }

    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn require_field(&self, name: &str) -> QueryResult<&Field> {
        self.field(name)
            .ok_or_else(|| QueryError::unknown_field(&self.table.name, name))
    }

    /// Ways to read the key of an index as fields, in index order.
    ///
    /// Each column maps to its own field. An index whose columns are exactly
    /// one composite field also maps to that single field, listed first.
    pub fn index_views(&self, index_columns: &[String]) -> Vec<Vec<&Field>> {
        let per_column: Vec<&Field> = index_columns
            .iter()
            .filter_map(|column| {
                self.fields
                    .iter()
                    .find(|f| !f.is_composite() && f.columns[0].name == *column)
            })
            .collect();
        match self
            .fields
            .iter()
            .find(|f| f.is_composite() && f.columns.iter().map(|c| &c.name).eq(index_columns))
        {
            Some(composite) => vec![vec![composite], per_column],
            None => vec![per_column],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryErrorCode;

    fn account() -> DomainType {
        let table = TableMeta::builder("account")
            .column("id", ColumnType::Int)
            .column("region", ColumnType::String)
            .column("number", ColumnType::Int)
            .nullable_column("owner", ColumnType::String)
            .primary_key(&["id"])
            .ordered_index("idx_region_number", &["region", "number"])
            .build()
            .unwrap();
        DomainType::new(Arc::new(table))
    }

    #[test]
    fn test_default_fields_follow_columns() {
        let domain = account();
        assert_eq!(domain.fields().len(), 4);
        assert_eq!(domain.field("owner").unwrap().column_type(), ColumnType::String);
        assert!(domain.field("missing").is_none());
    }

    #[test]
    fn test_index_views_composite_first() {
        fn names(view: &[&Field]) -> Vec<String> {
            view.iter().map(|f| f.name().to_string()).collect()
        }
        let plain = account();
        let columns = vec!["region".to_string(), "number".to_string()];
        let views = plain.index_views(&columns);
        assert_eq!(views.len(), 1);
        assert_eq!(names(&views[0]), vec!["region", "number"]);

        let composite = account()
            .with_composite_field("code", &["region", "number"])
            .unwrap();
        let views = composite.index_views(&columns);
        assert_eq!(views.len(), 2);
        assert_eq!(names(&views[0]), vec!["code"]);
        assert!(views[0][0].is_composite());
        assert_eq!(names(&views[1]), vec!["region", "number"]);

        // a prefix of the composite columns is not the composite field
        let views = composite.index_views(&columns[..1]);
        assert_eq!(views.len(), 1);
        assert_eq!(names(&views[0]), vec!["region"]);
    }

    #[test]
    fn test_composite_field_validation() {
        let err = account().with_composite_field("code", &["region"]).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::CqInvalidDomain);

        let err = account().with_composite_field("owner", &["region", "number"]).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::CqInvalidDomain);

        let err = account().with_composite_field("code", &["region", "x"]).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::CqUnknownField);
    }
}
