//! Best-index selection
//!
//! Runs per execution: scoring is fixed at prepare time, but whether an
//! index can actually bound a scan depends on the bound values and on the
//! requested ordering.

use crate::query::{BindingContext, Predicate};

use super::candidate::{CandidateIndex, CandidateKind, CandidateSet};

/// How well a candidate serves one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usability {
    Unusable,
    /// Unbounded scan that still delivers the requested order
    OrderingOnly,
    /// Leading column can set a bound
    Bounded,
}

/// True if `ordering` names the first fields of the index, in order.
pub fn supports_ordering(index: &CandidateIndex, ordering: &[String]) -> bool {
    ordering.len() <= index.columns().len()
        && ordering
            .iter()
            .zip(index.columns())
            .all(|(field, column)| *field == column.field)
}

/// True if every equality of a unique candidate has a non-null value
pub fn unique_is_usable(
    index: &CandidateIndex,
    terms: &[Predicate],
    context: &BindingContext,
) -> bool {
    !index.columns().is_empty()
        && index.columns().iter().all(|c| {
            c.equal
                .as_ref()
                .and_then(|t| terms.get(t.term))
                .is_some_and(|term| term.is_usable(context))
        })
}

/// Usability of an ordered (or degenerate unique) candidate
pub fn usability(
    index: &CandidateIndex,
    context: &BindingContext,
    ordering: Option<&[String]>,
) -> Usability {
    if let Some(fields) = ordering {
        if !supports_ordering(index, fields) {
            return Usability::Unusable;
        }
    }

    match index.kind() {
        CandidateKind::Unique => {
            if context.has_no_null_parameters() {
                Usability::Bounded
            } else {
                Usability::Unusable
            }
        }
        CandidateKind::Ordered => {
            let leading = &index.columns()[0];
            let can_bound = leading.equal_value(context).is_some()
                || (index.is_multi_range() && leading.in_values(context).is_some())
                || leading.lower_value(context).is_some()
                || leading.upper_value(context).is_some();
            if can_bound {
                Usability::Bounded
            } else if ordering.is_some() {
                Usability::OrderingOnly
            } else {
                Usability::Unusable
            }
        }
        CandidateKind::TableScan => Usability::Unusable,
    }
}

/// Picks the access path for one execution.
///
/// A usable unique holder wins outright. Otherwise the first bounded
/// candidate in score order wins; an ordering-only candidate is a last
/// resort when ordering was requested; else the table scan.
pub fn select<'a>(
    set: &'a CandidateSet,
    context: &BindingContext,
    ordering: Option<&[String]>,
) -> &'a CandidateIndex {
    if let Some(unique) = set.unique() {
        if unique_is_usable(unique, set.terms(), context) {
            return unique;
        }
    }

    let mut last_resort = None;
    for candidate in set.ordered() {
        match usability(candidate, context, ordering) {
            Usability::Bounded => return candidate,
            Usability::OrderingOnly => {
                last_resort.get_or_insert(candidate);
            }
            Usability::Unusable => {}
        }
    }

    last_resort.unwrap_or_else(|| set.table_scan())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::planner::ScanType;
    use crate::query::{DomainType, QueryDefinition};
    use crate::store::{ColumnType, TableMeta};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn definition() -> QueryDefinition {
        let table = TableMeta::builder("person")
            .column("id", ColumnType::Int)
            .nullable_column("age", ColumnType::Int)
            .nullable_column("name", ColumnType::String)
            .nullable_column("email", ColumnType::String)
            .primary_key(&["id"])
            .unique_index("idx_email", &["email"])
            .ordered_index("idx_age_name", &["age", "name"])
            .ordered_index("idx_name", &["name"])
            .build()
            .unwrap();
        QueryDefinition::new(DomainType::new(Arc::new(table)), QueryConfig::default())
    }

    fn ctx(pairs: &[(&str, Value)]) -> BindingContext {
        let mut ctx = BindingContext::new();
        for (name, value) in pairs {
            ctx.bind(*name, value.clone());
        }
        ctx
    }

    #[test]
    fn test_unique_wins_when_values_present() {
        let mut def = definition();
        let email = def.get("email").unwrap();
        def.where_clause(email.equal(&def.param("e"))).unwrap();
        let set = def.prepare();

        let chosen = select(set, &ctx(&[("e", json!("a@x"))]), None);
        assert_eq!(chosen.name(), "idx_email");
        assert_eq!(chosen.scan_type(), ScanType::UniqueKey);

        let chosen = select(set, &ctx(&[("e", Value::Null)]), None);
        assert_eq!(chosen.scan_type(), ScanType::TableScan);
    }

    #[test]
    fn test_highest_bounded_score_wins() {
        let mut def = definition();
        let age = def.get("age").unwrap();
        let name = def.get("name").unwrap();
        let pred = name
            .equal(&def.param("n"))
            .and(age.equal(&def.param("a")))
            .unwrap();
        def.where_clause(pred).unwrap();
        let set = def.prepare();

        let chosen = select(set, &ctx(&[("a", json!(30)), ("n", json!("X"))]), None);
        assert_eq!(chosen.name(), "idx_age_name");

        // age null: idx_age_name cannot bound, idx_name can
        let chosen = select(set, &ctx(&[("a", Value::Null), ("n", json!("X"))]), None);
        assert_eq!(chosen.name(), "idx_name");
    }

    #[test]
    fn test_ordering_only_is_last_resort() {
        let mut def = definition();
        let age = def.get("age").unwrap();
        def.where_clause(age.greater_than(&def.param("a"))).unwrap();
        let set = def.prepare();
        let null_age = ctx(&[("a", Value::Null)]);

        let ordering = vec!["age".to_string()];
        let chosen = select(set, &null_age, Some(&ordering));
        assert_eq!(chosen.name(), "idx_age_name");
        assert_eq!(usability(chosen, &null_age, Some(&ordering)), Usability::OrderingOnly);

        // without ordering the same candidate is dropped
        let chosen = select(set, &null_age, None);
        assert!(chosen.is_table_scan());
    }

    #[test]
    fn test_ordering_must_be_index_prefix() {
        let mut def = definition();
        let age = def.get("age").unwrap();
        def.where_clause(age.greater_than(&def.param("a"))).unwrap();
        let set = def.prepare();
        let index = set.find("idx_age_name").unwrap();

        assert!(supports_ordering(index, &["age".to_string(), "name".to_string()]));
        assert!(!supports_ordering(index, &["name".to_string()]));
        assert!(!supports_ordering(
            index,
            &["age".to_string(), "name".to_string(), "id".to_string()]
        ));

        let bound = ctx(&[("a", json!(1))]);
        let by_name = vec!["name".to_string()];
        assert_eq!(usability(index, &bound, Some(&by_name)), Usability::Unusable);
        assert!(select(set, &bound, Some(&by_name)).is_table_scan());
    }

    #[test]
    fn test_in_list_usability() {
        let mut def = definition();
        let age = def.get("age").unwrap();
        def.where_clause(age.in_values(&def.param("ages"))).unwrap();
        let set = def.prepare();

        assert_eq!(
            select(set, &ctx(&[("ages", json!([30, 40]))]), None).name(),
            "idx_age_name"
        );
        assert!(select(set, &ctx(&[("ages", json!([]))]), None).is_table_scan());
        assert!(select(set, &ctx(&[("ages", json!([30, null]))]), None).is_table_scan());
    }
}
