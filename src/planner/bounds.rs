//! Bound setting
//!
//! Turns the chosen candidate and the bound values into engine calls:
//! key values for point lookups, per-column bounds for index scans (one
//! range per IN value when the leading column carries an IN term), and a
//! residual filter for every term the bounds do not enforce.
//!
//! Scan bounds are planned as plain data first, so every user error is
//! raised before the engine sees a single call.

use std::fmt;

use serde_json::Value;

use crate::observability::QueryMetrics;
use crate::query::{BindingContext, Predicate, QueryError, QueryResult};
use crate::store::{
    BoundType, FilterGroup, IndexScanOperation, InterpretedCode, KeyLookupOperation, ScanFilter,
    Store, StoreResult,
};

use super::candidate::{CandidateColumn, CandidateIndex};

/// Which sides of a range are closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundMask(u8);

impl BoundMask {
    pub const NONE: BoundMask = BoundMask(0);
    pub const LOWER: BoundMask = BoundMask(1);
    pub const UPPER: BoundMask = BoundMask(2);
    pub const BOTH: BoundMask = BoundMask(3);

    pub fn has_lower(self) -> bool {
        self.0 & Self::LOWER.0 != 0
    }

    pub fn has_upper(self) -> bool {
        self.0 & Self::UPPER.0 != 0
    }

    pub fn is_both(self) -> bool {
        self == Self::BOTH
    }

    pub fn union(self, other: BoundMask) -> BoundMask {
        BoundMask(self.0 | other.0)
    }

    /// Sides not in `self`
    pub fn complement(self) -> BoundMask {
        BoundMask(!self.0 & Self::BOTH.0)
    }
}

/// One `set_bound` call
#[derive(Debug, Clone, PartialEq)]
pub struct BoundCall {
    pub column: String,
    pub bound: BoundType,
    pub value: Value,
}

impl fmt::Display for BoundCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.bound, self.value)
    }
}

/// Planned bounds of an index scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanBounds {
    /// Bound calls per range; a single range unless multi-range
    pub ranges: Vec<Vec<BoundCall>>,
    /// Ranges are closed with `end_of_bound`
    pub multi_range: bool,
    /// Per top-level term: fully enforced by the bounds
    pub absorbed: Vec<bool>,
}

impl ScanBounds {
    /// Issues the planned calls
    pub fn apply(&self, op: &mut dyn IndexScanOperation) -> StoreResult<()> {
        for (range_no, calls) in self.ranges.iter().enumerate() {
            for call in calls {
                op.set_bound(&call.column, call.bound, &call.value)?;
            }
            if self.multi_range {
                op.end_of_bound(range_no as u32)?;
            }
        }
        Ok(())
    }

    /// Top-level terms the residual filter must still check
    pub fn residual<'a>(&self, terms: &'a [Predicate]) -> Vec<&'a Predicate> {
        terms
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.absorbed.get(*i).copied().unwrap_or(false))
            .map(|(_, t)| t)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.ranges.iter().map(Vec::len).sum()
    }
}

/// Sets the key of a point lookup, column by column in index order.
pub fn set_key_values(
    index: &CandidateIndex,
    terms: &[Predicate],
    context: &BindingContext,
    op: &mut dyn KeyLookupOperation,
) -> QueryResult<()> {
    for column in index.columns() {
        let term = column.equal.as_ref().ok_or_else(|| {
            QueryError::planner_invariant(format!(
                "key column '{}' of index '{}' has no equality term",
                column.field,
                index.name()
            ))
        })?;
        let predicate = terms.get(term.term).ok_or_else(|| {
            QueryError::planner_invariant(format!("term {} out of range", term.term))
        })?;
        predicate.operation_equal(context, op)?;
    }
    Ok(())
}

/// Per-term bookkeeping during a walk
struct Absorption {
    /// Sides each term expresses on this index
    needed: Vec<BoundMask>,
    /// Sides emitted faithfully behind an all-equality prefix
    covered: Vec<BoundMask>,
}

impl Absorption {
    fn new(index: &CandidateIndex, term_count: usize) -> Self {
        let mut needed = vec![BoundMask::NONE; term_count];
        let mut add = |term: usize, mask: BoundMask| {
            if let Some(slot) = needed.get_mut(term) {
                *slot = slot.union(mask);
            }
        };
        for column in index.columns() {
            if let Some(t) = &column.equal {
                add(t.term, BoundMask::BOTH);
            }
            if let Some(t) = &column.in_term {
                add(t.term, BoundMask::BOTH);
            }
            if let Some(t) = &column.lower {
                add(t.term, BoundMask::LOWER);
            }
            if let Some(t) = &column.upper {
                add(t.term, BoundMask::UPPER);
            }
        }
        Self {
            needed,
            covered: vec![BoundMask::NONE; term_count],
        }
    }

    fn cover(&mut self, term: usize, mask: BoundMask) {
        if let Some(slot) = self.covered.get_mut(term) {
            *slot = slot.union(mask);
        }
    }

    fn into_absorbed(self) -> Vec<bool> {
        self.needed
            .iter()
            .zip(&self.covered)
            .map(|(needed, covered)| *needed != BoundMask::NONE && needed == covered)
            .collect()
    }
}

/// Plans the bounds of an index scan.
///
/// Fails if the index carries more than one IN term and its leading column
/// is one of them.
pub fn plan_scan_bounds(
    index: &CandidateIndex,
    context: &BindingContext,
    term_count: usize,
) -> QueryResult<ScanBounds> {
    if index.is_multi_range() && index.in_terms() > 1 {
        return Err(QueryError::too_many_in_predicates(index.name()));
    }

    let mut absorption = Absorption::new(index, term_count);
    let leading_in = match index.columns().first() {
        Some(column) if index.is_multi_range() => column.in_values(context),
        _ => None,
    };

    let Some(values) = leading_in else {
        let mut calls = Vec::new();
        walk(index, context, None, &mut calls, Some(&mut absorption));
        return Ok(ScanBounds {
            ranges: vec![calls],
            multi_range: false,
            absorbed: absorption.into_absorbed(),
        });
    };

    let ranges = if index.columns().len() == 1 {
        expand_single_column(index, values, &mut absorption)
    } else {
        let mut ranges = Vec::with_capacity(values.len());
        for (i, value) in values.iter().enumerate() {
            let mut calls = Vec::new();
            let track = if i == 0 { Some(&mut absorption) } else { None };
            walk(index, context, Some(value), &mut calls, track);
            ranges.push(calls);
        }
        ranges
    };

    Ok(ScanBounds {
        ranges,
        multi_range: true,
        absorbed: absorption.into_absorbed(),
    })
}

/// One equality range per IN value on a single-column index
fn expand_single_column(
    index: &CandidateIndex,
    values: &[Value],
    absorption: &mut Absorption,
) -> Vec<Vec<BoundCall>> {
    let column = &index.columns()[0];
    if let Some(term) = &column.in_term {
        absorption.cover(term.term, BoundMask::BOTH);
    }
    values
        .iter()
        .map(|value| equality_calls(column, value, BoundType::Eq))
        .collect()
}

/// Bound calls for an equality on `column`, split per physical column for
/// composite fields.
fn equality_calls(column: &CandidateColumn, value: &Value, bound: BoundType) -> Vec<BoundCall> {
    if column.is_composite() {
        column
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| BoundCall {
                column: name.clone(),
                bound,
                value: value.get(i).cloned().unwrap_or(Value::Null),
            })
            .collect()
    } else {
        vec![BoundCall {
            column: column.columns[0].clone(),
            bound,
            value: value.clone(),
        }]
    }
}

/// Bound type an equality can still set given the closed sides
fn equality_bound(done: BoundMask) -> Option<(BoundType, BoundMask)> {
    match (done.has_lower(), done.has_upper()) {
        (false, false) => Some((BoundType::Eq, BoundMask::BOTH)),
        (true, false) => Some((BoundType::Le, BoundMask::UPPER)),
        (false, true) => Some((BoundType::Ge, BoundMask::LOWER)),
        (true, true) => None,
    }
}

/// Walks the columns once, threading the closed sides.
///
/// `in_value` replaces the leading column's terms with an equality on one IN
/// value. Sides a column does not set are closed for the rest of the walk.
fn walk(
    index: &CandidateIndex,
    context: &BindingContext,
    in_value: Option<&Value>,
    calls: &mut Vec<BoundCall>,
    mut absorption: Option<&mut Absorption>,
) {
    let mut done = BoundMask::NONE;
    let mut equal_prefix = true;

    for (i, column) in index.columns().iter().enumerate() {
        if done.is_both() {
            break;
        }

        let leading_in = if i == 0 { in_value } else { None };
        let (term, value) = match leading_in {
            Some(value) => (column.in_term.as_ref().map(|t| t.term), Some(value)),
            None => (
                column.equal.as_ref().map(|t| t.term),
                column.equal_value(context),
            ),
        };

        let set = if let (Some(value), Some((bound, mask))) = (value, equality_bound(done)) {
            calls.extend(equality_calls(column, value, bound));
            if let (Some(track), Some(term)) = (absorption.as_deref_mut(), term) {
                if equal_prefix && mask.is_both() {
                    track.cover(term, BoundMask::BOTH);
                }
            }
            mask
        } else {
            range_calls(index, i, column, context, done, equal_prefix, calls, &mut absorption)
        };

        equal_prefix = equal_prefix && set.is_both() && value.is_some();
        done = done.union(set.complement());
    }
}

/// Lower and upper bounds of a column without a usable equality
#[allow(clippy::too_many_arguments)]
fn range_calls(
    index: &CandidateIndex,
    position: usize,
    column: &CandidateColumn,
    context: &BindingContext,
    done: BoundMask,
    equal_prefix: bool,
    calls: &mut Vec<BoundCall>,
    absorption: &mut Option<&mut Absorption>,
) -> BoundMask {
    let mut set = BoundMask::NONE;

    if !done.has_lower() {
        if let (Some(term), Some(value)) = (&column.lower, column.lower_value(context)) {
            let keep_strict = index.last_lower() == Some(position);
            let bound = if term.strict && keep_strict {
                BoundType::Gt
            } else {
                BoundType::Ge
            };
            calls.extend(equality_calls(column, value, bound));
            set = set.union(BoundMask::LOWER);
            if let Some(track) = absorption.as_deref_mut() {
                if equal_prefix && (!term.strict || keep_strict) {
                    track.cover(term.term, BoundMask::LOWER);
                }
            }
        }
    }

    if !done.has_upper() {
        if let (Some(term), Some(value)) = (&column.upper, column.upper_value(context)) {
            let keep_strict = index.last_upper() == Some(position);
            let bound = if term.strict && keep_strict {
                BoundType::Lt
            } else {
                BoundType::Le
            };
            calls.extend(equality_calls(column, value, bound));
            // NULL sorts below every key: without a lower bound on this
            // column the scan still returns NULLs.
            let excludes_null = set.has_lower();
            set = set.union(BoundMask::UPPER);
            if let Some(track) = absorption.as_deref_mut() {
                if equal_prefix && excludes_null && (!term.strict || keep_strict) {
                    track.cover(term.term, BoundMask::UPPER);
                }
            }
        }
    }

    set
}

/// Server-side filter that is released exactly once, on every path
pub struct FilterGuard<'m> {
    filter: Box<dyn ScanFilter>,
    metrics: &'m QueryMetrics,
}

impl<'m> FilterGuard<'m> {
    fn new(filter: Box<dyn ScanFilter>, metrics: &'m QueryMetrics) -> Self {
        metrics.increment_filters_created();
        Self { filter, metrics }
    }

    pub fn code(&self) -> QueryResult<InterpretedCode> {
        self.filter
            .code()
            .map_err(|e| QueryError::engine("Error finishing filter", e))
    }
}

impl Drop for FilterGuard<'_> {
    fn drop(&mut self) {
        self.filter.release();
        self.metrics.increment_filters_released();
    }
}

/// Builds the residual filter: every term inside one root AND group.
///
/// Returns None when nothing is left to check.
pub fn build_residual_filter<'m>(
    store: &dyn Store,
    table: &str,
    terms: &[&Predicate],
    context: &BindingContext,
    metrics: &'m QueryMetrics,
) -> QueryResult<Option<FilterGuard<'m>>> {
    if terms.is_empty() {
        return Ok(None);
    }

    let filter = store
        .create_filter(table)
        .map_err(|e| QueryError::engine(format!("Error creating filter on '{}'", table), e))?;
    let mut guard = FilterGuard::new(filter, metrics);

    let wrap = |e| QueryError::engine("Error building residual filter", e);
    guard.filter.begin(FilterGroup::And).map_err(wrap)?;
    for term in terms {
        term.filter_cmp_value(context, guard.filter.as_mut())?;
    }
    guard.filter.end().map_err(wrap)?;

    Ok(Some(guard))
}
