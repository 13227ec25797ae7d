//! Candidate indexes
//!
//! One candidate per index of the table, with one column per index field.
//! An index covered by a composite field is scored both ways and keeps the
//! better reading.
//! Top-level terms mark the bounds they can supply on the columns of every
//! candidate; scoring then depends only on which terms exist, never on their
//! values, so the whole set is computed once per where clause.

use std::fmt;

use serde_json::Value;

use crate::query::{list_is_usable, BindingContext, DomainType, Field, Predicate};
use crate::store::{IndexKind, IndexMeta};

/// Score of a unique index whose every column has an equality
pub const UNIQUE_SCORE: u32 = 100;

/// Name reported for the table-scan sentinel
pub const NO_INDEX: &str = "none";

/// Access path of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanType {
    /// Point lookup on the primary key
    PrimaryKey,
    /// Point lookup on another unique index
    UniqueKey,
    /// Range scan on an ordered index
    IndexScan,
    /// Full table scan
    TableScan,
}

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::PrimaryKey => "PRIMARY_KEY",
            ScanType::UniqueKey => "UNIQUE_KEY",
            ScanType::IndexScan => "INDEX_SCAN",
            ScanType::TableScan => "TABLE_SCAN",
        }
    }

    pub fn is_key_lookup(&self) -> bool {
        matches!(self, ScanType::PrimaryKey | ScanType::UniqueKey)
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of index a candidate stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Unique,
    Ordered,
    /// Sentinel for "no usable index"
    TableScan,
}

/// Term that sets the value of a column: equality or IN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermRef {
    /// Position in the top-level term list
    pub term: usize,
    pub parameter: String,
}

/// Term that sets one side of a range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTerm {
    pub term: usize,
    pub parameter: String,
    pub strict: bool,
}

/// One field of a candidate index with the terms marked on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateColumn {
    pub field: String,
    /// Physical columns, more than one for a composite field
    pub columns: Vec<String>,
    pub equal: Option<TermRef>,
    pub in_term: Option<TermRef>,
    pub lower: Option<RangeTerm>,
    pub upper: Option<RangeTerm>,
}

impl CandidateColumn {
    fn new(field: &str, columns: Vec<String>) -> Self {
        Self {
            field: field.to_string(),
            columns,
            equal: None,
            in_term: None,
            lower: None,
            upper: None,
        }
    }

    pub fn is_composite(&self) -> bool {
        self.columns.len() > 1
    }

    fn usable<'a>(&self, value: Option<&'a Value>) -> Option<&'a Value> {
        match value? {
            Value::Null => None,
            Value::Array(items) if self.is_composite() => {
                let complete =
                    items.len() == self.columns.len() && items.iter().all(|v| !v.is_null());
                value.filter(|_| complete)
            }
            _ => value,
        }
    }

    /// Non-null value of the equality term
    pub fn equal_value<'a>(&self, context: &'a BindingContext) -> Option<&'a Value> {
        let term = self.equal.as_ref()?;
        self.usable(context.get(&term.parameter))
    }

    /// Values of the IN term, if non-empty and free of nulls
    pub fn in_values<'a>(&self, context: &'a BindingContext) -> Option<&'a [Value]> {
        let term = self.in_term.as_ref()?;
        let value = context.get(&term.parameter);
        if !list_is_usable(value) {
            return None;
        }
        value.and_then(Value::as_array).map(Vec::as_slice)
    }

    pub fn lower_value<'a>(&self, context: &'a BindingContext) -> Option<&'a Value> {
        let term = self.lower.as_ref()?;
        self.usable(context.get(&term.parameter))
    }

    pub fn upper_value<'a>(&self, context: &'a BindingContext) -> Option<&'a Value> {
        let term = self.upper.as_ref()?;
        self.usable(context.get(&term.parameter))
    }
}

/// Per-query evaluation of one index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateIndex {
    id: usize,
    name: String,
    kind: CandidateKind,
    columns: Vec<CandidateColumn>,
    field_score: u32,
    in_terms: usize,
    score: u32,
    scan_type: ScanType,
    multi_range: bool,
    last_lower: Option<usize>,
    last_upper: Option<usize>,
}

impl CandidateIndex {
    /// Candidate for `meta` read as `fields`; `id` orders candidates of
    /// equal score.
    pub fn new(id: usize, meta: &IndexMeta, fields: &[&Field]) -> Self {
        let field_score = match fields {
            [single] if single.is_composite() => single.columns().len() as u32,
            _ => 1,
        };
        let columns = fields
            .iter()
            .map(|f| CandidateColumn::new(f.name(), f.column_names()))
            .collect();
        let kind = match meta.kind {
            IndexKind::Unique => CandidateKind::Unique,
            IndexKind::Ordered => CandidateKind::Ordered,
        };
        Self {
            id,
            name: meta.name.clone(),
            kind,
            columns,
            field_score,
            in_terms: 0,
            score: 0,
            scan_type: ScanType::TableScan,
            multi_range: false,
            last_lower: None,
            last_upper: None,
        }
    }

    /// Sentinel standing for a full table scan
    pub fn table_scan() -> Self {
        Self {
            id: usize::MAX,
            name: NO_INDEX.to_string(),
            kind: CandidateKind::TableScan,
            columns: Vec::new(),
            field_score: 0,
            in_terms: 0,
            score: 0,
            scan_type: ScanType::TableScan,
            multi_range: false,
            last_lower: None,
            last_upper: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CandidateKind {
        self.kind
    }

    pub fn columns(&self) -> &[CandidateColumn] {
        &self.columns
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn scan_type(&self) -> ScanType {
        self.scan_type
    }

    /// Leading column carries an IN term
    pub fn is_multi_range(&self) -> bool {
        self.multi_range
    }

    /// Number of IN terms marked on any column
    pub fn in_terms(&self) -> usize {
        self.in_terms
    }

    /// Last column contributing a lower bound; only it may stay strict
    pub fn last_lower(&self) -> Option<usize> {
        self.last_lower
    }

    /// Last column contributing an upper bound; only it may stay strict
    pub fn last_upper(&self) -> Option<usize> {
        self.last_upper
    }

    pub fn is_unique(&self) -> bool {
        self.kind == CandidateKind::Unique
    }

    pub fn is_table_scan(&self) -> bool {
        self.kind == CandidateKind::TableScan
    }

    fn column_mut(&mut self, field: &str) -> Option<&mut CandidateColumn> {
        self.columns.iter_mut().find(|c| c.field == field)
    }

    pub fn mark_equal(&mut self, field: &str, term: usize, parameter: &str) {
        if let Some(column) = self.column_mut(field) {
            column.equal.get_or_insert_with(|| TermRef {
                term,
                parameter: parameter.to_string(),
            });
        }
    }

    pub fn mark_in(&mut self, field: &str, term: usize, parameter: &str) {
        if let Some(column) = self.column_mut(field) {
            column.in_term.get_or_insert_with(|| TermRef {
                term,
                parameter: parameter.to_string(),
            });
            self.in_terms += 1;
        }
    }

    pub fn mark_lower(&mut self, field: &str, term: usize, parameter: &str, strict: bool) {
        if let Some(column) = self.column_mut(field) {
            column.lower.get_or_insert_with(|| RangeTerm {
                term,
                parameter: parameter.to_string(),
                strict,
            });
        }
    }

    pub fn mark_upper(&mut self, field: &str, term: usize, parameter: &str, strict: bool) {
        if let Some(column) = self.column_mut(field) {
            column.upper.get_or_insert_with(|| RangeTerm {
                term,
                parameter: parameter.to_string(),
                strict,
            });
        }
    }

    /// A key lookup bypasses the filter, so every term must be a key column.
    pub fn supports_conditions_of_length(&self, term_count: usize) -> bool {
        match self.kind {
            CandidateKind::Unique => term_count == self.columns.len(),
            CandidateKind::Ordered => true,
            CandidateKind::TableScan => true,
        }
    }

    /// Computes the score from the marked terms.
    pub fn score_terms(&mut self, term_count: usize, primary_index_name: &str) {
        match self.kind {
            CandidateKind::Unique => self.score_unique(term_count, primary_index_name),
            CandidateKind::Ordered => self.score_ordered(),
            CandidateKind::TableScan => {}
        }
    }

    fn score_unique(&mut self, term_count: usize, primary_index_name: &str) {
        let covered = !self.columns.is_empty() && self.columns.iter().all(|c| c.equal.is_some());
        if covered && self.supports_conditions_of_length(term_count) {
            self.score = UNIQUE_SCORE;
            self.scan_type = if self.name == primary_index_name {
                ScanType::PrimaryKey
            } else {
                ScanType::UniqueKey
            };
        } else {
            self.score = 0;
        }
    }

    fn score_ordered(&mut self) {
        let mut lower_score = 0;
        let mut upper_score = 0;
        let mut lower_done = false;
        let mut upper_done = false;

        for (i, column) in self.columns.iter().enumerate() {
            if column.equal.is_some() || column.in_term.is_some() {
                if i == 0 && column.equal.is_none() {
                    self.multi_range = true;
                }
                if !lower_done {
                    lower_score += self.field_score;
                    self.last_lower = Some(i);
                }
                if !upper_done {
                    upper_score += self.field_score;
                    self.last_upper = Some(i);
                }
            } else {
                if !lower_done {
                    if column.lower.is_some() {
                        lower_score += self.field_score;
                        self.last_lower = Some(i);
                    } else {
                        lower_done = true;
                    }
                }
                if !upper_done {
                    if column.upper.is_some() {
                        upper_score += self.field_score;
                        self.last_upper = Some(i);
                    } else {
                        upper_done = true;
                    }
                }
            }
            if lower_done && upper_done {
                break;
            }
        }

        self.score = lower_score + upper_score;
        if self.score > 0 {
            self.scan_type = ScanType::IndexScan;
        }
    }
}

/// Scored candidates of one where clause
#[derive(Debug, Clone)]
pub struct CandidateSet {
    terms: Vec<Predicate>,
    where_clause: Option<Predicate>,
    unique: Option<CandidateIndex>,
    ordered: Vec<CandidateIndex>,
    table_scan: CandidateIndex,
}

impl CandidateSet {
    pub fn build(
        domain: &DomainType,
        where_clause: Option<&Predicate>,
        primary_index_name: &str,
    ) -> Self {
        let terms = where_clause
            .map(|p| p.top_level_terms())
            .unwrap_or_default();

        let mut views = Vec::new();
        for (id, meta) in domain.table().indexes.iter().enumerate() {
            for fields in domain.index_views(&meta.columns) {
                views.push(CandidateIndex::new(id, meta, &fields));
            }
        }

        for (i, term) in terms.iter().enumerate() {
            term.mark_bounds_for_candidate_indices(i, &mut views);
        }

        // One candidate per index: the best scoring view, the first on ties
        let mut candidates: Vec<CandidateIndex> = Vec::with_capacity(views.len());
        for mut view in views {
            view.score_terms(terms.len(), primary_index_name);
            match candidates.last_mut() {
                Some(last) if last.id == view.id => {
                    if view.score > last.score {
                        *last = view;
                    }
                }
                _ => candidates.push(view),
            }
        }

        let mut unique = None;
        let mut ordered = Vec::new();
        for candidate in candidates {
            if candidate.score == 0 {
                continue;
            }
            if candidate.is_unique() && unique.is_none() {
                unique = Some(candidate);
            } else {
                ordered.push(candidate);
            }
        }
        ordered.sort_by(|a, b| b.score.cmp(&a.score).then(a.id.cmp(&b.id)));

        Self {
            terms,
            where_clause: where_clause.cloned(),
            unique,
            ordered,
            table_scan: CandidateIndex::table_scan(),
        }
    }

    /// Top-level terms, in where-clause order
    pub fn terms(&self) -> &[Predicate] {
        &self.terms
    }

    pub fn where_clause(&self) -> Option<&Predicate> {
        self.where_clause.as_ref()
    }

    /// Fully covered unique index, if any
    pub fn unique(&self) -> Option<&CandidateIndex> {
        self.unique.as_ref()
    }

    /// Remaining candidates, best score first
    pub fn ordered(&self) -> &[CandidateIndex] {
        &self.ordered
    }

    pub fn table_scan(&self) -> &CandidateIndex {
        &self.table_scan
    }

    /// Candidate by index name
    pub fn find(&self, name: &str) -> Option<&CandidateIndex> {
        self.unique
            .iter()
            .chain(self.ordered.iter())
            .find(|c| c.name == name)
    }
}
