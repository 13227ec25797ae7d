//! Explain output
//!
//! Describes the access path an execution would take, without touching the
//! engine.

use std::collections::BTreeMap;
use std::fmt;

use crate::query::{BindingContext, QueryResult};

use super::bounds::plan_scan_bounds;
use super::candidate::{CandidateIndex, CandidateSet, ScanType};

pub const SCAN_TYPE_KEY: &str = "ScanType";
pub const INDEX_USED_KEY: &str = "IndexUsed";

/// Explain plan output
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainPlan {
    pub scan_type: ScanType,
    /// Index name, `none` for a table scan
    pub index_used: String,
    pub score: u32,
    pub multi_range: bool,
    /// Bound calls, one line per call, prefixed by range for multi-range scans
    pub bounds: Vec<String>,
    /// Terms left to the server-side filter
    pub filter: Vec<String>,
    /// Requested ordering, if any
    pub ordering: Option<String>,
}

impl ExplainPlan {
    pub fn describe(
        set: &CandidateSet,
        index: &CandidateIndex,
        context: &BindingContext,
        ordering: Option<String>,
    ) -> QueryResult<Self> {
        let mut bounds = Vec::new();
        let mut filter = Vec::new();
        let mut multi_range = false;

        match index.scan_type() {
            ScanType::PrimaryKey | ScanType::UniqueKey => {
                for column in index.columns() {
                    if let Some(term) = column.equal.as_ref() {
                        bounds.push(format!("{} = :{}", column.field, term.parameter));
                    }
                }
            }
            ScanType::IndexScan => {
                let planned = plan_scan_bounds(index, context, set.terms().len())?;
                multi_range = planned.multi_range;
                for (range_no, calls) in planned.ranges.iter().enumerate() {
                    for call in calls {
                        if planned.multi_range {
                            bounds.push(format!("[{}] {}", range_no, call));
                        } else {
                            bounds.push(call.to_string());
                        }
                    }
                }
                filter = planned
                    .residual(set.terms())
                    .iter()
                    .map(|t| t.to_string())
                    .collect();
            }
            ScanType::TableScan => {
                filter = set.terms().iter().map(|t| t.to_string()).collect();
            }
        }

        Ok(Self {
            scan_type: index.scan_type(),
            index_used: index.name().to_string(),
            score: index.score(),
            multi_range,
            bounds,
            filter,
            ordering,
        })
    }

    /// The diagnostic map: access path and index name
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(SCAN_TYPE_KEY.to_string(), self.scan_type.as_str().to_string());
        map.insert(INDEX_USED_KEY.to_string(), self.index_used.clone());
        map
    }
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN PLAN ===")?;
        writeln!(f, "Scan Type: {}", self.scan_type)?;
        writeln!(f, "Index: {}", self.index_used)?;
        if !self.scan_type.is_key_lookup() && self.scan_type != ScanType::TableScan {
            writeln!(f, "Score: {}", self.score)?;
        }
        if self.multi_range {
            writeln!(f, "Multi-Range: yes")?;
        }
        if !self.bounds.is_empty() {
            writeln!(f, "Bounds:")?;
            for bound in &self.bounds {
                writeln!(f, "  - {}", bound)?;
            }
        }
        if !self.filter.is_empty() {
            writeln!(f, "Filter:")?;
            for term in &self.filter {
                writeln!(f, "  - {}", term)?;
            }
        }
        if let Some(ordering) = &self.ordering {
            writeln!(f, "Ordering: {}", ordering)?;
        }
        Ok(())
    }
}
