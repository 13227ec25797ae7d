//! Query results
//!
//! Forward-only and single pass. Skip and limit are applied while reading.

use crate::planner::ScanType;
use crate::store::{ResultCursor, ResultRow};

use super::errors::{QueryError, QueryResult};

/// Rows of one execution
pub struct ResultData {
    cursor: Box<dyn ResultCursor>,
    scan_type: ScanType,
    index_used: String,
    skip: u64,
    remaining: Option<u64>,
}

impl ResultData {
    pub(crate) fn new(
        cursor: Box<dyn ResultCursor>,
        scan_type: ScanType,
        index_used: String,
        skip: u64,
        limit: Option<u64>,
    ) -> Self {
        Self {
            cursor,
            scan_type,
            index_used,
            skip,
            remaining: limit,
        }
    }

    /// Access path that produced the rows
    pub fn scan_type(&self) -> ScanType {
        self.scan_type
    }

    pub fn index_used(&self) -> &str {
        &self.index_used
    }

    pub fn next(&mut self) -> QueryResult<Option<ResultRow>> {
        if self.remaining == Some(0) {
            return Ok(None);
        }
        loop {
            let row = self
                .cursor
                .next()
                .map_err(|e| QueryError::engine("Error reading result", e))?;
            let Some(row) = row else {
                return Ok(None);
            };
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
            return Ok(Some(row));
        }
    }

    /// Reads every remaining row
    pub fn collect_rows(mut self) -> QueryResult<Vec<ResultRow>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next()? {
            rows.push(row);
        }
        Ok(rows)
    }
}
