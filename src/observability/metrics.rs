//! Query counters
//!
//! Counters only, monotonic, relaxed atomics.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::planner::ScanType;

/// Counters shared by every query of a session
#[derive(Debug, Default)]
pub struct QueryMetrics {
    primary_key_lookups: AtomicU64,
    unique_key_lookups: AtomicU64,
    index_scans: AtomicU64,
    table_scans: AtomicU64,
    queries_rejected: AtomicU64,
    filters_created: AtomicU64,
    filters_released: AtomicU64,
}

/// Point-in-time copy of [`QueryMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub primary_key_lookups: u64,
    pub unique_key_lookups: u64,
    pub index_scans: u64,
    pub table_scans: u64,
    pub queries_rejected: u64,
    pub filters_created: u64,
    pub filters_released: u64,
}

impl MetricsSnapshot {
    /// Total executions across all access paths
    pub fn executions(&self) -> u64 {
        self.primary_key_lookups + self.unique_key_lookups + self.index_scans + self.table_scans
    }
}

impl QueryMetrics {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one execution on the given access path
    pub fn record_execution(&self, scan_type: ScanType) {
        let counter = match scan_type {
            ScanType::PrimaryKey => &self.primary_key_lookups,
            ScanType::UniqueKey => &self.unique_key_lookups,
            ScanType::IndexScan => &self.index_scans,
            ScanType::TableScan => &self.table_scans,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_filters_created(&self) {
        self.filters_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_filters_released(&self) {
        self.filters_released.fetch_add(1, Ordering::Relaxed);
    }

    /// Filters created but not yet released
    pub fn open_filters(&self) -> u64 {
        let created = self.filters_created.load(Ordering::Relaxed);
        let released = self.filters_released.load(Ordering::Relaxed);
        created.saturating_sub(released)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            primary_key_lookups: self.primary_key_lookups.load(Ordering::Relaxed),
            unique_key_lookups: self.unique_key_lookups.load(Ordering::Relaxed),
            index_scans: self.index_scans.load(Ordering::Relaxed),
            table_scans: self.table_scans.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
            filters_created: self.filters_created.load(Ordering::Relaxed),
            filters_released: self.filters_released.load(Ordering::Relaxed),
        }
    }
}
