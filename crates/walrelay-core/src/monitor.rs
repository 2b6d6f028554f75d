use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Counter sink notified for every event the filter drops.
pub trait Monitor: Send + Sync {
    fn inc_filter_skipped_events(&self, table: &str);
}

/// Monitor that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl Monitor for NoopMonitor {
    fn inc_filter_skipped_events(&self, _table: &str) {}
}

/// In-memory per-table skip counter.
#[derive(Debug, Default)]
pub struct SkipCounter {
    counts: Mutex<HashMap<String, u64>>,
}

impl SkipCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skipped events recorded for a table.
    pub fn get(&self, table: &str) -> u64 {
        self.lock().get(table).copied().unwrap_or(0)
    }

    /// Skipped events across all tables.
    pub fn total(&self) -> u64 {
        self.lock().values().sum()
    }

    /// Per-table counts, sorted by table name.
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let mut counts: Vec<_> = self
            .lock()
            .iter()
            .map(|(table, count)| (table.clone(), *count))
            .collect();
        counts.sort();
        counts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Monitor for SkipCounter {
    fn inc_filter_skipped_events(&self, table: &str) {
        *self.lock().entry(table.to_string()).or_insert(0) += 1;
    }
}
