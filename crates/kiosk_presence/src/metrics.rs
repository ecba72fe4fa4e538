//! Presence tracking counters.
//!
//! Lock-free atomics, single writer (the tracker task), any number of readers.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    // Event counters
    pub events_ingested: AtomicU64,
    pub events_discarded: AtomicU64,
    /// Events refused because the tracker queue was full
    pub events_dropped: AtomicU64,
    pub read_cycles: AtomicU64,

    // Lifecycle counters
    pub tags_created: AtomicU64,
    pub tags_restored: AtomicU64,
    pub tags_removed: AtomicU64,

    pub sweeps: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            events_ingested: AtomicU64::new(0),
            events_discarded: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            read_cycles: AtomicU64::new(0),
            tags_created: AtomicU64::new(0),
            tags_restored: AtomicU64::new(0),
            tags_removed: AtomicU64::new(0),
            sweeps: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_events_ingested(&self) {
        self.events_ingested.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_events_discarded(&self) {
        self.events_discarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_events_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_read_cycles(&self) {
        self.read_cycles.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_tags_created(&self) {
        self.tags_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_tags_restored(&self) {
        self.tags_restored.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_tags_removed(&self, count: u64) {
        self.tags_removed.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_sweeps(&self) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_ingested: self.events_ingested.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            read_cycles: self.read_cycles.load(Ordering::Relaxed),
            tags_created: self.tags_created.load(Ordering::Relaxed),
            tags_restored: self.tags_restored.load(Ordering::Relaxed),
            tags_removed: self.tags_removed.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_ingested: u64,
    pub events_discarded: u64,
    pub events_dropped: u64,
    pub read_cycles: u64,
    pub tags_created: u64,
    pub tags_restored: u64,
    pub tags_removed: u64,
    pub sweeps: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_metrics_counts() {
        let metrics = Metrics::new();
        metrics.inc_events_ingested();
        metrics.inc_events_ingested();
        metrics.inc_events_discarded();
        metrics.add_tags_removed(3);
        metrics.inc_sweeps();

        let snap = metrics.snapshot();
        assert_eq!(snap.events_ingested, 2);
        assert_eq!(snap.events_discarded, 1);
        assert_eq!(snap.tags_removed, 3);
        assert_eq!(snap.sweeps, 1);
        assert_eq!(snap.tags_created, 0);
    }
}
