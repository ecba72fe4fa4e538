//! Presence Tracker
//!
//! Two-stage debounce:
//! - a sweep counts one *miss* for every tag whose last read is at least
//!   `miss_threshold` old, and clears the count for every tag read more recently;
//! - a tag whose miss count reaches `max_miss_count` leaves the active set and
//!   is appended to the removed set.
//!
//! A read always wins: it refreshes the record, zeroes its miss count and pulls
//! the id back out of the removed set in the same step.
//!
//! The tracker is plain data with `&mut self` methods. It is not shared between
//! threads; [`crate::service`] owns it on one task and feeds it over a channel.

use crate::catalog::NameResolver;
use crate::metrics::METRICS;
use crate::record::{PresenceSnapshot, TagRecord};
use chrono::{DateTime, Utc};
use kiosk_protocol::defaults::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_MISS_COUNT, DEFAULT_MISS_THRESHOLD_SECS,
    DEFAULT_SWEEP_INTERVAL_SECS,
};
use kiosk_protocol::{ProtocolError, TagId, TagSeenEvent, TrackerSection};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Tracker configuration (plain data)
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Age of the last read that counts as one miss
    pub miss_threshold: Duration,
    /// Consecutive misses before removal (at least 1)
    pub max_miss_count: u32,
    /// Sweep cadence used by the tracker service
    pub sweep_interval: Duration,
    /// Bound on queued events in the tracker service
    pub channel_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            miss_threshold: Duration::from_secs_f64(DEFAULT_MISS_THRESHOLD_SECS),
            max_miss_count: DEFAULT_MAX_MISS_COUNT,
            sweep_interval: Duration::from_secs_f64(DEFAULT_SWEEP_INTERVAL_SECS),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl TrackerConfig {
    pub fn new(miss_threshold: Duration, max_miss_count: u32, sweep_interval: Duration) -> Self {
        Self {
            miss_threshold,
            max_miss_count: max_miss_count.max(1),
            sweep_interval,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn from_section(section: &TrackerSection) -> Result<Self, ProtocolError> {
        let seconds = |name: &str, value: f64| {
            Duration::try_from_secs_f64(value)
                .ok()
                .filter(|d| !d.is_zero())
                .ok_or_else(|| {
                    ProtocolError::config(format!("tracker.{} must be positive, got {}", name, value))
                })
        };

        Ok(Self {
            miss_threshold: seconds("miss_threshold_secs", section.miss_threshold_secs)?,
            max_miss_count: section.max_miss_count.max(1),
            sweep_interval: seconds("sweep_interval_secs", section.sweep_interval_secs)?,
            channel_capacity: section.channel_capacity.max(1),
        })
    }

    /// Shortest absence that can get a tag removed when sweeping every `miss_threshold`.
    pub fn removal_window(&self) -> Duration {
        self.miss_threshold * self.max_miss_count
    }
}

/// Why a read was dropped without touching state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Reader reported the read as failed
    NonSuccessResult(i32),
    /// Id is empty or whitespace
    EmptyId,
}

/// What a single read did to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First read of a tag that was neither active nor removed
    Created,
    /// Read of an already active tag
    Refreshed,
    /// Read of a removed tag; it is active again with a fresh record
    Restored,
    Discarded(DiscardReason),
}

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// False when the sweep was skipped because `now` did not advance
    pub performed: bool,
    /// Active tags examined
    pub examined: usize,
    /// Active tags that took a miss this sweep (including removed ones)
    pub missed: usize,
    /// Tags moved to the removed set, oldest read first
    pub removed: Vec<TagId>,
}

/// The presence state machine.
pub struct PresenceTracker {
    config: TrackerConfig,
    resolver: Arc<dyn NameResolver>,
    active: HashMap<TagId, TagRecord>,
    removed: Vec<TagRecord>,
    last_sweep: Option<DateTime<Utc>>,
}

impl PresenceTracker {
    pub fn new(config: TrackerConfig, resolver: Arc<dyn NameResolver>) -> Self {
        Self {
            config,
            resolver,
            active: HashMap::new(),
            removed: Vec::new(),
            last_sweep: None,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Ingest a read at the time carried by the event.
    pub fn ingest(&mut self, event: &TagSeenEvent) -> IngestOutcome {
        self.ingest_at(event, event.timestamp)
    }

    /// Ingest a read observed at `now`.
    pub fn ingest_at(&mut self, event: &TagSeenEvent, now: DateTime<Utc>) -> IngestOutcome {
        if !event.is_success() {
            METRICS.inc_events_discarded();
            return IngestOutcome::Discarded(DiscardReason::NonSuccessResult(event.result_code));
        }
        if event.id.is_blank() {
            METRICS.inc_events_discarded();
            return IngestOutcome::Discarded(DiscardReason::EmptyId);
        }
        METRICS.inc_events_ingested();

        let was_removed = self.take_removed(&event.id);

        if let Some(record) = self.active.get_mut(&event.id) {
            record.refresh(now);
            return IngestOutcome::Refreshed;
        }

        let display_name = self.resolver.resolve(&event.id);
        let record = TagRecord::first_detection(
            event.id.clone(),
            event.secondary_id.clone(),
            event.antenna,
            now,
            display_name,
        );
        self.active.insert(event.id.clone(), record);

        if was_removed {
            METRICS.inc_tags_restored();
            info!("Tag {} read again, no longer removed", event.id);
            IngestOutcome::Restored
        } else {
            METRICS.inc_tags_created();
            debug!("Tag {} detected on antenna {}", event.id, event.antenna);
            IngestOutcome::Created
        }
    }

    fn take_removed(&mut self, id: &TagId) -> bool {
        match self.removed.iter().position(|r| &r.id == id) {
            Some(index) => {
                self.removed.remove(index);
                true
            }
            None => false,
        }
    }

    /// Re-evaluate every active tag at `now`.
    ///
    /// Repeating a sweep at the same (or an earlier) `now` is a no-op, so a
    /// doubled timer tick cannot double-count a miss.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> SweepReport {
        if matches!(self.last_sweep, Some(last) if now <= last) {
            return SweepReport::default();
        }
        self.last_sweep = Some(now);
        METRICS.inc_sweeps();

        let threshold = self.config.miss_threshold;
        let max_miss_count = self.config.max_miss_count;
        let mut report = SweepReport {
            performed: true,
            examined: self.active.len(),
            ..SweepReport::default()
        };

        let mut expired: Vec<(DateTime<Utc>, TagId)> = Vec::new();
        for record in self.active.values_mut() {
            // A read stamped after `now` is not overdue.
            let overdue = now
                .signed_duration_since(record.last_seen)
                .to_std()
                .map(|gap| gap >= threshold)
                .unwrap_or(false);

            if !overdue {
                record.miss_count = 0;
                continue;
            }

            record.miss_count += 1;
            report.missed += 1;
            if record.miss_count >= max_miss_count {
                expired.push((record.last_seen, record.id.clone()));
            }
        }

        expired.sort();
        for (_, id) in expired {
            let Some(record) = self.active.remove(&id) else {
                continue;
            };
            info!(
                "Tag {} removed after {} misses (last seen {})",
                record.label(),
                record.miss_count,
                record.last_seen.to_rfc3339()
            );
            if !self.removed.iter().any(|r| r.id == id) {
                self.removed.push(record);
            }
            report.removed.push(id);
        }

        METRICS.add_tags_removed(report.removed.len() as u64);
        report
    }

    /// Copy of both sets. Active tags are ordered by first detection, then id.
    pub fn observe(&self) -> PresenceSnapshot {
        let mut active: Vec<TagRecord> = self.active.values().cloned().collect();
        active.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then_with(|| a.id.cmp(&b.id)));
        PresenceSnapshot {
            active,
            removed: self.removed.clone(),
        }
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn removed_len(&self) -> usize {
        self.removed.len()
    }

    /// Miss count of an active tag.
    pub fn miss_count(&self, id: &TagId) -> Option<u32> {
        self.active.get(id).map(|r| r.miss_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, NoCatalog};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn t(secs: f64) -> DateTime<Utc> {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        base + ChronoDuration::milliseconds((secs * 1000.0) as i64)
    }

    fn tracker(threshold_secs: u64, max_miss: u32) -> PresenceTracker {
        PresenceTracker::new(
            TrackerConfig::new(
                Duration::from_secs(threshold_secs),
                max_miss,
                Duration::from_secs(1),
            ),
            Arc::new(NoCatalog),
        )
    }

    fn seen(id: &str, at: f64) -> TagSeenEvent {
        TagSeenEvent::new(id, 1, t(at))
    }

    #[test]
    fn test_failed_read_is_discarded() {
        let mut tracker = tracker(2, 2);
        let outcome = tracker.ingest(&seen("A", 0.0).with_result_code(5));
        assert_eq!(
            outcome,
            IngestOutcome::Discarded(DiscardReason::NonSuccessResult(5))
        );
        assert_eq!(tracker.active_len(), 0);
    }

    #[test]
    fn test_blank_id_is_discarded() {
        let mut tracker = tracker(2, 2);
        let outcome = tracker.ingest(&seen("   ", 0.0));
        assert_eq!(outcome, IngestOutcome::Discarded(DiscardReason::EmptyId));
        assert_eq!(tracker.active_len(), 0);
    }

    #[test]
    fn test_repeat_reads_refresh_single_record() {
        let mut tracker = tracker(2, 2);
        assert_eq!(tracker.ingest(&seen("A", 0.0)), IngestOutcome::Created);
        assert_eq!(tracker.ingest(&seen("A", 0.5)), IngestOutcome::Refreshed);
        assert_eq!(tracker.ingest(&seen("A", 1.0)), IngestOutcome::Refreshed);

        let snapshot = tracker.observe();
        assert_eq!(snapshot.active.len(), 1);
        assert_eq!(snapshot.active[0].first_seen, t(0.0));
        assert_eq!(snapshot.active[0].last_seen, t(1.0));
    }

    #[test]
    fn test_removal_timeline() {
        // threshold=2s, max_miss=2, sweep every second, tag read once at t=0
        let mut tracker = tracker(2, 2);
        let a = TagId::from("A");
        tracker.ingest(&seen("A", 0.0));

        tracker.sweep(t(1.0));
        assert_eq!(tracker.miss_count(&a), Some(0));

        tracker.sweep(t(2.0));
        assert_eq!(tracker.miss_count(&a), Some(1));
        assert!(tracker.observe().removed.is_empty());

        let report = tracker.sweep(t(3.0));
        assert_eq!(report.removed, vec![a.clone()]);
        let snapshot = tracker.observe();
        assert!(snapshot.active.is_empty());
        assert_eq!(snapshot.removed_ids(), vec![a.clone()]);
        assert_eq!(snapshot.removed[0].miss_count, 2);
    }

    #[test]
    fn test_reread_between_sweeps_keeps_tag() {
        let mut tracker = tracker(2, 2);
        let b = TagId::from("B");
        tracker.ingest(&seen("B", 0.0));
        tracker.ingest(&seen("B", 1.5));

        tracker.sweep(t(2.0));
        assert_eq!(tracker.miss_count(&b), Some(0));
        tracker.sweep(t(3.0));
        assert_eq!(tracker.miss_count(&b), Some(0));
        assert!(tracker.observe().removed.is_empty());
    }

    #[test]
    fn test_sweep_is_idempotent_for_same_now() {
        let mut tracker = tracker(2, 3);
        let a = TagId::from("A");
        tracker.ingest(&seen("A", 0.0));

        let first = tracker.sweep(t(2.5));
        assert!(first.performed);
        assert_eq!(tracker.miss_count(&a), Some(1));

        let second = tracker.sweep(t(2.5));
        assert!(!second.performed);
        assert_eq!(tracker.miss_count(&a), Some(1));

        // Earlier timestamps are ignored as well.
        tracker.sweep(t(2.0));
        assert_eq!(tracker.miss_count(&a), Some(1));
    }

    #[test]
    fn test_recent_read_resets_misses() {
        let mut tracker = tracker(2, 3);
        let a = TagId::from("A");
        tracker.ingest(&seen("A", 0.0));
        tracker.sweep(t(2.0));
        tracker.sweep(t(3.0));
        assert_eq!(tracker.miss_count(&a), Some(2));

        tracker.ingest(&seen("A", 3.2));
        assert_eq!(tracker.miss_count(&a), Some(0));
        tracker.sweep(t(4.0));
        assert_eq!(tracker.miss_count(&a), Some(0));
    }

    #[test]
    fn test_read_after_removal_restores_tag() {
        let mut tracker = tracker(2, 2);
        let a = TagId::from("A");
        tracker.ingest(&seen("A", 0.0));
        tracker.sweep(t(2.0));
        tracker.sweep(t(3.0));
        assert!(tracker.observe().is_removed(&a));

        assert_eq!(tracker.ingest(&seen("A", 3.5)), IngestOutcome::Restored);
        let snapshot = tracker.observe();
        assert!(snapshot.is_active(&a));
        assert!(!snapshot.is_removed(&a));
        assert_eq!(snapshot.active[0].miss_count, 0);
        assert_eq!(snapshot.active[0].first_seen, t(3.5));
    }

    #[test]
    fn test_removed_set_keeps_removal_order() {
        let mut tracker = tracker(2, 1);
        tracker.ingest(&seen("late", 1.0));
        tracker.ingest(&seen("early", 0.0));
        tracker.ingest(&seen("later", 5.0));

        tracker.sweep(t(3.0));
        tracker.sweep(t(7.0));

        let removed = tracker.observe().removed_ids();
        assert_eq!(
            removed,
            vec![TagId::from("early"), TagId::from("late"), TagId::from("later")]
        );
    }

    #[test]
    fn test_display_name_resolved_on_first_detection() {
        let catalog = Catalog::from_json_str(
            r#"[{ "id": 1, "tagCode": "A", "product": { "id": 1, "name": "Cola" } }]"#,
        )
        .unwrap();
        let mut tracker = PresenceTracker::new(TrackerConfig::default(), Arc::new(catalog));

        tracker.ingest(&seen("A", 0.0));
        tracker.ingest(&seen("B", 0.0));

        let snapshot = tracker.observe();
        let a = snapshot.active.iter().find(|r| r.id.as_str() == "A").unwrap();
        let b = snapshot.active.iter().find(|r| r.id.as_str() == "B").unwrap();
        assert_eq!(a.display_name.as_deref(), Some("Cola"));
        assert!(b.display_name.is_none());
    }

    #[test]
    fn test_config_from_section() {
        let section = TrackerSection {
            miss_threshold_secs: 2.0,
            max_miss_count: 0,
            sweep_interval_secs: 0.5,
            channel_capacity: 0,
        };
        let config = TrackerConfig::from_section(&section).unwrap();
        assert_eq!(config.miss_threshold, Duration::from_secs(2));
        assert_eq!(config.max_miss_count, 1);
        assert_eq!(config.sweep_interval, Duration::from_millis(500));
        assert_eq!(config.channel_capacity, 1);

        let bad = TrackerSection {
            miss_threshold_secs: -1.0,
            ..section
        };
        assert!(TrackerConfig::from_section(&bad).is_err());
    }

    #[test]
    fn test_removal_window() {
        let config = TrackerConfig::new(Duration::from_secs(2), 3, Duration::from_secs(1));
        assert_eq!(config.removal_window(), Duration::from_secs(6));
    }
}
