//! Tag records and point-in-time snapshots.

use chrono::{DateTime, Utc};
use kiosk_protocol::TagId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One tag believed present, or a copy of one that was reported removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    pub id: TagId,
    pub secondary_id: Option<String>,
    pub antenna: u8,
    /// First read of the current presence episode.
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Consecutive overdue sweeps since `last_seen` was refreshed.
    pub miss_count: u32,
    pub display_name: Option<String>,
}

impl TagRecord {
    pub(crate) fn first_detection(
        id: TagId,
        secondary_id: Option<String>,
        antenna: u8,
        now: DateTime<Utc>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            id,
            secondary_id,
            antenna,
            first_seen: now,
            last_seen: now,
            miss_count: 0,
            display_name,
        }
    }

    /// Later read of the same tag. Out-of-order timestamps never move `last_seen` back.
    pub(crate) fn refresh(&mut self, now: DateTime<Utc>) {
        if now > self.last_seen {
            self.last_seen = now;
        }
        self.miss_count = 0;
    }

    /// Display name, falling back to the raw id.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Immutable copy of the tracker's active and removed sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    /// Present tags, ordered by first detection.
    pub active: Vec<TagRecord>,
    /// Removed tags, in the order they were removed.
    pub removed: Vec<TagRecord>,
}

impl PresenceSnapshot {
    pub fn is_active(&self, id: &TagId) -> bool {
        self.active.iter().any(|r| &r.id == id)
    }

    pub fn is_removed(&self, id: &TagId) -> bool {
        self.removed.iter().any(|r| &r.id == id)
    }

    pub fn active_ids(&self) -> Vec<TagId> {
        self.active.iter().map(|r| r.id.clone()).collect()
    }

    pub fn removed_ids(&self) -> Vec<TagId> {
        self.removed.iter().map(|r| r.id.clone()).collect()
    }

    /// Changes from `previous` to `self`, for incremental rendering.
    pub fn diff(&self, previous: &PresenceSnapshot) -> SnapshotDiff {
        SnapshotDiff {
            appeared: ids_missing_from(&self.active, &previous.active),
            disappeared: ids_missing_from(&previous.active, &self.active),
            removed_added: ids_missing_from(&self.removed, &previous.removed),
            removed_cleared: ids_missing_from(&previous.removed, &self.removed),
        }
    }
}

/// Ids in `from` that are not in `other`, in `from` order.
fn ids_missing_from(from: &[TagRecord], other: &[TagRecord]) -> Vec<TagId> {
    let other: HashSet<&TagId> = other.iter().map(|r| &r.id).collect();
    from.iter()
        .filter(|r| !other.contains(&r.id))
        .map(|r| r.id.clone())
        .collect()
}

/// Id-level changes between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// Newly active.
    pub appeared: Vec<TagId>,
    /// No longer active (removed, or restored and then removed again).
    pub disappeared: Vec<TagId>,
    /// Newly in the removed set.
    pub removed_added: Vec<TagId>,
    /// Left the removed set because the tag was read again.
    pub removed_cleared: Vec<TagId>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.appeared.is_empty()
            && self.disappeared.is_empty()
            && self.removed_added.is_empty()
            && self.removed_cleared.is_empty()
    }
}
