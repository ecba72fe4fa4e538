//! Kiosk presence tracking
//!
//! Turns a bursty, lossy stream of tag reads into a debounced view of which
//! tags are present and which have been taken away.
//!
//! - [`tracker::PresenceTracker`]: the synchronous state machine (ingest / sweep / observe)
//! - [`service`]: single-owner task that feeds the tracker from a bounded channel
//!   and sweeps it on a fixed cadence
//! - [`catalog`]: display-name lookup from the product catalog
//! - [`record`]: tag records, snapshots and snapshot diffs

pub mod catalog;
pub mod error;
pub mod metrics;
pub mod record;
pub mod service;
pub mod tracker;

pub use catalog::{Article, Catalog, NameResolver, NoCatalog};
pub use error::{CatalogError, TrackerError};
pub use metrics::METRICS;
pub use record::{PresenceSnapshot, SnapshotDiff, TagRecord};
pub use service::{spawn_tracker, TrackerHandle};
pub use tracker::{DiscardReason, IngestOutcome, PresenceTracker, SweepReport, TrackerConfig};
