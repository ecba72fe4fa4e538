//! Error types for the presence crate.
//!
//! The tracker itself never fails; these cover loading the catalog and
//! talking to a tracker task that has gone away.

use thiserror::Error;

/// Catalog loading errors. Callers usually fall back to an empty catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error reading catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog is not a valid article list: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors talking to the tracker task.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Task has stopped; no further events or snapshots
    #[error("Tracker task is no longer running")]
    Closed,

    /// Task panicked or was aborted
    #[error("Tracker task failed: {0}")]
    Join(String),
}
