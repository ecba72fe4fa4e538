//! Operator-facing output.
//!
//! Plain text on stdout, one line per change. Diagnostics go through tracing.

use kiosk_presence::{PresenceSnapshot, SnapshotDiff, TagRecord};
use kiosk_protocol::TagId;
use kiosk_reader::{CommandError, ConnectError};
use std::io::{self, Write};

pub struct Presenter<W: Write> {
    out: W,
    previous: PresenceSnapshot,
}

impl<W: Write> Presenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            previous: PresenceSnapshot::default(),
        }
    }

    /// Print what changed since the last call. Returns the diff.
    pub fn update(&mut self, snapshot: PresenceSnapshot) -> io::Result<SnapshotDiff> {
        let diff = snapshot.diff(&self.previous);

        for id in &diff.appeared {
            let restored = diff.removed_cleared.contains(id);
            let line = describe(&snapshot.active, id);
            if restored {
                writeln!(self.out, "+ {} (back on the shelf)", line)?;
            } else {
                writeln!(self.out, "+ {}", line)?;
            }
        }
        for id in &diff.removed_added {
            writeln!(self.out, "- {}", describe(&snapshot.removed, id))?;
        }
        if !diff.is_empty() {
            writeln!(
                self.out,
                "  {} on shelf, {} taken",
                snapshot.active.len(),
                snapshot.removed.len()
            )?;
            self.out.flush()?;
        }

        self.previous = snapshot;
        Ok(diff)
    }

    pub fn advisory(&mut self, advisory: &CommandError) -> io::Result<()> {
        writeln!(self.out, "! Reader command failed: {}", advisory)
    }

    pub fn connect_failed(&mut self, err: &ConnectError) -> io::Result<()> {
        writeln!(
            self.out,
            "! Could not connect to the reader after {} attempts: {}",
            err.attempts(),
            root_cause(err)
        )
    }

    /// Final listing at shutdown.
    pub fn summary(&mut self, snapshot: &PresenceSnapshot) -> io::Result<()> {
        writeln!(self.out, "On shelf ({}):", snapshot.active.len())?;
        for record in &snapshot.active {
            writeln!(self.out, "  {}", label_with_id(record))?;
        }
        writeln!(self.out, "Taken ({}):", snapshot.removed.len())?;
        for record in &snapshot.removed {
            writeln!(self.out, "  {}", label_with_id(record))?;
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn describe(records: &[TagRecord], id: &TagId) -> String {
    records
        .iter()
        .find(|r| &r.id == id)
        .map(label_with_id)
        .unwrap_or_else(|| id.to_string())
}

fn label_with_id(record: &TagRecord) -> String {
    match &record.display_name {
        Some(name) => format!("{} [{}]", name, record.id),
        None => record.id.to_string(),
    }
}

fn root_cause(err: &ConnectError) -> &ConnectError {
    match err {
        ConnectError::RetriesExhausted { last, .. } => root_cause(last),
        other => other,
    }
}
