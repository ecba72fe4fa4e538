//! Tracker service: one task owns the [`PresenceTracker`].
//!
//! Reader events arrive on a bounded channel, snapshots are requested over a
//! control channel, and a fixed-cadence interval drives the sweep. Ingest and
//! sweep never interleave because only this task touches the tracker.
//!
//! Select priority (biased): shutdown, snapshot requests, reader events, sweep.
//! A read that is already queued when the sweep fires is applied first.

use crate::catalog::NameResolver;
use crate::error::TrackerError;
use crate::metrics::METRICS;
use crate::record::PresenceSnapshot;
use crate::tracker::{IngestOutcome, PresenceTracker, TrackerConfig};
use chrono::{DateTime, Utc};
use kiosk_protocol::{ReadCycleCompleteEvent, ReaderEvent, TagSeenEvent};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const CONTROL_CHANNEL_CAPACITY: usize = 16;

/// Wall-clock time derived from the runtime's monotonic clock.
///
/// Reads and sweeps are stamped with this clock so they share one timeline,
/// and so paused-time tests move both together.
#[derive(Debug, Clone, Copy)]
struct SessionClock {
    anchor_utc: DateTime<Utc>,
    anchor: Instant,
}

impl SessionClock {
    fn start() -> Self {
        Self {
            anchor_utc: Utc::now(),
            anchor: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.anchor_utc + elapsed
    }
}

enum Control {
    Observe(oneshot::Sender<PresenceSnapshot>),
}

/// Handle to a running tracker task.
pub struct TrackerHandle {
    events_tx: mpsc::Sender<ReaderEvent>,
    control_tx: mpsc::Sender<Control>,
    shutdown_tx: mpsc::Sender<()>,
    join_handle: JoinHandle<PresenceSnapshot>,
}

impl TrackerHandle {
    /// Sender for reader events. Hand this to the reader session.
    pub fn events(&self) -> mpsc::Sender<ReaderEvent> {
        self.events_tx.clone()
    }

    /// Queue a read without waiting. Returns false if it was dropped.
    pub fn ingest(&self, event: TagSeenEvent) -> bool {
        self.offer(ReaderEvent::TagSeen(event))
    }

    /// Queue an end-of-round marker without waiting.
    pub fn read_cycle_complete(&self) -> bool {
        self.offer(ReaderEvent::ReadCycleComplete(ReadCycleCompleteEvent))
    }

    fn offer(&self, event: ReaderEvent) -> bool {
        match self.events_tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                METRICS.inc_events_dropped();
                warn!("Tracker queue full, dropping reader event");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Consistent copy of the active and removed sets.
    pub async fn observe(&self) -> Result<PresenceSnapshot, TrackerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control_tx
            .send(Control::Observe(reply_tx))
            .await
            .map_err(|_| TrackerError::Closed)?;
        reply_rx.await.map_err(|_| TrackerError::Closed)
    }

    /// Stop sweeping, apply reads still queued, and return the final state.
    pub async fn shutdown(self) -> Result<PresenceSnapshot, TrackerError> {
        let _ = self.shutdown_tx.send(()).await;
        self.join_handle
            .await
            .map_err(|e| TrackerError::Join(e.to_string()))
    }
}

/// Spawn the tracker task on the current runtime.
pub fn spawn_tracker(config: TrackerConfig, resolver: Arc<dyn NameResolver>) -> TrackerHandle {
    let (events_tx, events_rx) = mpsc::channel(config.channel_capacity.max(1));
    let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

    let service = TrackerService {
        clock: SessionClock::start(),
        tracker: PresenceTracker::new(config, resolver),
        events_rx,
        control_rx,
        shutdown_rx,
    };
    let join_handle = tokio::spawn(service.run());

    TrackerHandle {
        events_tx,
        control_tx,
        shutdown_tx,
        join_handle,
    }
}

struct TrackerService {
    clock: SessionClock,
    tracker: PresenceTracker,
    events_rx: mpsc::Receiver<ReaderEvent>,
    control_rx: mpsc::Receiver<Control>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl TrackerService {
    async fn run(mut self) -> PresenceSnapshot {
        let sweep_period = self.tracker.config().sweep_interval;
        info!(
            "Tracker started: threshold {:?}, max misses {}, sweep every {:?}",
            self.tracker.config().miss_threshold,
            self.tracker.config().max_miss_count,
            sweep_period
        );

        let mut sweep_interval = tokio::time::interval(sweep_period);
        sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately, skip it
        sweep_interval.tick().await;

        loop {
            tokio::select! {
                biased;

                // Also fires when the handle is dropped without shutdown
                _ = self.shutdown_rx.recv() => {
                    debug!("Tracker shutdown requested");
                    break;
                }

                Some(control) = self.control_rx.recv() => {
                    match control {
                        Control::Observe(reply) => {
                            let _ = reply.send(self.tracker.observe());
                        }
                    }
                }

                Some(event) = self.events_rx.recv() => {
                    self.apply(event);
                }

                _ = sweep_interval.tick() => {
                    let report = self.tracker.sweep(self.clock.now());
                    if !report.removed.is_empty() {
                        debug!(
                            "Sweep: {} examined, {} missed, {} removed",
                            report.examined,
                            report.missed,
                            report.removed.len()
                        );
                    }
                }
            }
        }

        // Reads the session delivered before it closed still count.
        let mut drained = 0usize;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event);
            drained += 1;
        }
        if drained > 0 {
            debug!("Applied {} queued events during shutdown", drained);
        }

        let snapshot = self.tracker.observe();
        match serde_json::to_string_pretty(&snapshot.active) {
            Ok(json) => debug!("Active tags at shutdown:\n{}", json),
            Err(e) => warn!("Failed to serialize active tags: {}", e),
        }
        info!(
            "Tracker stopped: {} active, {} removed",
            snapshot.active.len(),
            snapshot.removed.len()
        );
        snapshot
    }

    fn apply(&mut self, event: ReaderEvent) {
        match event {
            ReaderEvent::TagSeen(seen) => {
                if let IngestOutcome::Discarded(reason) =
                    self.tracker.ingest_at(&seen, self.clock.now())
                {
                    debug!("Discarded read of {:?}: {:?}", seen.id.as_str(), reason);
                }
            }
            ReaderEvent::ReadCycleComplete(_) => {
                METRICS.inc_read_cycles();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NoCatalog;
    use kiosk_protocol::TagId;
    use std::time::Duration;

    fn config() -> TrackerConfig {
        TrackerConfig::new(Duration::from_secs(2), 2, Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_clock_follows_runtime_time() {
        let clock = SessionClock::start();
        let t0 = clock.now();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(clock.now() - t0, chrono::Duration::milliseconds(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_sees_ingested_tag() {
        let handle = spawn_tracker(config(), Arc::new(NoCatalog));
        assert!(handle.ingest(TagSeenEvent::new("A", 1, Utc::now())));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snapshot = handle.observe().await.unwrap();
        assert_eq!(snapshot.active_ids(), vec![TagId::from("A")]);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_applies_queued_events() {
        let handle = spawn_tracker(config(), Arc::new(NoCatalog));
        handle.ingest(TagSeenEvent::new("A", 1, Utc::now()));
        handle.ingest(TagSeenEvent::new("B", 2, Utc::now()));

        let snapshot = handle.shutdown().await.unwrap();
        assert_eq!(snapshot.active.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_event() {
        let mut cfg = config();
        cfg.channel_capacity = 1;
        let handle = spawn_tracker(cfg, Arc::new(NoCatalog));

        // Nothing has run the tracker task yet, so the second offer finds the queue full.
        assert!(handle.ingest(TagSeenEvent::new("A", 1, Utc::now())));
        assert!(!handle.ingest(TagSeenEvent::new("B", 1, Utc::now())));

        let snapshot = handle.shutdown().await.unwrap();
        assert_eq!(snapshot.active_ids(), vec![TagId::from("A")]);
    }
}
