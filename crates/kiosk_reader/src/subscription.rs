use crate::metrics::METRICS;
use kiosk_protocol::{ReadCycleCompleteEvent, ReaderEvent, TagSeenEvent};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Gate between a driver and the session's subscriber.
///
/// Deliveries hold the read side while they enqueue; [`Subscription::cancel`]
/// takes the write side. Once `cancel` returns, no delivery is in progress and
/// none will start. Clone is cheap and shares state.
#[derive(Debug, Clone)]
pub struct Subscription {
    active: Arc<RwLock<bool>>,
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscription {
    /// Create a new subscription (active).
    pub fn new() -> Self {
        Self {
            active: Arc::new(RwLock::new(true)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.read().map(|active| *active).unwrap_or(false)
    }

    /// Stop delivery. Waits for a delivery already in progress.
    pub fn cancel(&self) {
        match self.active.write() {
            Ok(mut active) => *active = false,
            Err(poisoned) => *poisoned.into_inner() = false,
        }
    }
}

/// Outcome of handing one event to the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Subscriber queue full; the event is lost
    Dropped,
    /// Session unsubscribed or subscriber gone; the driver should stop emitting
    Unsubscribed,
}

/// Where a driver delivers decoded events. Never blocks.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ReaderEvent>,
    subscription: Subscription,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<ReaderEvent>, subscription: Subscription) -> Self {
        Self { tx, subscription }
    }

    pub fn tag_seen(&self, event: TagSeenEvent) -> Delivery {
        self.deliver(ReaderEvent::TagSeen(event))
    }

    pub fn read_cycle_complete(&self) -> Delivery {
        self.deliver(ReaderEvent::ReadCycleComplete(ReadCycleCompleteEvent))
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_active() && !self.tx.is_closed()
    }

    fn deliver(&self, event: ReaderEvent) -> Delivery {
        let Ok(active) = self.subscription.active.read() else {
            return Delivery::Unsubscribed;
        };
        if !*active {
            return Delivery::Unsubscribed;
        }

        match self.tx.try_send(event) {
            Ok(()) => {
                METRICS.inc_events_delivered();
                Delivery::Delivered
            }
            Err(TrySendError::Full(_)) => {
                METRICS.inc_events_dropped();
                warn!("Event queue full, dropping reader event");
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Unsubscribed,
        }
    }
}
