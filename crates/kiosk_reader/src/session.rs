//! Reader session lifecycle.
//!
//! ```text
//! Disconnected --open--> Connecting --ok--> Connected --close--> Disconnected
//!                            |
//!                            +--error--> Disconnected
//! ```
//!
//! Once the driver is open the session sends `stop` (clears whatever the reader
//! was doing) and then `start_inventory`. A non-zero return code from either is
//! logged and kept as an advisory; the session still counts as connected.

use crate::driver::ReaderDriver;
use crate::error::{CommandError, ConnectError};
use crate::metrics::METRICS;
use crate::subscription::{EventSink, Subscription};
use kiosk_protocol::{
    PortSpec, ProtocolError, ReaderCommand, ReaderEvent, ReaderSection, StartInventory,
};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// How many times to try opening, and how long to wait before each try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Lets the OS release the port between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Session settings derived from the `[reader]` config section.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub port: PortSpec,
    pub open_timeout: Duration,
    pub retry: RetryPolicy,
    pub inventory: StartInventory,
}

impl SessionConfig {
    pub fn from_section(section: &ReaderSection) -> Result<Self, ProtocolError> {
        Ok(Self {
            port: section.port_spec()?,
            open_timeout: Duration::from_millis(section.open_timeout_ms),
            retry: RetryPolicy::new(
                section.connect_retry_attempts,
                Duration::from_millis(section.connect_retry_delay_ms),
            ),
            inventory: StartInventory::continuous(section.antenna_mask()?, section.tid_read_len),
        })
    }
}

/// Connection to one reader, delivering its events to a single subscriber.
///
/// Methods take `&mut self`; to close from another task, share the session as
/// `Arc<tokio::sync::Mutex<ReaderSession<D>>>`.
pub struct ReaderSession<D: ReaderDriver> {
    driver: D,
    events_tx: mpsc::Sender<ReaderEvent>,
    inventory: StartInventory,
    state: SessionState,
    subscription: Option<Subscription>,
    /// Driver may hold the port (open succeeded or was interrupted)
    driver_open: bool,
    advisories: Vec<CommandError>,
}

impl<D: ReaderDriver> ReaderSession<D> {
    pub fn new(driver: D, events_tx: mpsc::Sender<ReaderEvent>, inventory: StartInventory) -> Self {
        Self {
            driver,
            events_tx,
            inventory,
            state: SessionState::Disconnected,
            subscription: None,
            driver_open: false,
            advisories: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Commands that failed since the last [`take_advisories`](Self::take_advisories).
    pub fn advisories(&self) -> &[CommandError] {
        &self.advisories
    }

    pub fn take_advisories(&mut self) -> Vec<CommandError> {
        std::mem::take(&mut self.advisories)
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Open the reader and start a continuous inventory.
    pub async fn open(&mut self, port: &PortSpec, timeout: Duration) -> Result<(), ConnectError> {
        if self.state == SessionState::Connected {
            debug!("Reader session already connected");
            return Ok(());
        }

        self.state = SessionState::Connecting;
        let subscription = Subscription::new();
        let sink = EventSink::new(self.events_tx.clone(), subscription.clone());
        self.subscription = Some(subscription);
        self.driver_open = true;

        let opened = tokio::time::timeout(timeout, self.driver.open(port, timeout, sink)).await;
        let result = match opened {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectError::from_driver(port, e)),
            Err(_) => Err(ConnectError::Timeout {
                port: port.port.clone(),
                timeout,
            }),
        };

        if let Err(e) = result {
            METRICS.inc_connect_failures();
            self.release().await;
            return Err(e);
        }

        self.state = SessionState::Connected;
        info!("Reader {} connected on {}", self.driver.name(), port);

        self.issue(ReaderCommand::Stop).await;
        if self.issue(ReaderCommand::StartInventory(self.inventory)).await {
            info!(
                "Inventory started on antennas {:?}",
                self.inventory.antenna_mask.antennas()
            );
        }

        Ok(())
    }

    /// Open with retries. Before every attempt, tears down leftovers of the
    /// previous one and waits `policy.delay`.
    pub async fn open_with_retry(
        &mut self,
        port: &PortSpec,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<(), ConnectError> {
        if self.state == SessionState::Connected {
            return Ok(());
        }

        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.release().await;
            tokio::time::sleep(policy.delay).await;

            METRICS.inc_connect_attempts();
            info!(
                "Connecting to reader on {} (attempt {}/{})",
                port, attempt, max_attempts
            );

            let err = match self.open(port, timeout).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if !err.is_transient() {
                warn!("Connect attempt {} failed, not retrying: {}", attempt, err);
                return Err(err);
            }
            if attempt >= max_attempts {
                warn!("Connect attempt {} failed, giving up: {}", attempt, err);
                return Err(ConnectError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            warn!("Connect attempt {} failed: {}", attempt, err);
        }
    }

    /// Stop the inventory and release the reader. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if self.state == SessionState::Disconnected && !self.driver_open {
            debug!("Reader session already closed");
            return;
        }

        // Nothing may reach the subscriber once the channel starts closing.
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }

        if self.state == SessionState::Connected {
            match self.driver.send(&ReaderCommand::Stop).await {
                Ok(0) => {}
                Ok(code) => warn!("Stop on close returned code {}", code),
                Err(e) => warn!("Stop on close failed: {}", e),
            }
        }

        self.release().await;
        info!("Reader session closed");
    }

    /// Unsubscribe and close the driver, ignoring errors.
    async fn release(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        if self.driver_open {
            if let Err(e) = self.driver.close().await {
                warn!("Reader driver close failed: {}", e);
            }
            self.driver_open = false;
        }
        self.state = SessionState::Disconnected;
    }

    /// Send one command; a failure becomes an advisory. Returns true on success.
    async fn issue(&mut self, command: ReaderCommand) -> bool {
        let failure = match self.driver.send(&command).await {
            Ok(0) => {
                debug!("Command {} ok", command);
                return true;
            }
            Ok(code) => CommandError::Rejected {
                command: command.name(),
                code,
            },
            Err(e) => CommandError::Unsent {
                command: command.name(),
                message: e.to_string(),
            },
        };

        METRICS.inc_command_failures();
        warn!("{}", failure);
        self.advisories.push(failure);
        false
    }
}
