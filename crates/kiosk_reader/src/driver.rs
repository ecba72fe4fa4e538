//! Boundary to the reader hardware SDK.
//!
//! A driver owns the physical channel and decodes frames into events. The
//! session never sees frames, only [`EventSink`] deliveries and return codes.

use crate::error::DriverError;
use crate::subscription::EventSink;
use async_trait::async_trait;
use kiosk_protocol::{PortSpec, ReaderCommand};
use std::time::Duration;

/// Trait for reader hardware drivers
///
/// Implementations must tolerate `close` on a channel that was never opened,
/// or was already closed.
#[async_trait]
pub trait ReaderDriver: Send {
    /// Driver name for logs
    fn name(&self) -> &str;

    /// Open the channel and start delivering decoded reads to `sink`
    /// once an inventory is running.
    async fn open(
        &mut self,
        port: &PortSpec,
        timeout: Duration,
        sink: EventSink,
    ) -> Result<(), DriverError>;

    /// Send a command and return the reader's return code (0 = success).
    async fn send(&mut self, command: &ReaderCommand) -> Result<i32, DriverError>;

    /// Release the channel.
    async fn close(&mut self) -> Result<(), DriverError>;
}
