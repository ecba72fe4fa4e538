//! Kiosk Reader
//!
//! Owns the connection to the RFID reader and hands decoded reads to one
//! subscriber (the presence tracker) over a bounded channel.
//!
//! - [`session::ReaderSession`]: open / open_with_retry / close lifecycle
//! - [`driver::ReaderDriver`]: hardware SDK boundary
//! - [`subscription`]: gated event delivery, closed before the driver is released
//! - [`simulated::SimulatedReader`]: scripted driver for running without hardware

pub mod driver;
pub mod error;
pub mod metrics;
pub mod session;
pub mod simulated;
pub mod subscription;

pub use driver::ReaderDriver;
pub use error::{CommandError, ConnectError, DriverError};
pub use metrics::METRICS;
pub use session::{ReaderSession, RetryPolicy, SessionConfig, SessionState};
pub use simulated::{DriverCall, SimulatedReader, SimulatedTag, SimulatorProbe};
pub use subscription::{Delivery, EventSink, Subscription};
