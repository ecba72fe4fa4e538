//! Kiosk Protocol
//!
//! Vocabulary shared between the reader session, the presence tracker and the
//! launcher. The reader driver is assumed to have decoded hardware frames
//! already; everything here is plain data.
//!
//! - [`types`]: tag ids, reader events, reader commands, port specs
//! - [`config`]: TOML configuration with per-field defaults
//! - [`defaults`]: canonical default values

pub mod config;
pub mod defaults;
pub mod error;
pub mod types;

pub use config::{CatalogSection, KioskConfig, ReaderSection, TrackerSection};
pub use error::{ProtocolError, Result};
pub use types::{
    AntennaMask, InventoryMode, PortSpec, ReadCycleCompleteEvent, ReaderCommand, ReaderEvent,
    StartInventory, TagId, TagSeenEvent, TidReadMode, TidReadParams, RESULT_SUCCESS,
};
