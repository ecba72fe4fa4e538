//! Reader events, reader commands and connection addressing.

use crate::defaults::DEFAULT_BAUD_RATE;
use crate::error::{ProtocolError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result code the reader attaches to a successful tag read.
pub const RESULT_SUCCESS: i32 = 0;

/// Highest antenna port number a mask can select.
const MAX_ANTENNA: u8 = 32;

// ============================================================================
// Tag identity
// ============================================================================

/// Tag identifier (EPC) decoded by the reader. Opaque, compared byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(String);

impl TagId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id carries no usable characters.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TagId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TagId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// Events (reader -> tracker)
// ============================================================================

/// One decoded tag read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSeenEvent {
    pub id: TagId,
    /// Hardware tag identifier (TID), when the reader was asked to read it.
    pub secondary_id: Option<String>,
    pub antenna: u8,
    /// Hardware result code; anything other than [`RESULT_SUCCESS`] is a failed read.
    pub result_code: i32,
    /// When the read was received from the driver.
    pub timestamp: DateTime<Utc>,
}

impl TagSeenEvent {
    /// Successful read with no secondary id.
    pub fn new(id: impl Into<TagId>, antenna: u8, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            secondary_id: None,
            antenna,
            result_code: RESULT_SUCCESS,
            timestamp,
        }
    }

    pub fn with_secondary_id(mut self, secondary_id: impl Into<String>) -> Self {
        self.secondary_id = Some(secondary_id.into());
        self
    }

    pub fn with_result_code(mut self, result_code: i32) -> Self {
        self.result_code = result_code;
        self
    }

    pub fn is_success(&self) -> bool {
        self.result_code == RESULT_SUCCESS
    }
}

/// Marks the end of one inventory round. Carries no payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadCycleCompleteEvent;

/// Everything a reader session can deliver to its subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReaderEvent {
    TagSeen(TagSeenEvent),
    ReadCycleComplete(ReadCycleCompleteEvent),
}

// ============================================================================
// Commands (session -> driver)
// ============================================================================

/// Bitmask of enabled antenna ports. Bit 0 is antenna 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct AntennaMask(u32);

impl AntennaMask {
    pub fn new(bits: u32) -> Result<Self> {
        if bits == 0 {
            return Err(ProtocolError::InvalidAntennaMask(
                "mask selects no antenna".to_string(),
            ));
        }
        Ok(Self(bits))
    }

    /// Build a mask from 1-based antenna numbers.
    pub fn from_antennas(antennas: &[u8]) -> Result<Self> {
        let mut bits = 0u32;
        for &antenna in antennas {
            if antenna == 0 || antenna > MAX_ANTENNA {
                return Err(ProtocolError::InvalidAntennaMask(format!(
                    "antenna {} outside 1..={}",
                    antenna, MAX_ANTENNA
                )));
            }
            bits |= 1 << (antenna - 1);
        }
        Self::new(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, antenna: u8) -> bool {
        antenna >= 1 && antenna <= MAX_ANTENNA && self.0 & (1 << (antenna - 1)) != 0
    }

    /// Enabled antennas in ascending order.
    pub fn antennas(self) -> Vec<u8> {
        (1..=MAX_ANTENNA).filter(|&a| self.contains(a)).collect()
    }
}

impl TryFrom<u32> for AntennaMask {
    type Error = ProtocolError;

    fn try_from(bits: u32) -> Result<Self> {
        Self::new(bits)
    }
}

impl From<AntennaMask> for u32 {
    fn from(mask: AntennaMask) -> Self {
        mask.0
    }
}

impl Default for AntennaMask {
    fn default() -> Self {
        Self(crate::defaults::DEFAULT_ANTENNA_MASK)
    }
}

/// How the reader runs an inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryMode {
    /// One round, then stop.
    Single,
    /// Continuous rounds until a stop command.
    Inventory,
}

/// Whether the reader picks the TID length itself or uses the configured one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TidReadMode {
    Auto,
    Fixed,
}

/// Parameters for reading the hardware tag identifier alongside the EPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TidReadParams {
    pub mode: TidReadMode,
    /// Length in words.
    pub len: u8,
}

impl Default for TidReadParams {
    fn default() -> Self {
        Self {
            mode: TidReadMode::Auto,
            len: crate::defaults::DEFAULT_TID_READ_LEN,
        }
    }
}

/// Start-inventory request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartInventory {
    pub antenna_mask: AntennaMask,
    pub mode: InventoryMode,
    pub tid: TidReadParams,
}

impl StartInventory {
    /// Continuous inventory on the given antennas with automatic TID reads.
    pub fn continuous(antenna_mask: AntennaMask, tid_len: u8) -> Self {
        Self {
            antenna_mask,
            mode: InventoryMode::Inventory,
            tid: TidReadParams {
                mode: TidReadMode::Auto,
                len: tid_len,
            },
        }
    }
}

/// Commands the session sends to the driver. Each yields a return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ReaderCommand {
    Stop,
    StartInventory(StartInventory),
}

impl ReaderCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ReaderCommand::Stop => "stop",
            ReaderCommand::StartInventory(_) => "start_inventory",
        }
    }
}

impl fmt::Display for ReaderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Connection addressing
// ============================================================================

/// Serial connection string `<port>[:<baud>]`, e.g. `COM5:115200`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortSpec {
    pub port: String,
    pub baud: u32,
}

impl PortSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ProtocolError::invalid_port_spec(spec, "empty"));
        }

        let (port, baud) = match spec.rsplit_once(':') {
            Some((port, baud)) if !baud.is_empty() && baud.bytes().all(|b| b.is_ascii_digit()) => {
                let baud: u32 = baud
                    .parse()
                    .map_err(|_| ProtocolError::invalid_port_spec(spec, "baud rate out of range"))?;
                (port, baud)
            }
            Some((_, baud)) if !baud.contains('/') && !baud.contains('\\') => {
                return Err(ProtocolError::invalid_port_spec(
                    spec,
                    format!("baud rate '{}' is not a number", baud),
                ));
            }
            _ => (spec, DEFAULT_BAUD_RATE),
        };

        if port.is_empty() {
            return Err(ProtocolError::invalid_port_spec(spec, "missing port name"));
        }
        if baud == 0 {
            return Err(ProtocolError::invalid_port_spec(spec, "baud rate must be positive"));
        }

        Ok(Self {
            port: port.to_string(),
            baud,
        })
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.port, self.baud)
    }
}

impl FromStr for PortSpec {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PortSpec {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PortSpec> for String {
    fn from(spec: PortSpec) -> Self {
        spec.to_string()
    }
}
