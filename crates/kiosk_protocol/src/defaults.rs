//! Canonical default values shared by the reader session and the tracker.

pub const DEFAULT_PORT_SPEC: &str = "COM5:115200";
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_OPEN_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_CONNECT_RETRY_ATTEMPTS: u32 = 3;
/// Delay before each open attempt; gives the OS time to release the port.
pub const DEFAULT_CONNECT_RETRY_DELAY_MS: u64 = 200;

/// Antennas 1 through 4.
pub const DEFAULT_ANTENNA_MASK: u32 = 0b1111;
pub const DEFAULT_TID_READ_LEN: u8 = 6;

pub const DEFAULT_MISS_THRESHOLD_SECS: f64 = 2.0;
pub const DEFAULT_MAX_MISS_COUNT: u32 = 3;
pub const DEFAULT_SWEEP_INTERVAL_SECS: f64 = 1.0;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
