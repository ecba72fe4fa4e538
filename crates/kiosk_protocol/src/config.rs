//! Kiosk configuration (TOML).
//!
//! Every field has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! [tracker]
//! miss_threshold_secs = 2.0
//! max_miss_count = 3
//! sweep_interval_secs = 1.0
//!
//! [reader]
//! port_spec = "COM5:115200"
//! connect_retry_attempts = 3
//! connect_retry_delay_ms = 200
//!
//! [catalog]
//! path = "articles.json"
//! ```

use crate::defaults::*;
use crate::error::{ProtocolError, Result};
use crate::types::{AntennaMask, PortSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the kiosk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KioskConfig {
    #[serde(default)]
    pub tracker: TrackerSection,

    #[serde(default)]
    pub reader: ReaderSection,

    #[serde(default)]
    pub catalog: CatalogSection,
}

/// Presence tracker tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSection {
    /// How long since the last read counts as one miss
    #[serde(default = "default_miss_threshold_secs")]
    pub miss_threshold_secs: f64,

    /// Consecutive misses before a tag is reported removed
    #[serde(default = "default_max_miss_count")]
    pub max_miss_count: u32,

    /// Sweep cadence
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: f64,

    /// Bound on queued reader events awaiting the tracker
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Reader connection and inventory settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderSection {
    /// Connection string `<port>[:<baud>]`
    #[serde(default = "default_port_spec")]
    pub port_spec: String,

    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,

    #[serde(default = "default_connect_retry_attempts")]
    pub connect_retry_attempts: u32,

    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,

    /// Enabled antennas, bit 0 = antenna 1
    #[serde(default = "default_antenna_mask")]
    pub antenna_mask: u32,

    /// TID read length in words
    #[serde(default = "default_tid_read_len")]
    pub tid_read_len: u8,
}

/// Product catalog location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSection {
    /// JSON article list. Tags resolve to no name when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_miss_threshold_secs() -> f64 {
    DEFAULT_MISS_THRESHOLD_SECS
}

fn default_max_miss_count() -> u32 {
    DEFAULT_MAX_MISS_COUNT
}

fn default_sweep_interval_secs() -> f64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_port_spec() -> String {
    DEFAULT_PORT_SPEC.to_string()
}

fn default_open_timeout_ms() -> u64 {
    DEFAULT_OPEN_TIMEOUT_MS
}

fn default_connect_retry_attempts() -> u32 {
    DEFAULT_CONNECT_RETRY_ATTEMPTS
}

fn default_connect_retry_delay_ms() -> u64 {
    DEFAULT_CONNECT_RETRY_DELAY_MS
}

fn default_antenna_mask() -> u32 {
    DEFAULT_ANTENNA_MASK
}

fn default_tid_read_len() -> u8 {
    DEFAULT_TID_READ_LEN
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            miss_threshold_secs: default_miss_threshold_secs(),
            max_miss_count: default_max_miss_count(),
            sweep_interval_secs: default_sweep_interval_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for ReaderSection {
    fn default() -> Self {
        Self {
            port_spec: default_port_spec(),
            open_timeout_ms: default_open_timeout_ms(),
            connect_retry_attempts: default_connect_retry_attempts(),
            connect_retry_delay_ms: default_connect_retry_delay_ms(),
            antenna_mask: default_antenna_mask(),
            tid_read_len: default_tid_read_len(),
        }
    }
}

impl ReaderSection {
    pub fn port_spec(&self) -> Result<PortSpec> {
        PortSpec::parse(&self.port_spec)
    }

    pub fn antenna_mask(&self) -> Result<AntennaMask> {
        AntennaMask::new(self.antenna_mask)
    }
}

impl KioskConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ProtocolError::config(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ProtocolError::config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the tracker or session cannot run with.
    pub fn validate(&self) -> Result<()> {
        let tracker = &self.tracker;
        if !(tracker.miss_threshold_secs.is_finite() && tracker.miss_threshold_secs > 0.0) {
            return Err(ProtocolError::config(format!(
                "tracker.miss_threshold_secs must be positive, got {}",
                tracker.miss_threshold_secs
            )));
        }
        if !(tracker.sweep_interval_secs.is_finite() && tracker.sweep_interval_secs > 0.0) {
            return Err(ProtocolError::config(format!(
                "tracker.sweep_interval_secs must be positive, got {}",
                tracker.sweep_interval_secs
            )));
        }
        if tracker.max_miss_count == 0 {
            return Err(ProtocolError::config("tracker.max_miss_count must be at least 1"));
        }
        if tracker.channel_capacity == 0 {
            return Err(ProtocolError::config("tracker.channel_capacity must be at least 1"));
        }

        let reader = &self.reader;
        if reader.connect_retry_attempts == 0 {
            return Err(ProtocolError::config(
                "reader.connect_retry_attempts must be at least 1",
            ));
        }
        reader.port_spec()?;
        reader.antenna_mask()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KioskConfig::default();
        assert_eq!(config.tracker.miss_threshold_secs, 2.0);
        assert_eq!(config.tracker.max_miss_count, 3);
        assert_eq!(config.tracker.sweep_interval_secs, 1.0);
        assert_eq!(config.reader.port_spec, "COM5:115200");
        assert_eq!(config.reader.connect_retry_attempts, 3);
        assert_eq!(config.reader.connect_retry_delay_ms, 200);
        assert_eq!(config.reader.antenna_mask, 0b1111);
        assert!(config.catalog.path.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = KioskConfig::from_toml_str("").unwrap();
        assert_eq!(config, KioskConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = KioskConfig::from_toml_str(
            r#"
            [tracker]
            max_miss_count = 2

            [reader]
            port_spec = "COM3:115200"
            "#,
        )
        .unwrap();
        assert_eq!(config.tracker.max_miss_count, 2);
        assert_eq!(config.tracker.miss_threshold_secs, 2.0);
        assert_eq!(config.reader.port_spec().unwrap().port, "COM3");
        assert_eq!(config.reader.open_timeout_ms, 3000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = KioskConfig::default();
        config.tracker.max_miss_count = 0;
        assert!(config.validate().is_err());

        let mut config = KioskConfig::default();
        config.tracker.miss_threshold_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = KioskConfig::default();
        config.tracker.sweep_interval_secs = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = KioskConfig::default();
        config.reader.connect_retry_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = KioskConfig::default();
        config.reader.antenna_mask = 0;
        assert!(config.validate().is_err());

        let mut config = KioskConfig::default();
        config.reader.port_spec = "COM5:fast".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = KioskConfig::from_toml_str("[tracker\nmax_miss_count = ").unwrap_err();
        assert!(matches!(err, ProtocolError::Config(_)));
    }
}
