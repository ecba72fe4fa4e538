//! Error types for parsing protocol values and loading configuration.

use thiserror::Error;

/// Protocol operation result type.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Protocol and configuration errors.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Port spec is not of the form `<port>[:<baud>]`
    #[error("Invalid port spec '{spec}': {reason}")]
    InvalidPortSpec { spec: String, reason: String },

    /// Antenna mask selects no antenna or an antenna outside 1..=32
    #[error("Invalid antenna mask: {0}")]
    InvalidAntennaMask(String),

    /// Configuration could not be parsed or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (reading or writing configuration)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub fn invalid_port_spec(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPortSpec {
            spec: spec.into(),
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
