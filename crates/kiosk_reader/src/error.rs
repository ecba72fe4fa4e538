//! Reader session error types.
//!
//! Only [`ConnectError`] is ever returned to the caller of the session.
//! [`CommandError`] is non-fatal: it is logged and kept as an advisory.

use kiosk_protocol::PortSpec;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a reader driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Port missing, busy or held by another process
    #[error("Port {0} is unavailable")]
    PortUnavailable(String),

    /// Driver gave up waiting for the device
    #[error("Device did not respond within {0:?}")]
    Timeout(Duration),

    /// I/O failure on an open channel
    #[error("Transport error: {0}")]
    Transport(String),

    /// Unusable device or driver; retrying will not help
    #[error("Fatal driver error: {0}")]
    Fatal(String),
}

impl DriverError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, DriverError::Fatal(_))
    }
}

/// Failure to bring a session to the connected state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Port {port} is unavailable or busy")]
    PortUnavailable { port: String },

    #[error("Opening {port} timed out after {timeout:?}")]
    Timeout { port: String, timeout: Duration },

    #[error("Reader driver failed: {0}")]
    Driver(DriverError),

    /// Terminal: every attempt failed
    #[error("Could not connect after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ConnectError>,
    },
}

impl ConnectError {
    /// Map a driver failure during open onto the session's taxonomy.
    pub fn from_driver(port: &PortSpec, err: DriverError) -> Self {
        match err {
            DriverError::PortUnavailable(_) => ConnectError::PortUnavailable {
                port: port.port.clone(),
            },
            DriverError::Timeout(timeout) => ConnectError::Timeout {
                port: port.port.clone(),
                timeout,
            },
            other => ConnectError::Driver(other),
        }
    }

    /// Check if this error is transient (eligible for retry)
    pub fn is_transient(&self) -> bool {
        match self {
            ConnectError::PortUnavailable { .. } | ConnectError::Timeout { .. } => true,
            ConnectError::Driver(e) => e.is_transient(),
            ConnectError::RetriesExhausted { .. } => false,
        }
    }

    /// Number of open attempts this error stands for.
    pub fn attempts(&self) -> u32 {
        match self {
            ConnectError::RetriesExhausted { attempts, .. } => *attempts,
            _ => 1,
        }
    }
}

/// A stop or start-inventory command that did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandError {
    /// Reader answered with a non-zero return code
    #[error("Command {command} failed with code {code}")]
    Rejected { command: &'static str, code: i32 },

    /// Command never got an answer
    #[error("Command {command} could not be sent: {message}")]
    Unsent {
        command: &'static str,
        message: String,
    },
}

impl CommandError {
    pub fn command(&self) -> &'static str {
        match self {
            CommandError::Rejected { command, .. } | CommandError::Unsent { command, .. } => {
                command
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let port = PortSpec::parse("COM5").unwrap();
        assert!(ConnectError::from_driver(&port, DriverError::PortUnavailable("COM5".into()))
            .is_transient());
        assert!(ConnectError::from_driver(&port, DriverError::Transport("reset".into()))
            .is_transient());
        assert!(!ConnectError::from_driver(&port, DriverError::Fatal("no firmware".into()))
            .is_transient());
        assert!(!ConnectError::RetriesExhausted {
            attempts: 3,
            last: Box::new(ConnectError::PortUnavailable { port: "COM5".into() }),
        }
        .is_transient());
    }

    #[test]
    fn test_exhausted_message_names_attempts() {
        let err = ConnectError::RetriesExhausted {
            attempts: 3,
            last: Box::new(ConnectError::PortUnavailable {
                port: "COM5".into(),
            }),
        };
        assert_eq!(err.attempts(), 3);
        assert_eq!(
            err.to_string(),
            "Could not connect after 3 attempts: Port COM5 is unavailable or busy"
        );
    }

    #[test]
    fn test_command_error_display() {
        let err = CommandError::Rejected {
            command: "start_inventory",
            code: 4,
        };
        assert_eq!(err.command(), "start_inventory");
        assert_eq!(err.to_string(), "Command start_inventory failed with code 4");
    }
}
