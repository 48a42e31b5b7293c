//! Error types for grefw.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for grefw operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for grefw operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A command was built with nothing to send.
    #[error("Cannot frame an empty payload")]
    EmptyPayload,

    /// Checksum mismatch or unexpected byte at a frame boundary.
    #[error("Framing error: {0}")]
    Framing(String),

    /// No handshake signal arrived within the communications window.
    #[error("Timeout: no response from scanner within {0:?}")]
    Timeout(Duration),

    /// The scanner rejected the same packet too many times.
    #[error("Packet rejected {attempts} times in a row, update aborted")]
    RetryExhausted {
        /// Number of consecutive rejections seen.
        attempts: u32,
    },

    /// The scanner cancelled the update.
    #[error("Scanner cancelled the firmware update")]
    Cancelled,

    /// Firmware and scanner cannot be matched (no transcode path).
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Firmware file unreadable or malformed.
    #[error("Invalid firmware file: {0}")]
    InvalidFirmware(String),

    /// The embedding application asked to stop.
    #[error("Interrupted")]
    Interrupted,

    /// Operation not valid in the current update state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the error ends the current transfer (as opposed to being
    /// recovered inside the receive automaton).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Framing(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_framing_is_recoverable() {
        assert!(!Error::Framing("bad checksum".into()).is_fatal());
        assert!(Error::Timeout(Duration::from_secs(3)).is_fatal());
        assert!(Error::RetryExhausted { attempts: 3 }.is_fatal());
        assert!(Error::Unsupported("no path".into()).is_fatal());
        assert!(Error::InvalidFirmware("short".into()).is_fatal());
    }

    #[test]
    fn test_retry_exhausted_message() {
        let err = Error::RetryExhausted { attempts: 3 };
        assert_eq!(
            err.to_string(),
            "Packet rejected 3 times in a row, update aborted"
        );
    }
}
