//! Transport abstraction.
//!
//! The protocol engine talks to the scanner through the [`Port`] trait, so
//! the same session logic runs over a real serial line or an in-memory
//! [`MockPort`] in tests.
//!
//! ```text
//! +--------------------+
//! |   ScannerSession   |
//! +---------+----------+
//!           |
//!           v
//! +---------+----------+
//! |     Port trait     |
//! +----+----------+----+
//!      |          |
//!      v          v
//! +----+----+ +---+------+
//! |NativePort| | MockPort |
//! +---------+ +----------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use grefw::port::Port;
//!
//! fn example<P: Port>(port: &mut P) -> grefw::Result<()> {
//!     port.write_all_bytes(&[0x02, b'A', 0x03, 0x44])?;
//!
//!     let mut buf = [0u8; 32];
//!     let n = port.read(&mut buf)?;
//!     println!("Received: {:02X?}", &buf[..n]);
//!
//!     Ok(())
//! }
//! ```

pub mod mock;
#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Line speed used by every supported scanner.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default read timeout, which is also the session's polling interval.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial port configuration.
///
/// The scanners always run 8 data bits, no parity, one stop bit and no
/// flow control; only the port and speed are configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyACM0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the read timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Duplex byte stream to a scanner.
///
/// A read that times out with no data returns an error of kind
/// [`std::io::ErrorKind::TimedOut`]; the session treats that as an empty
/// poll.
pub trait Port: Read + Write + Send {
    /// Discard anything buffered in either direction.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Whether the port is still open.
    fn is_open(&self) -> bool;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }
}

pub use mock::MockPort;
#[cfg(feature = "native")]
pub use native::NativePort;
