//! # grefw
//!
//! A library for updating the firmware of GRE-family handheld scanners
//! (PSR-800, Pro-18, Pro-668, WS-1080, Pro-107, PSR-700) over their USB
//! serial link.
//!
//! This crate provides:
//!
//! - Framing, checksums and the outbound command set
//! - A chunk-tolerant receive automaton that decodes scanner responses
//! - Firmware container parsing, packetization and cross-family transcoding
//! - The firmware update state machine with retry and timeout handling
//! - A single-threaded session binding all of the above to a serial port
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use grefw::{FirmwareImage, Platform, UpdateConfig, UpdateTarget};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = FirmwareImage::open("psr800.bin")?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         use grefw::{NativePort, ScannerSession, SerialConfig, session::SETTLE_TIME};
//!
//!         let port = NativePort::open(&SerialConfig::new("/dev/ttyACM0", 115_200))?;
//!         let mut session = ScannerSession::new(port, UpdateConfig::default());
//!         session.initialize(SETTLE_TIME)?;
//!         session.wait_for_cpu_update_mode(std::time::Duration::from_secs(60))?;
//!
//!         let target = UpdateTarget::new(Platform::Psr800);
//!         session.run_update(image, target, &mut |offset, total| {
//!             println!("{offset}/{total}");
//!         })?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod error;
pub mod image;
pub mod port;
pub mod protocol;
pub mod session;
pub mod target;
pub mod update;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker polled by [`ScannerSession`].
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    error::{Error, Result},
    image::{FirmwareImage, FirmwareInfo},
    port::{MockPort, Port, SerialConfig},
    protocol::{
        Command, LcdRecord, ProtocolEvent, ProtocolObserver, Response, Signal, StatusRecord,
        VersionRecord,
    },
    session::{PollOutcome, ScannerSession},
    target::{Platform, UpdateTarget},
    update::{UpdateAction, UpdateConfig, UpdateFailure, UpdateOrchestrator, UpdateState},
};
