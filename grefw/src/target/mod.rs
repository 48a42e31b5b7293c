//! Scanner targets and update settings.

pub mod platform;

pub use platform::Platform;

/// Which scanner is connected and which firmware family it should receive.
///
/// `firmware` equals `scanner` for a normal update; it names a different
/// family when a cross-family image is to be transcoded onto the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UpdateTarget {
    /// Connected scanner model.
    pub scanner: Platform,
    /// Firmware family of the image to load.
    pub firmware: Platform,
}

impl UpdateTarget {
    /// Target a scanner with its own firmware family.
    pub fn new(scanner: Platform) -> Self {
        Self {
            scanner,
            firmware: scanner,
        }
    }

    /// Use a different firmware family.
    #[must_use]
    pub fn with_firmware(mut self, firmware: Platform) -> Self {
        self.firmware = firmware;
        self
    }

    /// Whether loading this firmware onto this scanner requires transcoding.
    pub fn needs_transcode(&self) -> bool {
        self.scanner != self.firmware
    }
}
