//! Firmware image handling.

pub mod firmware;

pub use firmware::{FirmwareHeader, FirmwareImage, FirmwareInfo, PACKET_SIZE};
