//! Frame codec and control signals.
//!
//! ## Frame Format
//!
//! Requests and responses share the same layout:
//!
//! ```text
//! +-----+-----------------+-----+----------+
//! | STX |     Payload     | ETX | Checksum |
//! +-----+-----------------+-----+----------+
//! |  1  |    variable     |  1  |    1     |
//! +-----+-----------------+-----+----------+
//! | 02  | cmd + arguments | 03  | sum8     |
//! +-----+-----------------+-----+----------+
//! ```
//!
//! The checksum is the 8-bit sum of every payload byte plus the ETX byte.
//! STX is not included.
//!
//! Outside a frame the scanner also sends single-byte control signals that
//! drive the bootloader handshake.

use crate::error::{Error, Result};
use std::fmt;

/// Protocol control characters.
pub mod control {
    /// Start of frame.
    pub const STX: u8 = 0x02;
    /// End of frame payload.
    pub const ETX: u8 = 0x03;
    /// Firmware update complete.
    pub const EOT: u8 = 0x04;
    /// Firmware update wait (ready for the first data packet).
    pub const ENQ: u8 = 0x05;
    /// Acknowledge.
    pub const ACK: u8 = 0x06;
    /// Firmware update start.
    pub const DLE: u8 = 0x10;
    /// Not acknowledge.
    pub const NAK: u8 = 0x15;
    /// Firmware update cancel.
    pub const CAN: u8 = 0x18;
    /// Line feed, terminates a CC-dump line.
    pub const LF: u8 = 0x0A;
    /// Bootloader announcement character (sent three times in a row).
    pub const C: u8 = b'C';
}

/// Single-byte handshake signals recognized outside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Update complete (EOT).
    Eot,
    /// Update wait (ENQ).
    Enq,
    /// Packet accepted (ACK).
    Ack,
    /// Update start (DLE).
    Dle,
    /// Packet rejected (NAK).
    Nak,
    /// Update cancelled (CAN).
    Can,
}

impl Signal {
    /// Classify a byte received outside a frame.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            control::EOT => Some(Self::Eot),
            control::ENQ => Some(Self::Enq),
            control::ACK => Some(Self::Ack),
            control::DLE => Some(Self::Dle),
            control::NAK => Some(Self::Nak),
            control::CAN => Some(Self::Can),
            _ => None,
        }
    }

    /// The byte that carries this signal on the wire.
    pub fn byte(self) -> u8 {
        match self {
            Self::Eot => control::EOT,
            Self::Enq => control::ENQ,
            Self::Ack => control::ACK,
            Self::Dle => control::DLE,
            Self::Nak => control::NAK,
            Self::Can => control::CAN,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Eot => "EOT",
            Self::Enq => "ENQ",
            Self::Ack => "ACK",
            Self::Dle => "DLE",
            Self::Nak => "NAK",
            Self::Can => "CAN",
        };
        f.write_str(name)
    }
}

/// Compute the checksum of a request payload.
///
/// Seeded with ETX, then every payload byte is added modulo 256.
pub fn checksum(payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(control::ETX, |acc, &b| acc.wrapping_add(b))
}

/// Frame a payload for transmission.
///
/// Returns `STX | payload | ETX | checksum`.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.is_empty() {
        return Err(Error::EmptyPayload);
    }

    let mut frame = Vec::with_capacity(payload.len() + 3);
    frame.push(control::STX);
    frame.extend_from_slice(payload);
    frame.push(control::ETX);
    frame.push(checksum(payload));
    Ok(frame)
}

/// Running checksum for a frame being received.
///
/// Seeded by the command byte that follows STX; every later byte up to and
/// including ETX is folded in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checksum(u8);

impl Checksum {
    /// Start a new checksum from the frame's command byte.
    pub fn seed(first: u8) -> Self {
        Self(first)
    }

    /// Fold in one more byte.
    pub fn update(&mut self, byte: u8) {
        self.0 = self.0.wrapping_add(byte);
    }

    /// Current value.
    pub fn value(self) -> u8 {
        self.0
    }

    /// Compare against the checksum byte read from the wire.
    pub fn matches(self, wire: u8) -> bool {
        self.0 == wire
    }
}

/// Accumulate the receive-side checksum over a complete frame.
///
/// Returns `None` if `frame` is too short to hold STX, one payload byte,
/// ETX and the checksum.
pub fn decode_checksum(frame: &[u8]) -> Option<u8> {
    if frame.len() < 4 || frame[0] != control::STX {
        return None;
    }
    let body = &frame[1..frame.len() - 1];
    let mut sum = Checksum::seed(body[0]);
    for &b in &body[1..] {
        sum.update(b);
    }
    Some(sum.value())
}
