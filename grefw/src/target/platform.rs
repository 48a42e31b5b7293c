//! Scanner platform codes.
//!
//! Every firmware image and every scanner model is identified by a one-byte
//! platform code. The same code is used by the settings layer to describe
//! which scanner is connected and which firmware family it should receive.

use crate::error::{Error, Result};
use std::fmt;

/// Known scanner platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Platform {
    /// PSR-800 handheld.
    Psr800 = 0xEE,
    /// Pro-18 handheld.
    Pro18 = 0xEC,
    /// Pro-668 handheld.
    Pro668 = 0xE4,
    /// WS-1080 handheld.
    Ws1080 = 0xE6,
    /// Pro-107 handheld.
    Pro107 = 0xF0,
    /// PSR-700 handheld.
    Psr700 = 0xEF,
}

impl Platform {
    /// All known platforms, in the order the settings layer lists them.
    pub const ALL: [Self; 6] = [
        Self::Psr800,
        Self::Pro18,
        Self::Pro668,
        Self::Ws1080,
        Self::Pro107,
        Self::Psr700,
    ];

    /// Get the on-wire platform code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a platform from its code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }

    /// Look up a platform from a user-supplied name ("psr800", "PSR-800", ...).
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "psr800" => Some(Self::Psr800),
            "pro18" => Some(Self::Pro18),
            "pro668" => Some(Self::Pro668),
            "ws1080" => Some(Self::Ws1080),
            "pro107" => Some(Self::Pro107),
            "psr700" => Some(Self::Psr700),
            _ => None,
        }
    }

    /// Firmware families this scanner model can be loaded with.
    ///
    /// The first entry is always the model's own firmware.
    pub fn accepted_firmware(self) -> &'static [Self] {
        match self {
            Self::Psr800 => &[Self::Psr800, Self::Ws1080],
            Self::Pro18 => &[Self::Pro18, Self::Ws1080],
            Self::Pro668 => &[Self::Pro668, Self::Ws1080],
            Self::Ws1080 => &[Self::Ws1080],
            Self::Pro107 => &[Self::Pro107],
            Self::Psr700 => &[Self::Psr700],
        }
    }

    /// Check whether an image built for `self` can be rewritten for `target`.
    pub fn can_transcode_to(self, target: Self) -> bool {
        self != target && target.accepted_firmware().contains(&self)
    }
}

impl TryFrom<u8> for Platform {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Self::from_code(code)
            .ok_or_else(|| Error::InvalidFirmware(format!("unknown platform code 0x{code:02X}")))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Psr800 => write!(f, "PSR-800"),
            Self::Pro18 => write!(f, "Pro-18"),
            Self::Pro668 => write!(f, "Pro-668"),
            Self::Ws1080 => write!(f, "WS-1080"),
            Self::Pro107 => write!(f, "Pro-107"),
            Self::Psr700 => write!(f, "PSR-700"),
        }
    }
}
