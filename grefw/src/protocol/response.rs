//! Scanner response records and their decoder.
//!
//! A response payload starts with the letter of the command it answers.
//! The payload lengths below count that letter:
//!
//! | Letter | Response     | Payload length |
//! |--------|--------------|----------------|
//! | `A`    | status       | 17             |
//! | `L`    | LCD contents | 100            |
//! | `P`    | power status | 2              |
//! | `V`    | version      | 14             |
//!
//! Anything else is only meaningful while the bootloader is active, where
//! the single response the bootloader sends carries its version digits
//! directly and is terminated by ETX alone.

use crate::error::{Error, Result};
use std::fmt;

/// Payload length of a status response.
pub const STATUS_LEN: usize = 17;
/// Payload length of an LCD response.
pub const LCD_LEN: usize = 100;
/// Payload length of a power status response.
pub const POWER_STATUS_LEN: usize = 2;
/// Payload length of a version response.
pub const VERSION_LEN: usize = 14;

/// Number of LCD segment bytes.
pub const LCD_SEGMENTS: usize = 97;
/// Number of LCD icon bytes.
pub const LCD_ICONS: usize = 3;

/// Minimum payload carrying two version pairs in bootloader mode.
const BOOTLOADER_VERSION_LEN: usize = 4;

/// Expected payload length for a response command letter.
///
/// `None` means the length is not catalogued and the frame ends at the
/// first ETX.
pub fn expected_length(command: u8) -> Option<usize> {
    match command {
        b'A' => Some(STATUS_LEN),
        b'L' => Some(LCD_LEN),
        b'P' => Some(POWER_STATUS_LEN),
        b'V' => Some(VERSION_LEN),
        _ => None,
    }
}

/// Decoded get status response.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusRecord {
    /// Operating mode.
    pub mode: u8,
    /// Status flags.
    pub flags: u8,
    /// Scanner is powered from USB.
    pub usb_power: bool,
    /// Battery level (15 bits).
    pub battery: u16,
    /// Received signal strength.
    pub rssi: u16,
    /// Zeromatic tuning offset.
    pub zeromatic: i16,
    /// Alert LED red level.
    pub r_led: u8,
    /// Alert LED green level.
    pub g_led: u8,
    /// Alert LED blue level.
    pub b_led: u8,
    /// Current frequency.
    pub frequency: u32,
    /// Receive mode.
    pub rx_mode: u8,
}

/// Decoded get LCD response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcdRecord {
    /// LCD segment bytes.
    pub lcd: [u8; LCD_SEGMENTS],
    /// LCD icon bytes.
    pub icons: [u8; LCD_ICONS],
}

/// Decoded version response.
///
/// In bootloader mode only `boot` and `cpu` are reported and `model` is
/// empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VersionRecord {
    /// Model name.
    pub model: String,
    /// Boot loader version.
    pub boot: String,
    /// CPU firmware version.
    pub cpu: String,
    /// DSP firmware version.
    pub dsp: Option<String>,
    /// Voice (Voc) data version.
    pub voc: Option<String>,
}

impl fmt::Display for VersionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {}  {}", self.model, self.boot, self.cpu)?;
        if let Some(dsp) = &self.dsp {
            write!(f, "  {dsp}")?;
        }
        if let Some(voc) = &self.voc {
            write!(f, "  {voc}")?;
        }
        Ok(())
    }
}

/// A decoded scanner response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Status (`A`).
    Status(StatusRecord),
    /// LCD contents (`L`).
    Lcd(LcdRecord),
    /// Power status (`P`): `true` when the scanner is on.
    PowerStatus(bool),
    /// Application firmware version (`V`).
    Version(VersionRecord),
    /// Version reported by the bootloader.
    BootloaderVersion(VersionRecord),
}

/// Decode a checksum-verified response payload.
///
/// Returns `Ok(None)` for an uncatalogued command letter outside the
/// bootloader. A payload too short for its record is a framing error.
pub fn decode(payload: &[u8], bootloader_active: bool) -> Result<Option<Response>> {
    let Some(&command) = payload.first() else {
        return Err(Error::Framing("empty response payload".into()));
    };

    let response = match command {
        b'A' => Response::Status(decode_status(payload)?),
        b'L' => Response::Lcd(decode_lcd(payload)?),
        b'P' => {
            require_len(payload, POWER_STATUS_LEN)?;
            Response::PowerStatus(payload[1] != 0)
        },
        b'V' => Response::Version(decode_version(payload)?),
        _ if bootloader_active => Response::BootloaderVersion(decode_bootloader_version(payload)?),
        _ => return Ok(None),
    };

    Ok(Some(response))
}

fn require_len(payload: &[u8], len: usize) -> Result<()> {
    if payload.len() < len {
        return Err(Error::Framing(format!(
            "'{}' response too short: need {len} bytes, got {}",
            char::from(payload[0]),
            payload.len()
        )));
    }
    Ok(())
}

fn decode_status(p: &[u8]) -> Result<StatusRecord> {
    require_len(p, STATUS_LEN)?;

    Ok(StatusRecord {
        mode: p[1],
        flags: p[2],
        usb_power: p[4] & 0x80 != 0,
        battery: u16::from_le_bytes([p[3], p[4]]) & 0x7FFF,
        rssi: u16::from_le_bytes([p[5], p[6]]),
        zeromatic: i16::from_le_bytes([p[7], p[8]]),
        r_led: p[9],
        g_led: p[10],
        b_led: p[11],
        frequency: u32::from_le_bytes([p[12], p[13], p[14], p[15]]),
        rx_mode: p[16],
    })
}

fn decode_lcd(p: &[u8]) -> Result<LcdRecord> {
    require_len(p, LCD_LEN)?;

    // The icon bytes are the last three of the payload; the segment block
    // runs 97 bytes from offset 1 and so shares its final byte with them.
    let mut lcd = [0u8; LCD_SEGMENTS];
    lcd.copy_from_slice(&p[1..=LCD_SEGMENTS]);
    let mut icons = [0u8; LCD_ICONS];
    icons.copy_from_slice(&p[LCD_LEN - LCD_ICONS..LCD_LEN]);

    Ok(LcdRecord { lcd, icons })
}

fn decode_version(p: &[u8]) -> Result<VersionRecord> {
    require_len(p, VERSION_LEN)?;

    let model_bytes = &p[2..10];
    let end = model_bytes
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(model_bytes.len());
    let model = String::from_utf8_lossy(&model_bytes[..end])
        .trim_end()
        .to_string();

    Ok(VersionRecord {
        model,
        boot: nibble_version("Boot", p[10]),
        cpu: nibble_version("CPU", p[11]),
        dsp: Some(nibble_version("DSP", p[12])),
        voc: Some(nibble_version("Voc", p[13])),
    })
}

/// Format one version byte: `0x00` is not applicable, `0xFF` is erased,
/// otherwise the nibbles are major and minor in hex.
fn nibble_version(label: &str, value: u8) -> String {
    match value {
        0x00 => format!("{label} N/A"),
        0xFF => format!("{label} Erased"),
        v => format!("{label} {:x}.{:x}", v >> 4, v & 0x0F),
    }
}

fn decode_bootloader_version(p: &[u8]) -> Result<VersionRecord> {
    if p.len() < BOOTLOADER_VERSION_LEN {
        return Err(Error::Framing(format!(
            "bootloader version response too short: need {BOOTLOADER_VERSION_LEN} bytes, got {}",
            p.len()
        )));
    }

    Ok(VersionRecord {
        model: String::new(),
        boot: char_pair_version("Boot", p[0], p[1]),
        cpu: char_pair_version("CPU", p[2], p[3]),
        dsp: None,
        voc: None,
    })
}

/// Format a bootloader version pair: the two bytes are printable digits,
/// and `"FF"` marks an erased image.
fn char_pair_version(label: &str, major: u8, minor: u8) -> String {
    if major == b'F' && major == minor {
        format!("{label} Erased")
    } else {
        format!("{label} {}.{}", char::from(major), char::from(minor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_payload() -> Vec<u8> {
        vec![
            0x41, 0x01, 0x02, 0x03, 0x84, 0x05, 0x00, 0x07, 0x00, 0x09, 0x0A, 0x0B, 0x0C, 0x0D,
            0x00, 0x00, 0x11,
        ]
    }

    #[test]
    fn test_expected_length_table() {
        assert_eq!(expected_length(b'A'), Some(17));
        assert_eq!(expected_length(b'L'), Some(100));
        assert_eq!(expected_length(b'P'), Some(2));
        assert_eq!(expected_length(b'V'), Some(14));
        assert_eq!(expected_length(b'1'), None);
    }

    #[test]
    fn test_decode_status() {
        let Some(Response::Status(s)) = decode(&status_payload(), false).unwrap() else {
            panic!("expected status");
        };
        assert_eq!(s.mode, 0x01);
        assert_eq!(s.flags, 0x02);
        assert!(s.usb_power);
        assert_eq!(s.battery, (0x03 | (0x84 << 8)) & 0x7FFF);
        assert_eq!(s.rssi, 5);
        assert_eq!(s.zeromatic, 7);
        assert_eq!((s.r_led, s.g_led, s.b_led), (9, 10, 11));
        assert_eq!(s.frequency, 0x0D0C);
        assert_eq!(s.rx_mode, 0x11);
    }

    #[test]
    fn test_decode_status_negative_zeromatic() {
        let mut p = status_payload();
        p[7] = 0xFE;
        p[8] = 0xFF;
        let Some(Response::Status(s)) = decode(&p, false).unwrap() else {
            panic!("expected status");
        };
        assert_eq!(s.zeromatic, -2);
    }

    #[test]
    fn test_decode_status_too_short() {
        let p = &status_payload()[..10];
        assert!(matches!(decode(p, false), Err(Error::Framing(_))));
    }

    #[test]
    fn test_decode_lcd() {
        let mut p = vec![b'L'];
        p.extend((1..LCD_LEN).map(|i| i as u8));
        let Some(Response::Lcd(lcd)) = decode(&p, false).unwrap() else {
            panic!("expected LCD");
        };
        assert_eq!(lcd.lcd[0], 1);
        assert_eq!(lcd.lcd[96], 97);
        assert_eq!(lcd.icons, [97, 98, 99]);
    }

    #[test]
    fn test_decode_power_status() {
        assert_eq!(
            decode(&[b'P', 0x01], false).unwrap(),
            Some(Response::PowerStatus(true))
        );
        assert_eq!(
            decode(&[b'P', 0x00], false).unwrap(),
            Some(Response::PowerStatus(false))
        );
    }

    #[test]
    fn test_decode_version() {
        let mut p = vec![b'V', 0x00];
        p.extend_from_slice(b"PSR800\0\0");
        p.extend_from_slice(&[0x12, 0xFF, 0x00, 0x3A]);
        let Some(Response::Version(v)) = decode(&p, false).unwrap() else {
            panic!("expected version");
        };
        assert_eq!(v.model, "PSR800");
        assert_eq!(v.boot, "Boot 1.2");
        assert_eq!(v.cpu, "CPU Erased");
        assert_eq!(v.dsp.as_deref(), Some("DSP N/A"));
        assert_eq!(v.voc.as_deref(), Some("Voc 3.a"));
    }

    #[test]
    fn test_decode_bootloader_version() {
        let Some(Response::BootloaderVersion(v)) = decode(b"1023", true).unwrap() else {
            panic!("expected bootloader version");
        };
        assert!(v.model.is_empty());
        assert_eq!(v.boot, "Boot 1.0");
        assert_eq!(v.cpu, "CPU 2.3");
        assert_eq!(v.dsp, None);
        assert_eq!(v.voc, None);
    }

    #[test]
    fn test_decode_bootloader_erased_pair() {
        let Some(Response::BootloaderVersion(v)) = decode(b"FF10", true).unwrap() else {
            panic!("expected bootloader version");
        };
        assert_eq!(v.boot, "Boot Erased");
        assert_eq!(v.cpu, "CPU 1.0");

        let Some(Response::BootloaderVersion(v)) = decode(b"10FF", true).unwrap() else {
            panic!("expected bootloader version");
        };
        assert_eq!(v.cpu, "CPU Erased");
    }

    #[test]
    fn test_unknown_command_outside_bootloader_is_ignored() {
        assert_eq!(decode(b"1023", false).unwrap(), None);
    }

    #[test]
    fn test_short_bootloader_payload_is_framing_error() {
        assert!(matches!(decode(b"10", true), Err(Error::Framing(_))));
    }

    #[test]
    fn test_empty_payload_is_framing_error() {
        assert!(decode(&[], true).is_err());
    }

    #[test]
    fn test_version_display() {
        let v = VersionRecord {
            model: String::new(),
            boot: "Boot 1.0".into(),
            cpu: "CPU 2.3".into(),
            dsp: None,
            voc: None,
        };
        assert_eq!(v.to_string(), "  Boot 1.0  CPU 2.3");
    }
}
