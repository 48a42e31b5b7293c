//! Outbound command set.
//!
//! Every request is a single ASCII command letter followed by optional
//! arguments, framed with [`frame::encode`](super::frame::encode):
//!
//! | Letter | Request            | Arguments                              |
//! |--------|--------------------|----------------------------------------|
//! | `A`    | get status         | none                                   |
//! | `L`    | get LCD            | none                                   |
//! | `P`    | get power status   | none                                   |
//! | `V`    | get version        | trailing NUL outside the bootloader    |
//! | `C`    | CC-dump on/off     | `0x00` / `0x01`                        |
//! | `p`    | clear password     | none                                   |
//! | `t`    | set date and time  | 8 x u16 LE, DST flag, reserved zero    |

use crate::error::Result;
use crate::protocol::frame;
use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike};

/// Request command letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    /// Get status (`A`).
    GetStatus = b'A',
    /// Get LCD contents (`L`).
    GetLcd = b'L',
    /// Get power status (`P`).
    GetPowerStatus = b'P',
    /// Get version (`V`).
    GetVersion = b'V',
    /// Enable or disable CC-dump (`C`).
    SetCcDump = b'C',
    /// Clear the scanner password (`p`).
    ClearPassword = b'p',
    /// Set date and time (`t`).
    SetDateTime = b't',
}

/// A request payload ready to be framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    payload: Vec<u8>,
}

impl Command {
    /// Create a command with no arguments.
    pub fn new(command_type: CommandType) -> Self {
        Self {
            payload: vec![command_type as u8],
        }
    }

    /// Build a get status request.
    pub fn get_status() -> Self {
        Self::new(CommandType::GetStatus)
    }

    /// Build a get LCD request.
    pub fn get_lcd() -> Self {
        Self::new(CommandType::GetLcd)
    }

    /// Build a get power status request.
    pub fn get_power_status() -> Self {
        Self::new(CommandType::GetPowerStatus)
    }

    /// Build a get version request.
    ///
    /// The bootloader only understands the bare letter; the application
    /// firmware expects a trailing NUL.
    pub fn get_version(bootloader_active: bool) -> Self {
        let mut cmd = Self::new(CommandType::GetVersion);
        if !bootloader_active {
            cmd.payload.push(0x00);
        }
        cmd
    }

    /// Build a CC-dump enable/disable request.
    pub fn set_cc_dump(enable: bool) -> Self {
        let mut cmd = Self::new(CommandType::SetCcDump);
        cmd.payload.push(u8::from(enable));
        cmd
    }

    /// Build a clear password request.
    pub fn clear_password() -> Self {
        Self::new(CommandType::ClearPassword)
    }

    /// Build a set date and time request.
    ///
    /// Fields are sent as little-endian u16 in this order: seconds, minutes,
    /// hours, day of month, month (0-based), years since 1900, day of week
    /// (Monday = 1), day of year (1-based). A daylight-saving flag byte and a
    /// reserved zero byte follow.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn set_date_time<T: Datelike + Timelike>(datetime: &T, daylight_saving: bool) -> Self {
        let mut cmd = Self::new(CommandType::SetDateTime);
        let years_since_1900 = u16::try_from(datetime.year() - 1900).unwrap_or(0);
        let fields = [
            datetime.second() as u16,
            datetime.minute() as u16,
            datetime.hour() as u16,
            datetime.day() as u16,
            datetime.month0() as u16,
            years_since_1900,
            datetime.weekday().number_from_monday() as u16,
            datetime.ordinal() as u16,
        ];
        for field in fields {
            cmd.payload.write_u16::<LittleEndian>(field).unwrap();
        }
        cmd.payload.push(u8::from(daylight_saving));
        cmd.payload.push(0x00);
        cmd
    }

    /// The unframed payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Build the complete frame.
    pub fn build(&self) -> Result<Vec<u8>> {
        frame::encode(&self.payload)
    }
}

/// Whether daylight-saving time is in effect for a local timestamp.
///
/// The standard offset is taken as the smaller of the offsets in effect in
/// early January and early July of the same year.
pub fn is_daylight_saving(datetime: &DateTime<Local>) -> bool {
    let year = datetime.year();
    let offset_at = |month: u32| {
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
            .map(|dt| dt.offset().local_minus_utc())
    };
    match (offset_at(1), offset_at(7)) {
        (Some(jan), Some(jul)) => datetime.offset().local_minus_utc() > jan.min(jul),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[test]
    fn test_simple_commands() {
        assert_eq!(Command::get_status().build().unwrap(), [0x02, b'A', 0x03, 0x44]);
        assert_eq!(Command::get_lcd().payload(), b"L");
        assert_eq!(Command::get_power_status().payload(), b"P");
        assert_eq!(Command::clear_password().payload(), b"p");
    }

    #[test]
    fn test_get_version_nul_suffix() {
        assert_eq!(Command::get_version(false).payload(), b"V\0");
        assert_eq!(Command::get_version(true).payload(), b"V");
    }

    #[test]
    fn test_set_cc_dump() {
        assert_eq!(Command::set_cc_dump(true).payload(), &[b'C', 0x01]);
        assert_eq!(Command::set_cc_dump(false).payload(), &[b'C', 0x00]);
    }

    #[test]
    fn test_set_date_time_layout() {
        // Wednesday 2016-03-02 13:45:30
        let dt = NaiveDateTime::parse_from_str("2016-03-02 13:45:30", "%Y-%m-%d %H:%M:%S")
            .unwrap();
        let cmd = Command::set_date_time(&dt, true);
        let p = cmd.payload();

        assert_eq!(p.len(), 19);
        assert_eq!(p[0], b't');
        assert_eq!(&p[1..3], &[30, 0]); // seconds
        assert_eq!(&p[3..5], &[45, 0]); // minutes
        assert_eq!(&p[5..7], &[13, 0]); // hours
        assert_eq!(&p[7..9], &[2, 0]); // day of month
        assert_eq!(&p[9..11], &[2, 0]); // month, 0-based
        assert_eq!(&p[11..13], &[116, 0]); // 2016 - 1900
        assert_eq!(&p[13..15], &[3, 0]); // Wednesday
        assert_eq!(&p[15..17], &[62, 0]); // day of year
        assert_eq!(p[17], 1); // DST
        assert_eq!(p[18], 0);
    }
}
