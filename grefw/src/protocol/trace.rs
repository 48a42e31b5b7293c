//! Protocol traffic dump.

use std::fmt::{self, Write as _};

/// Direction of a traced chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to scanner.
    Tx,
    /// Scanner to host.
    Rx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tx => f.write_str("Tx"),
            Self::Rx => f.write_str("Rx"),
        }
    }
}

/// Render a chunk as hex plus printable ASCII.
///
/// Non-printable bytes appear in the ASCII column as `<xx>`.
///
/// ```
/// use grefw::protocol::trace::{Direction, format_traffic};
///
/// assert_eq!(
///     format_traffic(&[0x02, b'A', 0x03, 0x44], Direction::Tx),
///     "Tx[Hex: 02 41 03 44  Ascii: <02>A<03>D]"
/// );
/// ```
pub fn format_traffic(data: &[u8], direction: Direction) -> String {
    let mut hex = String::with_capacity(data.len() * 3);
    let mut ascii = String::with_capacity(data.len());

    for &b in data {
        let _ = write!(hex, "{b:02x} ");
        if (b' '..=b'~').contains(&b) {
            ascii.push(char::from(b));
        } else {
            let _ = write!(ascii, "<{b:02x}>");
        }
    }

    format!("{direction}[Hex: {hex} Ascii: {ascii}]")
}
