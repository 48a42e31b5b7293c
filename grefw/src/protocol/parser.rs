//! Byte-by-byte receive automaton.
//!
//! The scanner interleaves three kinds of traffic on the same line:
//! single-byte handshake signals, checksummed response frames, and
//! free-text CC-dump lines. [`Parser`] classifies every received byte and
//! keeps its state across calls to [`Parser::feed`], so a frame may arrive
//! split over any number of reads.

use crate::protocol::frame::{Checksum, Signal, control};
use crate::protocol::response::{self, Response};
use log::{debug, info, warn};

/// Receive state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseState {
    /// Between frames.
    #[default]
    WaitStart,
    /// STX seen, next byte is the command letter.
    ResponseStart,
    /// Collecting payload bytes.
    ResponseData,
    /// ETX seen, next byte is the checksum.
    ResponseDataEnd,
    /// First byte of a CC-dump line captured.
    CcDumpStart,
    /// Inside a CC-dump line.
    CcDumpData,
}

/// Something the parser recognized in the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// A handshake signal received outside a frame.
    Signal(Signal),
    /// Three consecutive `C` bytes: the bootloader is waiting for an update.
    CpuUpdateMode,
    /// A checksum-verified, decoded response.
    Response(Response),
    /// A complete CC-dump line, newline included.
    CcDump(String),
    /// The bootloader expects this byte to be sent back after a frame.
    Reply(Signal),
}

/// Consumer of parser events.
///
/// The update orchestrator and any operator-facing display both hook in
/// here.
pub trait ProtocolObserver {
    /// Called for every event, in stream order.
    fn on_event(&mut self, event: &ProtocolEvent);
}

/// Observer that writes every event to the log.
#[derive(Debug, Default)]
pub struct LogObserver;

impl ProtocolObserver for LogObserver {
    fn on_event(&mut self, event: &ProtocolEvent) {
        match event {
            ProtocolEvent::Signal(signal) => debug!("Rx signal {signal}"),
            ProtocolEvent::CpuUpdateMode => info!("Scanner is in CPU update mode"),
            ProtocolEvent::Response(Response::Status(s)) => debug!("Rx status {s:?}"),
            ProtocolEvent::Response(Response::Lcd(_)) => debug!("Rx LCD contents"),
            ProtocolEvent::Response(Response::PowerStatus(on)) => {
                info!("Scanner power {}", if *on { "on" } else { "off" });
            },
            ProtocolEvent::Response(Response::Version(v) | Response::BootloaderVersion(v)) => {
                info!("Version {v}");
            },
            ProtocolEvent::CcDump(line) => info!("CC-dump: {}", line.trim_end()),
            ProtocolEvent::Reply(signal) => debug!("Tx reply {signal}"),
        }
    }
}

/// Number of consecutive `C` bytes announcing the bootloader.
const BOOTLOADER_ANNOUNCE_COUNT: u8 = 3;

/// Receive automaton for one scanner connection.
#[derive(Debug, Default)]
pub struct Parser {
    state: ParseState,
    payload: Vec<u8>,
    checksum: Checksum,
    expected_len: Option<usize>,
    update_flag_count: u8,
    bootloader_active: bool,
    cc_line: Vec<u8>,
}

impl Parser {
    /// Create a parser in the `WaitStart` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current receive state.
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Whether the bootloader announcement has been seen.
    pub fn is_bootloader_active(&self) -> bool {
        self.bootloader_active
    }

    /// Return to the initial state, forgetting bootloader mode.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Process a chunk of received bytes.
    ///
    /// Returns the events recognized in this chunk, in order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        // A CC-dump line only starts from a chunk that carries a colon.
        let chunk_has_colon = data.contains(&b':');

        for &byte in data {
            self.step(byte, chunk_has_colon, &mut events);
        }

        events
    }

    fn step(&mut self, byte: u8, chunk_has_colon: bool, events: &mut Vec<ProtocolEvent>) {
        match self.state {
            ParseState::WaitStart => self.wait_start(byte, chunk_has_colon, events),
            ParseState::ResponseStart => {
                self.payload.clear();
                self.payload.push(byte);
                self.checksum = Checksum::seed(byte);
                self.expected_len = response::expected_length(byte);
                self.state = ParseState::ResponseData;
            },
            ParseState::ResponseData => {
                self.checksum.update(byte);
                match self.expected_len {
                    None if byte == control::ETX => self.state = ParseState::ResponseDataEnd,
                    Some(len) if self.payload.len() == len => {
                        if byte == control::ETX {
                            self.state = ParseState::ResponseDataEnd;
                        } else {
                            debug!(
                                "Framing error: expected ETX after {len} bytes, got 0x{byte:02X}"
                            );
                            self.payload.clear();
                            self.state = ParseState::WaitStart;
                        }
                    },
                    _ => self.payload.push(byte),
                }
            },
            ParseState::ResponseDataEnd => {
                self.finish_frame(byte, events);
                self.state = ParseState::WaitStart;
            },
            ParseState::CcDumpStart => {
                self.cc_line.push(byte);
                self.state = ParseState::CcDumpData;
            },
            ParseState::CcDumpData => {
                self.cc_line.push(byte);
                if byte == control::LF {
                    let line = String::from_utf8_lossy(&self.cc_line).into_owned();
                    self.cc_line.clear();
                    events.push(ProtocolEvent::CcDump(line));
                    self.state = ParseState::WaitStart;
                }
            },
        }
    }

    fn wait_start(&mut self, byte: u8, chunk_has_colon: bool, events: &mut Vec<ProtocolEvent>) {
        if byte == control::C {
            if !self.bootloader_active {
                self.update_flag_count += 1;
                if self.update_flag_count == BOOTLOADER_ANNOUNCE_COUNT {
                    self.bootloader_active = true;
                    events.push(ProtocolEvent::CpuUpdateMode);
                }
            }
            return;
        }

        self.update_flag_count = 0;

        if byte == control::STX {
            self.state = ParseState::ResponseStart;
        } else if let Some(signal) = Signal::from_byte(byte) {
            events.push(ProtocolEvent::Signal(signal));
        } else if chunk_has_colon {
            self.cc_line.clear();
            self.cc_line.push(byte);
            self.state = ParseState::CcDumpStart;
        }
    }

    fn finish_frame(&mut self, wire_checksum: u8, events: &mut Vec<ProtocolEvent>) {
        if !self.checksum.matches(wire_checksum) {
            warn!(
                "Checksum mismatch: computed 0x{:02X}, received 0x{wire_checksum:02X}",
                self.checksum.value()
            );
            self.payload.clear();
            if self.bootloader_active {
                events.push(ProtocolEvent::Reply(Signal::Nak));
            }
            return;
        }

        match response::decode(&self.payload, self.bootloader_active) {
            Ok(Some(response)) => {
                let from_bootloader = matches!(response, Response::BootloaderVersion(_));
                events.push(ProtocolEvent::Response(response));
                if from_bootloader {
                    events.push(ProtocolEvent::Reply(Signal::Ack));
                }
            },
            Ok(None) => debug!(
                "Ignoring response with unknown command 0x{:02X}",
                self.payload.first().copied().unwrap_or_default()
            ),
            Err(e) => {
                debug!("Discarding response: {e}");
                if self.bootloader_active {
                    events.push(ProtocolEvent::Reply(Signal::Nak));
                }
            },
        }
    }
}
