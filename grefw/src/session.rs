//! Scanner connection.
//!
//! [`ScannerSession`] owns the transport, the receive automaton and the
//! update orchestrator, and runs them on the caller's thread. Each call to
//! [`ScannerSession::poll`] performs at most one read (bounded by the port
//! timeout), dispatches what arrived, and checks the communications timer.

use crate::error::{Error, Result};
use crate::image::FirmwareImage;
use crate::port::Port;
use crate::protocol::command::{self, Command};
use crate::protocol::parser::{LogObserver, Parser, ProtocolEvent, ProtocolObserver};
use crate::protocol::response::Response;
use crate::protocol::trace::{Direction, format_traffic};
use crate::target::UpdateTarget;
use crate::update::{UpdateAction, UpdateConfig, UpdateOrchestrator, UpdateState};
use chrono::{DateTime, Local};
use log::{debug, trace};
use std::io::ErrorKind;
use std::time::{Duration, Instant};

/// Time to listen for a bootloader announcement after opening the port.
pub const SETTLE_TIME: Duration = Duration::from_secs(2);

/// Bytes requested per read.
const READ_CHUNK: usize = 512;

/// What one poll produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// Parser events, in stream order.
    pub events: Vec<ProtocolEvent>,
    /// Orchestrator actions, already applied to the transport.
    pub actions: Vec<UpdateAction>,
}

/// A connected scanner.
pub struct ScannerSession<P: Port> {
    port: P,
    parser: Parser,
    orchestrator: UpdateOrchestrator,
    observer: Box<dyn ProtocolObserver + Send>,
    protocol_debug: bool,
}

impl<P: Port> ScannerSession<P> {
    /// Wrap an open port.
    pub fn new(port: P, config: UpdateConfig) -> Self {
        Self {
            port,
            parser: Parser::new(),
            orchestrator: UpdateOrchestrator::new(config),
            observer: Box::new(LogObserver),
            protocol_debug: false,
        }
    }

    /// Replace the event observer (a [`LogObserver`] by default).
    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn ProtocolObserver + Send>) -> Self {
        self.observer = observer;
        self
    }

    /// Dump all traffic at `trace` level.
    #[must_use]
    pub fn with_protocol_debug(mut self, enabled: bool) -> Self {
        self.protocol_debug = enabled;
        self
    }

    /// The transport.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Mutable access to the transport.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Give the transport back.
    pub fn into_port(self) -> P {
        self.port
    }

    /// The receive automaton.
    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    /// The update orchestrator.
    pub fn orchestrator(&self) -> &UpdateOrchestrator {
        &self.orchestrator
    }

    /// Current update state.
    pub fn update_state(&self) -> UpdateState {
        self.orchestrator.state()
    }

    /// Whether the scanner announced its bootloader.
    pub fn is_bootloader_active(&self) -> bool {
        self.parser.is_bootloader_active()
    }

    /// Whether the transport is still open.
    pub fn is_open(&self) -> bool {
        self.port.is_open()
    }

    /// Drop bytes already buffered by the transport along with any
    /// half-received frame.
    pub fn discard_input(&mut self) -> Result<()> {
        self.port.clear_buffers()?;
        self.parser.reset();
        Ok(())
    }

    /// Listen for a bootloader announcement, then query the scanner.
    ///
    /// Any earlier receive state and transfer outcome are forgotten first.
    /// In bootloader mode only the version is requested. Otherwise CC-dump
    /// is switched off and power status and version are requested.
    pub fn initialize(&mut self, settle: Duration) -> Result<()> {
        debug!("Initializing session on {}", self.port.name());
        self.parser.reset();
        self.orchestrator.reset();

        let end = Instant::now() + settle;
        loop {
            self.poll()?;
            if Instant::now() >= end {
                break;
            }
        }

        if self.is_bootloader_active() {
            debug!("Bootloader active, requesting version only");
            self.request_version()
        } else {
            self.set_cc_dump(false)?;
            self.get_power_status()?;
            self.request_version()
        }
    }

    /// Frame and send a command.
    pub fn send_command(&mut self, command: &Command) -> Result<()> {
        let frame = command.build()?;
        self.write(&frame)
    }

    /// Request status.
    pub fn get_status(&mut self) -> Result<()> {
        self.send_command(&Command::get_status())
    }

    /// Request LCD contents.
    pub fn get_lcd(&mut self) -> Result<()> {
        self.send_command(&Command::get_lcd())
    }

    /// Request power status.
    pub fn get_power_status(&mut self) -> Result<()> {
        self.send_command(&Command::get_power_status())
    }

    /// Request version, in the form the current firmware expects.
    pub fn request_version(&mut self) -> Result<()> {
        let bootloader = self.is_bootloader_active();
        self.send_command(&Command::get_version(bootloader))
    }

    /// Turn CC-dump output on or off.
    pub fn set_cc_dump(&mut self, enable: bool) -> Result<()> {
        self.send_command(&Command::set_cc_dump(enable))
    }

    /// Clear the scanner password.
    pub fn clear_password(&mut self) -> Result<()> {
        self.send_command(&Command::clear_password())
    }

    /// Set the scanner clock.
    pub fn set_date_time(&mut self, datetime: &DateTime<Local>) -> Result<()> {
        let dst = command::is_daylight_saving(datetime);
        self.send_command(&Command::set_date_time(datetime, dst))
    }

    /// Read once, dispatch, and check the communications timer.
    pub fn poll(&mut self) -> Result<PollOutcome> {
        if crate::is_interrupted_requested() {
            return Err(Error::Interrupted);
        }

        let mut outcome = PollOutcome::default();

        if self.port.is_open() {
            let mut buf = [0u8; READ_CHUNK];
            let n = match self.port.read(&mut buf) {
                Ok(n) => n,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => 0,
                Err(e) => return Err(e.into()),
            };

            if n > 0 {
                if self.protocol_debug {
                    trace!("{}", format_traffic(&buf[..n], Direction::Rx));
                }
                outcome.events = self.parser.feed(&buf[..n]);
            }
        }

        for event in &outcome.events {
            self.observer.on_event(event);
            if let ProtocolEvent::Reply(signal) = event {
                if self.port.is_open() {
                    self.write(&[signal.byte()])?;
                }
            }
            let actions = self.orchestrator.handle_event(event, Instant::now());
            self.apply(&actions)?;
            outcome.actions.extend(actions);
        }

        let actions = self.orchestrator.check_timeout(Instant::now());
        self.apply(&actions)?;
        outcome.actions.extend(actions);

        Ok(outcome)
    }

    /// Send `command` and wait for the first decoded response.
    pub fn request(&mut self, command: &Command, timeout: Duration) -> Result<Response> {
        self.send_command(command)?;
        let deadline = Instant::now() + timeout;
        loop {
            let outcome = self.poll()?;
            if let Some(response) = outcome.events.into_iter().find_map(|e| match e {
                ProtocolEvent::Response(r) => Some(r),
                _ => None,
            }) {
                return Ok(response);
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(timeout));
            }
        }
    }

    /// Poll until the bootloader announces itself.
    pub fn wait_for_cpu_update_mode(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while !self.orchestrator.update_enabled() {
            if Instant::now() >= deadline {
                return Err(Error::Timeout(timeout));
            }
            self.poll()?;
        }
        Ok(())
    }

    /// Validate `image` and send its header packet.
    pub fn start_update(&mut self, image: FirmwareImage, target: UpdateTarget) -> Result<()> {
        let actions = self
            .orchestrator
            .start_update(image, target, Instant::now())?;
        self.apply(&actions)
    }

    /// Transfer `image` to a scanner in CPU update mode.
    ///
    /// `progress` receives `(offset, image_size)` after every packet.
    /// Returns once the scanner reports completion, or with the error that
    /// aborted the transfer.
    pub fn run_update(
        &mut self,
        image: FirmwareImage,
        target: UpdateTarget,
        progress: &mut dyn FnMut(usize, u32),
    ) -> Result<()> {
        self.start_update(image, target)?;
        if let Some((offset, total)) = self.orchestrator.progress() {
            progress(offset, total);
        }

        loop {
            for action in self.poll()?.actions {
                match action {
                    UpdateAction::Progress { offset, total } => progress(offset, total),
                    UpdateAction::Completed => return Ok(()),
                    UpdateAction::Failed(failure) => return Err(failure.into()),
                    UpdateAction::Send(_) | UpdateAction::CloseTransport => {},
                }
            }
        }
    }

    fn apply(&mut self, actions: &[UpdateAction]) -> Result<()> {
        for action in actions {
            match action {
                UpdateAction::Send(frame) => {
                    if self.port.is_open() {
                        self.write(frame)?;
                    } else {
                        debug!("Port closed, dropping {} byte frame", frame.len());
                    }
                },
                UpdateAction::CloseTransport => self.port.close()?,
                _ => {},
            }
        }
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.protocol_debug {
            trace!("{}", format_traffic(bytes, Direction::Tx));
        }
        self.port.write_all_bytes(bytes)
    }
}
