//! Firmware update orchestration.
//!
//! [`UpdateOrchestrator`] turns the scanner's handshake signals into packet
//! transfers. It performs no I/O of its own: every handler returns the
//! [`UpdateAction`]s the caller must carry out, in order. The
//! communications timeout is a deadline checked with
//! [`UpdateOrchestrator::check_timeout`], so the whole state machine runs on
//! the caller's thread without blocking.
//!
//! ```text
//!   Idle ──CCC──► CpuUpdateMode ──start_update──► (header sent)
//!                      │
//!                     ENQ
//!                      ▼
//!               UpdateInProgress ──ACK──► next packet
//!                      │  ▲
//!                     NAK └─ resend (max_retries)
//!                      │
//!          EOT ► UpdateDone      CAN / timeout / retries ► UpdateError
//! ```

use crate::error::{Error, Result};
use crate::image::FirmwareImage;
use crate::protocol::frame::{self, Signal};
use crate::protocol::parser::ProtocolEvent;
use crate::protocol::response::Response;
use crate::target::UpdateTarget;
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};

/// Default communications timeout.
pub const DEFAULT_COMMS_TIMEOUT: Duration = Duration::from_secs(3);

/// Default number of re-sends of a rejected packet.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Update session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UpdateState {
    /// Application firmware running, no update possible.
    #[default]
    Idle,
    /// Bootloader announced itself and waits for a firmware image.
    CpuUpdateMode,
    /// Packets are being transferred.
    UpdateInProgress,
    /// Transfer complete, scanner is rebooting.
    UpdateDone,
    /// Transfer aborted.
    UpdateError,
}

/// Orchestrator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateConfig {
    /// Time allowed between handshake signals.
    pub comms_timeout: Duration,
    /// Re-sends allowed for a rejected packet before aborting.
    pub max_retries: u32,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            comms_timeout: DEFAULT_COMMS_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl UpdateConfig {
    /// Set the communications timeout.
    #[must_use]
    pub fn with_comms_timeout(mut self, timeout: Duration) -> Self {
        self.comms_timeout = timeout;
        self
    }

    /// Set the retry ceiling.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Reject settings the handshake cannot run with.
    ///
    /// A zero communications timeout would expire before the scanner could
    /// answer the first packet.
    pub fn validate(&self) -> Result<()> {
        if self.comms_timeout.is_zero() {
            return Err(Error::Config(
                "communications timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Why a transfer was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateFailure {
    /// The scanner sent CAN.
    Cancelled,
    /// No handshake signal within the communications timeout.
    Timeout(Duration),
    /// The same packet was rejected too many times.
    RetryExhausted {
        /// Consecutive rejections seen.
        attempts: u32,
    },
}

impl From<UpdateFailure> for Error {
    fn from(failure: UpdateFailure) -> Self {
        match failure {
            UpdateFailure::Cancelled => Self::Cancelled,
            UpdateFailure::Timeout(after) => Self::Timeout(after),
            UpdateFailure::RetryExhausted { attempts } => Self::RetryExhausted { attempts },
        }
    }
}

/// Work the caller must carry out on behalf of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateAction {
    /// Write this complete frame to the transport.
    Send(Vec<u8>),
    /// Transfer progress, in image bytes.
    Progress {
        /// Bytes handed to the scanner so far.
        offset: usize,
        /// Total image size.
        total: u32,
    },
    /// Close the transport.
    CloseTransport,
    /// The scanner accepted the whole image and is rebooting.
    Completed,
    /// The transfer was aborted.
    Failed(UpdateFailure),
}

/// Drives one scanner through a firmware update.
#[derive(Debug, Default)]
pub struct UpdateOrchestrator {
    config: UpdateConfig,
    state: UpdateState,
    image: Option<FirmwareImage>,
    pending: Option<Vec<u8>>,
    nak_count: u32,
    deadline: Option<Instant>,
    scanner_on: Option<bool>,
}

impl UpdateOrchestrator {
    /// Create an orchestrator in the `Idle` state.
    pub fn new(config: UpdateConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Forget any transfer and return to `Idle`, keeping the settings.
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    /// Current session state.
    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Orchestrator settings.
    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Whether an update may be started now.
    pub fn update_enabled(&self) -> bool {
        self.state == UpdateState::CpuUpdateMode
    }

    /// Last power status reported by the application firmware.
    pub fn scanner_on(&self) -> Option<bool> {
        self.scanner_on
    }

    /// Consecutive rejections of the pending packet.
    pub fn nak_count(&self) -> u32 {
        self.nak_count
    }

    /// Packet awaiting acknowledgement, unframed.
    pub fn pending_packet(&self) -> Option<&[u8]> {
        self.pending.as_deref()
    }

    /// When the communications timeout expires, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Transfer progress as `(offset, image_size)`.
    pub fn progress(&self) -> Option<(usize, u32)> {
        self.image
            .as_ref()
            .map(|image| (image.offset(), image.image_size()))
    }

    /// Dispatch a parser event.
    pub fn handle_event(&mut self, event: &ProtocolEvent, now: Instant) -> Vec<UpdateAction> {
        match event {
            ProtocolEvent::Signal(signal) => self.on_signal(*signal, now),
            ProtocolEvent::CpuUpdateMode => {
                self.on_cpu_update_mode();
                Vec::new()
            },
            ProtocolEvent::Response(Response::PowerStatus(on)) => {
                self.on_power_status(*on);
                Vec::new()
            },
            _ => Vec::new(),
        }
    }

    /// The bootloader announced itself.
    pub fn on_cpu_update_mode(&mut self) {
        info!("Scanner is in CPU update mode");
        self.state = UpdateState::CpuUpdateMode;
    }

    /// The application firmware reported its power status.
    pub fn on_power_status(&mut self, on: bool) {
        info!("Scanner is {}", if on { "on" } else { "off" });
        self.scanner_on = Some(on);
        self.state = UpdateState::Idle;
    }

    /// Validate `image` against `target` and send the header packet.
    ///
    /// The image platform must equal the target firmware family. When the
    /// scanner model differs from that family the image is transcoded
    /// first. Capability failures leave the orchestrator in
    /// `CpuUpdateMode`, ready for another attempt.
    pub fn start_update(
        &mut self,
        mut image: FirmwareImage,
        target: UpdateTarget,
        now: Instant,
    ) -> Result<Vec<UpdateAction>> {
        if self.state != UpdateState::CpuUpdateMode {
            return Err(Error::InvalidState(format!(
                "scanner is not in CPU update mode ({:?})",
                self.state
            )));
        }

        if image.platform() != target.firmware {
            return Err(Error::Unsupported(format!(
                "wrong firmware file: image is for {}, expected {}",
                image.platform(),
                target.firmware
            )));
        }

        if target.needs_transcode() {
            image.transcode(target.scanner).map_err(|e| {
                warn!("Transcode to {} failed: {e}", target.scanner);
                e
            })?;
        }

        let header = image.first_packet();
        let frame = frame::encode(&header)?;
        let progress = UpdateAction::Progress {
            offset: image.offset(),
            total: image.image_size(),
        };
        info!(
            "Starting update: {} image, {} bytes",
            image.platform(),
            image.image_size()
        );

        self.image = Some(image);
        self.nak_count = 0;
        self.arm(now);
        Ok(vec![UpdateAction::Send(frame), progress])
    }

    /// React to a handshake signal.
    pub fn on_signal(&mut self, signal: Signal, now: Instant) -> Vec<UpdateAction> {
        match signal {
            Signal::Enq => self.on_enq(now),
            Signal::Ack => self.on_ack(now),
            Signal::Dle => {
                info!("CPU update wait");
                if self.image.is_some() {
                    self.arm(now);
                }
                self.nak_count = 0;
                Vec::new()
            },
            Signal::Nak => self.on_nak(now),
            Signal::Eot => self.on_eot(),
            Signal::Can => {
                error!("Scanner cancelled the update");
                self.abort(UpdateFailure::Cancelled)
            },
        }
    }

    /// Abort the transfer if the communications timeout has expired.
    pub fn check_timeout(&mut self, now: Instant) -> Vec<UpdateAction> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                error!(
                    "No response from scanner within {:?}",
                    self.config.comms_timeout
                );
                self.abort(UpdateFailure::Timeout(self.config.comms_timeout))
            },
            _ => Vec::new(),
        }
    }

    fn on_enq(&mut self, now: Instant) -> Vec<UpdateAction> {
        self.stop();
        let mut actions = Vec::new();

        if self.state == UpdateState::CpuUpdateMode {
            if self.image.is_none() {
                debug!("ENQ before an update was started, ignoring");
            } else {
                info!("CPU is updating");
                self.send_next(&mut actions);
                self.arm(now);
                self.state = UpdateState::UpdateInProgress;
            }
        }

        self.nak_count = 0;
        actions
    }

    fn on_ack(&mut self, now: Instant) -> Vec<UpdateAction> {
        self.stop();
        let mut actions = Vec::new();

        if self.state == UpdateState::UpdateInProgress {
            self.send_next(&mut actions);
            self.arm(now);
        }

        self.nak_count = 0;
        actions
    }

    fn on_nak(&mut self, now: Instant) -> Vec<UpdateAction> {
        self.stop();

        if self.state != UpdateState::UpdateInProgress {
            return Vec::new();
        }
        let Some(packet) = self.pending.as_deref() else {
            return Vec::new();
        };

        self.nak_count += 1;
        if self.nak_count > self.config.max_retries {
            error!("Packet rejected {} times, giving up", self.nak_count);
            let attempts = self.nak_count;
            self.pending = None;
            self.image = None;
            self.state = UpdateState::UpdateError;
            return vec![UpdateAction::Failed(UpdateFailure::RetryExhausted {
                attempts,
            })];
        }

        warn!("Packet rejected, resending ({})", self.nak_count);
        let actions = match frame::encode(packet) {
            Ok(frame) => vec![UpdateAction::Send(frame)],
            Err(e) => {
                error!("Cannot frame pending packet: {e}");
                Vec::new()
            },
        };
        self.arm(now);
        actions
    }

    fn on_eot(&mut self) -> Vec<UpdateAction> {
        self.stop();
        info!("CPU update complete, reconnect after the scanner reboots");
        self.pending = None;
        self.image = None;
        self.state = UpdateState::UpdateDone;
        self.nak_count = 0;
        vec![UpdateAction::CloseTransport, UpdateAction::Completed]
    }

    fn abort(&mut self, failure: UpdateFailure) -> Vec<UpdateAction> {
        self.stop();
        self.pending = None;
        self.image = None;
        self.state = UpdateState::UpdateError;
        vec![
            UpdateAction::CloseTransport,
            UpdateAction::Failed(failure),
        ]
    }

    /// Pull the next packet into `pending` and queue it for sending.
    fn send_next(&mut self, actions: &mut Vec<UpdateAction>) {
        let Some(image) = self.image.as_mut() else {
            self.pending = None;
            return;
        };

        self.pending = image.next_packet();
        match self.pending.as_deref().map(frame::encode) {
            Some(Ok(frame)) => {
                actions.push(UpdateAction::Send(frame));
                actions.push(UpdateAction::Progress {
                    offset: image.offset(),
                    total: image.image_size(),
                });
            },
            Some(Err(e)) => error!("Cannot frame packet: {e}"),
            None => debug!("All packets sent, waiting for EOT"),
        }
    }

    fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.config.comms_timeout);
    }

    fn stop(&mut self) {
        self.deadline = None;
    }
}
