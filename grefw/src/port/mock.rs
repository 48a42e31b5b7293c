//! In-memory port for exercising sessions without hardware.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use crate::error::Result;
use crate::port::Port;

/// Scripted scanner stand-in.
///
/// Bytes queued with [`MockPort::push_input`] are available to read
/// immediately. Replies queued with [`MockPort::queue_reply`] are released
/// one per write, so a script can answer each request in turn.
#[derive(Debug, Default)]
pub struct MockPort {
    input: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    closed: bool,
}

impl MockPort {
    /// Create an empty mock port.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make bytes available to read now.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    /// Queue bytes to become readable after the next write.
    pub fn queue_reply(&mut self, bytes: &[u8]) {
        self.replies.push_back(bytes.to_vec());
    }

    /// Every write so far, one entry per call.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// Forget recorded writes.
    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// Replies not yet released.
    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        if self.input.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.input.len());
        for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        self.writes.push(buf.to_vec());
        if let Some(reply) = self.replies.pop_front() {
            self.input.extend(reply);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn clear_buffers(&mut self) -> Result<()> {
        self.input.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn is_open(&self) -> bool {
        !self.closed
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
