//! Line framing for the daemon's newline-delimited stream.
//!
//! A single socket read may return zero, one or several frames, and the last
//! one may be cut short. [`LineBuffer`] keeps the unterminated tail between
//! reads so a frame split across two reads is still delivered whole.

use std::collections::VecDeque;

use crate::{ClientMessage, ProtocolError};

/// Liveness probe written to the command connection. Not JSON.
pub const HEARTBEAT_PROBE: &[u8] = b"HEART\n";

/// Prefix of the daemon's reply to [`HEARTBEAT_PROBE`].
pub const HEARTBEAT_ACK: &str = "BEAT";

/// Largest unterminated tail kept between reads. A longer tail is discarded.
pub const MAX_PARTIAL_FRAME: usize = 1024 * 1024;

/// Serialize a frame as compact JSON followed by `\n`.
pub fn encode_line(msg: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut line = serde_json::to_vec(msg).map_err(ProtocolError::Serialize)?;
    line.push(b'\n');
    Ok(line)
}

/// Accumulates raw bytes and yields complete, non-empty lines in arrival order.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: Vec<u8>,
    complete: VecDeque<String>,
    dropped: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes from one read, splitting off every completed line.
    pub fn push(&mut self, bytes: &[u8]) {
        let mut rest = bytes;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.partial.extend_from_slice(&rest[..pos]);
            self.finish_line();
            rest = &rest[pos + 1..];
        }
        self.partial.extend_from_slice(rest);

        if self.partial.len() > MAX_PARTIAL_FRAME {
            self.partial.clear();
            self.dropped += 1;
        }
    }

    fn finish_line(&mut self) {
        let raw = std::mem::take(&mut self.partial);
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches('\r');
        if !line.trim().is_empty() {
            self.complete.push_back(line.to_string());
        }
    }

    /// Pop the oldest complete line.
    pub fn next_line(&mut self) -> Option<String> {
        self.complete.pop_front()
    }

    /// Take every complete line, oldest first.
    pub fn drain_lines(&mut self) -> Vec<String> {
        self.complete.drain(..).collect()
    }

    pub fn has_line(&self) -> bool {
        !self.complete.is_empty()
    }

    /// Bytes buffered but not yet returned, complete lines included.
    pub fn pending_len(&self) -> usize {
        self.partial.len() + self.complete.iter().map(String::len).sum::<usize>()
    }

    /// Number of oversized partial frames discarded so far.
    pub fn dropped_frames(&self) -> usize {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.partial.clear();
        self.complete.clear();
    }
}
