//! TCP transport: one stream per channel, bounded reads, no protocol knowledge
//! beyond newline framing.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use pilight_protocol::LineBuffer;
use tracing::{debug, warn};

use crate::errors::ChannelError;

const READ_CHUNK: usize = 4096;

/// RAII guard that puts a stream in non-blocking mode and restores blocking
/// mode on drop.
struct NonblockingGuard<'a> {
    stream: &'a TcpStream,
}

impl<'a> NonblockingGuard<'a> {
    fn enter(stream: &'a TcpStream) -> std::io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self { stream })
    }
}

impl Drop for NonblockingGuard<'_> {
    fn drop(&mut self) {
        let _ = self.stream.set_nonblocking(false);
    }
}

/// Address of the daemon, shared by both channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Which of the two daemon connections a channel serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Outbound `send` requests and heartbeat probes.
    Command,
    /// Inbound notifications pushed by the daemon.
    Event,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Command => write!(f, "command"),
            Role::Event => write!(f, "event"),
        }
    }
}

/// An open connection to the daemon plus its line assembly state.
///
/// Every read is bounded by `read_timeout`. Bytes after the last newline stay
/// buffered for the next read.
#[derive(Debug)]
pub(crate) struct Channel {
    stream: TcpStream,
    role: Role,
    read_timeout: Duration,
    lines: LineBuffer,
}

impl Channel {
    /// Open a TCP connection to `endpoint`, trying each resolved address in turn.
    pub(crate) fn connect(
        endpoint: &Endpoint,
        role: Role,
        read_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let addrs = (endpoint.host(), endpoint.port())
            .to_socket_addrs()
            .map_err(ChannelError::Io)?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, endpoint.connect_timeout()) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(read_timeout))?;
                    stream.set_write_timeout(Some(read_timeout))?;
                    stream.set_nodelay(true)?;
                    debug!(
                        event = "client.transport.connected",
                        role = %role,
                        addr = %addr,
                    );
                    return Ok(Self {
                        stream,
                        role,
                        read_timeout,
                        lines: LineBuffer::new(),
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.map_or(ChannelError::Unavailable, ChannelError::Io))
    }

    pub(crate) fn role(&self) -> Role {
        self.role
    }

    /// Write one complete frame and flush it.
    pub(crate) fn write_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        self.stream
            .write_all(frame)
            .and_then(|()| self.stream.flush())
            .map_err(ChannelError::from_io)
    }

    /// One bounded read into the line buffer. Returns the byte count.
    fn read_once(&mut self) -> Result<usize, ChannelError> {
        let mut buf = [0u8; READ_CHUNK];
        match self.stream.read(&mut buf) {
            Ok(0) => Err(ChannelError::Closed),
            Ok(n) => {
                let dropped_before = self.lines.dropped_frames();
                self.lines.push(&buf[..n]);
                if self.lines.dropped_frames() > dropped_before {
                    warn!(
                        event = "client.transport.oversized_frame_dropped",
                        role = %self.role,
                        dropped_total = self.lines.dropped_frames(),
                    );
                }
                Ok(n)
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(ChannelError::from_io(e)),
        }
    }

    /// Return buffered lines, or perform one bounded read and return whatever
    /// lines it completed (possibly none).
    pub(crate) fn poll_lines(&mut self) -> Result<Vec<String>, ChannelError> {
        if !self.lines.has_line() {
            self.read_once()?;
        }
        Ok(self.lines.drain_lines())
    }

    /// Read until one complete line is available or the read timeout elapses.
    pub(crate) fn read_line(&mut self) -> Result<String, ChannelError> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            if let Some(line) = self.lines.next_line() {
                return Ok(line);
            }
            self.read_once()?;
            if !self.lines.has_line() && Instant::now() >= deadline {
                return Err(ChannelError::Timeout);
            }
        }
    }

    /// Complete lines already buffered, without touching the socket.
    pub(crate) fn drain_lines(&mut self) -> Vec<String> {
        self.lines.drain_lines()
    }

    /// Drop bytes left over from an earlier exchange: whatever is buffered
    /// here plus whatever is already waiting in the socket. Never blocks.
    ///
    /// Returns the number of bytes dropped, or [`ChannelError::Closed`] if the
    /// peer has already closed the connection.
    pub(crate) fn discard_pending(&mut self) -> Result<usize, ChannelError> {
        let mut discarded = self.lines.pending_len();
        self.lines.clear();

        let _guard = NonblockingGuard::enter(&self.stream)?;
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match (&self.stream).read(&mut buf) {
                Ok(0) => return Err(ChannelError::Closed),
                Ok(n) => discarded += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(ChannelError::from_io(e)),
            }
        }
        Ok(discarded)
    }

    /// Shut down both directions, then close. Errors are ignored.
    pub(crate) fn shutdown(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        debug!(event = "client.transport.closed", role = %self.role);
    }
}
