use std::io;

use crate::transport::Role;

/// Errors surfaced to callers of the client engine.
///
/// Transient conditions (read timeouts, malformed frames, lost heartbeats)
/// are absorbed by the background loops and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection to pilight daemon at {endpoint} rejected on {role} channel: {reason}")]
    ConnectionRejected {
        role: Role,
        endpoint: String,
        reason: String,
    },

    #[error("Invalid command: {message}")]
    InvalidCommand { message: String },

    #[error("Failed to send code to pilight daemon: {reason}")]
    SendFailed { reason: String },

    #[error("Code was not acknowledged by the pilight daemon: {reason}")]
    AcknowledgmentMissing { reason: String },

    #[error("No event handler registered. Call set_handler() before start()")]
    HandlerMissing,

    #[error("Client is already started")]
    AlreadyStarted,

    #[error("Client is stopped")]
    Stopped,

    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Stable error code string for logs and callers.
    pub fn error_code(&self) -> &'static str {
        match self {
            ClientError::ConnectionRejected { .. } => "CONNECTION_REJECTED",
            ClientError::InvalidCommand { .. } => "INVALID_COMMAND",
            ClientError::SendFailed { .. } => "SEND_FAILED",
            ClientError::AcknowledgmentMissing { .. } => "ACKNOWLEDGMENT_MISSING",
            ClientError::HandlerMissing => "HANDLER_MISSING",
            ClientError::AlreadyStarted => "ALREADY_STARTED",
            ClientError::Stopped => "CLIENT_STOPPED",
            ClientError::ThreadSpawn { .. } => "THREAD_SPAWN_FAILED",
            ClientError::Config(_) => "CONFIG_INVALID",
        }
    }

    /// Whether this error is caused by how the client was used rather than
    /// by the daemon or the network.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidCommand { .. }
                | ClientError::HandlerMissing
                | ClientError::AlreadyStarted
                | ClientError::Stopped
                | ClientError::Config(_)
        )
    }
}

/// Failure of a single operation on one channel.
///
/// Internal to the engine: each caller decides whether it is transient
/// (receiver idle, watchdog retry) or gets mapped into a [`ClientError`].
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("read timed out")]
    Timeout,

    #[error("connection closed by peer")]
    Closed,

    #[error("channel is not connected")]
    Unavailable,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed frame: {message}")]
    Malformed { message: String },

    #[error("daemon replied with status {status:?}")]
    Rejected { status: Option<String> },

    #[error("unexpected reply: {reply}")]
    UnexpectedReply { reply: String },
}

impl ChannelError {
    /// Classify an I/O error, folding read timeouts into [`ChannelError::Timeout`].
    pub fn from_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ChannelError::Timeout,
            io::ErrorKind::UnexpectedEof => ChannelError::Closed,
            _ => ChannelError::Io(e),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ChannelError::Timeout)
    }
}

impl From<pilight_protocol::ProtocolError> for ChannelError {
    fn from(e: pilight_protocol::ProtocolError) -> Self {
        ChannelError::Malformed {
            message: e.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse config file: {message}")]
    ConfigParseError { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("IO error reading config: {source}")]
    IoError {
        #[from]
        source: io::Error,
    },
}
