//! Command sender and the shared command channel.

use std::sync::{Arc, Mutex, PoisonError};

use pilight_protocol::{ClientMessage, Envelope, Status, encode_line};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::errors::{ChannelError, ClientError};
use crate::state::EngineContext;
use crate::transport::{Channel, Role};

/// The command channel, shared by the sender and the watchdog.
///
/// Every exchange runs inside [`CommandChannel::transact`], which holds the
/// lock from the first write to the last read so a reply can never be read
/// by the wrong request.
#[derive(Debug, Clone)]
pub(crate) struct CommandChannel(Arc<Mutex<Option<Channel>>>);

impl CommandChannel {
    pub(crate) fn new(channel: Channel) -> Self {
        Self(Arc::new(Mutex::new(Some(channel))))
    }

    /// Run one request/response exchange with exclusive access to the slot.
    ///
    /// The slot is `None` after a failed rebuild.
    pub(crate) fn transact<T>(&self, exchange: impl FnOnce(&mut Option<Channel>) -> T) -> T {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        exchange(&mut slot)
    }

    /// Remove the channel for teardown.
    pub(crate) fn take(&self) -> Option<Channel> {
        self.transact(Option::take)
    }
}

/// Check that `data` is a code object carrying a `protocol` key.
fn validate(data: &Value) -> Result<Map<String, Value>, ClientError> {
    let Some(code) = data.as_object() else {
        return Err(ClientError::InvalidCommand {
            message: format!("code must be a JSON object, got: {}", data),
        });
    };
    if !code.contains_key("protocol") {
        return Err(ClientError::InvalidCommand {
            message: format!("code does not contain a protocol: {}", data),
        });
    }
    Ok(code.clone())
}

/// Send a code to the daemon, optionally waiting for its acknowledgment.
///
/// A failed write, or a command channel the daemon has already closed,
/// triggers exactly one reconnect and one retry; a second failure is
/// [`ClientError::SendFailed`]. Without
/// `acknowledge` the call returns once the frame is written.
pub(crate) fn send_code(
    command: &CommandChannel,
    ctx: &EngineContext,
    data: &Value,
    acknowledge: bool,
) -> Result<(), ClientError> {
    let code = validate(data)?;
    let protocol = code.get("protocol").cloned().unwrap_or(Value::Null);
    let frame = encode_line(&ClientMessage::send(code)).map_err(|e| ClientError::InvalidCommand {
        message: e.to_string(),
    })?;

    info!(
        event = "client.sender.send_started",
        protocol = %protocol,
        acknowledge = acknowledge,
    );

    let result = command.transact(|slot| {
        write_with_retry(slot, ctx, &frame)?;
        if acknowledge {
            await_acknowledgment(slot)
        } else {
            Ok(())
        }
    });

    match &result {
        Ok(()) => info!(event = "client.sender.send_completed", protocol = %protocol),
        Err(e) => warn!(
            event = "client.sender.send_failed",
            protocol = %protocol,
            error = %e,
            error_code = e.error_code(),
        ),
    }
    result
}

fn write_with_retry(
    slot: &mut Option<Channel>,
    ctx: &EngineContext,
    frame: &[u8],
) -> Result<(), ClientError> {
    let first = match slot.as_mut() {
        Some(channel) => channel.discard_pending().and_then(|stale| {
            if stale > 0 {
                debug!(event = "client.sender.stale_bytes_discarded", bytes = stale);
            }
            channel.write_frame(frame)
        }),
        None => Err(ChannelError::Unavailable),
    };

    let Err(first_err) = first else {
        return Ok(());
    };

    warn!(event = "client.sender.write_failed", error = %first_err);
    ctx.state.mark_down(Role::Command);
    if ctx.backoff() {
        return Err(ClientError::Stopped);
    }

    ctx.manager
        .rebuild_command_channel(slot)
        .map_err(|e| ClientError::SendFailed {
            reason: format!("reconnect after write error ({}) failed: {}", first_err, e),
        })?;
    ctx.state.mark_up(Role::Command);

    let channel = slot.as_mut().ok_or(ClientError::SendFailed {
        reason: "command channel unavailable after reconnect".to_string(),
    })?;
    channel
        .write_frame(frame)
        .map_err(|e| ClientError::SendFailed {
            reason: format!("retry after reconnect failed: {}", e),
        })
}

/// Read one reply burst and look for a `{"status":"success"}` frame in it.
fn await_acknowledgment(slot: &mut Option<Channel>) -> Result<(), ClientError> {
    let channel = slot.as_mut().ok_or(ClientError::AcknowledgmentMissing {
        reason: "command channel closed".to_string(),
    })?;

    let first = channel
        .read_line()
        .map_err(|e| ClientError::AcknowledgmentMissing {
            reason: format!("no reply from daemon: {}", e),
        })?;

    let mut frames = vec![first];
    frames.extend(channel.drain_lines());

    let statuses: Vec<Status> = frames
        .iter()
        .filter_map(|line| Envelope::parse(line).ok())
        .filter_map(|reply| reply.reply_status())
        .collect();

    if statuses.contains(&Status::Success) {
        return Ok(());
    }
    let reason = if statuses.contains(&Status::Failure) {
        format!("daemon refused the code: {}", frames.join(" "))
    } else {
        format!("daemon replied: {}", frames.join(" "))
    };
    Err(ClientError::AcknowledgmentMissing { reason })
}
