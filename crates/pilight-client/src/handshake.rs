use pilight_protocol::{ClientMessage, Envelope, encode_line};
use tracing::debug;

use crate::errors::ChannelError;
use crate::transport::Channel;

/// Run the daemon's identification exchange on a freshly opened channel.
///
/// Writes `request` as one line, reads one reply line within the channel's
/// read timeout and accepts only `{"status":"success"}`. Event frames that
/// arrive in the same read as the reply stay buffered on the channel.
pub(crate) fn identify(channel: &mut Channel, request: &ClientMessage) -> Result<(), ChannelError> {
    let frame = encode_line(request)?;
    channel.write_frame(&frame)?;

    let line = channel.read_line()?;
    let reply = Envelope::parse(&line)?;
    if !reply.is_success() {
        return Err(ChannelError::Rejected {
            status: reply.status().map(str::to_string),
        });
    }

    debug!(event = "client.handshake.accepted", role = %channel.role());
    Ok(())
}
