//! Channel lifecycle: open, identify, rebuild.

use std::time::Duration;

use pilight_protocol::{ClientMessage, IdentifyOptions};
use tracing::{debug, error, info, warn};

use crate::errors::{ChannelError, ClientError};
use crate::handshake;
use crate::transport::{Channel, Endpoint, Role};

/// Opens identified channels to one daemon endpoint.
///
/// Holds everything needed to recreate either channel, so the watchdog and
/// the receiver can rebuild without going back to the caller.
#[derive(Debug)]
pub(crate) struct ConnectionManager {
    endpoint: Endpoint,
    read_timeout: Duration,
    sender_ident: ClientMessage,
    receiver_ident: ClientMessage,
}

impl ConnectionManager {
    pub(crate) fn new(
        endpoint: Endpoint,
        read_timeout: Duration,
        receiver_options: IdentifyOptions,
    ) -> Self {
        Self {
            endpoint,
            read_timeout,
            sender_ident: ClientMessage::identify(IdentifyOptions::sender()),
            receiver_ident: ClientMessage::identify(receiver_options),
        }
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn identification(&self, role: Role) -> &ClientMessage {
        match role {
            Role::Command => &self.sender_ident,
            Role::Event => &self.receiver_ident,
        }
    }

    /// Connect and run the handshake for `role`. The socket is closed if the
    /// handshake fails.
    pub(crate) fn open(&self, role: Role) -> Result<Channel, ChannelError> {
        let mut channel = Channel::connect(&self.endpoint, role, self.read_timeout)?;
        match handshake::identify(&mut channel, self.identification(role)) {
            Ok(()) => Ok(channel),
            Err(e) => {
                channel.shutdown();
                Err(e)
            }
        }
    }

    /// Open both channels for a new engine, command first.
    ///
    /// Either failure is fatal and leaves no socket open.
    pub(crate) fn open_both(&self) -> Result<(Channel, Channel), ClientError> {
        info!(
            event = "client.connection.open_started",
            endpoint = %self.endpoint,
        );

        let command = self
            .open(Role::Command)
            .map_err(|e| self.rejected(Role::Command, e))?;

        let event = match self.open(Role::Event) {
            Ok(channel) => channel,
            Err(e) => {
                command.shutdown();
                return Err(self.rejected(Role::Event, e));
            }
        };

        info!(
            event = "client.connection.open_completed",
            endpoint = %self.endpoint,
        );
        Ok((command, event))
    }

    fn rejected(&self, role: Role, e: ChannelError) -> ClientError {
        error!(
            event = "client.connection.open_failed",
            endpoint = %self.endpoint,
            role = %role,
            error = %e,
        );
        ClientError::ConnectionRejected {
            role,
            endpoint: self.endpoint.to_string(),
            reason: e.to_string(),
        }
    }

    /// Close whatever is in `slot` (best effort), then reopen and re-identify.
    ///
    /// On failure `slot` is left empty; the next rebuild opens from scratch.
    pub(crate) fn rebuild(&self, slot: &mut Option<Channel>, role: Role) -> Result<(), ChannelError> {
        if let Some(old) = slot.take() {
            old.shutdown();
        }

        debug!(event = "client.connection.rebuild_started", role = %role);
        match self.open(role) {
            Ok(channel) => {
                *slot = Some(channel);
                info!(event = "client.connection.rebuild_completed", role = %role);
                Ok(())
            }
            Err(e) => {
                warn!(
                    event = "client.connection.rebuild_failed",
                    role = %role,
                    error = %e,
                );
                Err(e)
            }
        }
    }

    pub(crate) fn rebuild_command_channel(&self, slot: &mut Option<Channel>) -> Result<(), ChannelError> {
        self.rebuild(slot, Role::Command)
    }

    pub(crate) fn rebuild_event_channel(&self, slot: &mut Option<Channel>) -> Result<(), ChannelError> {
        self.rebuild(slot, Role::Event)
    }
}
