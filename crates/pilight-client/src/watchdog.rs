//! Liveness watchdog on the command channel.
//!
//! Every tick it writes `HEART` and expects a line starting with `BEAT`. When
//! the probe fails it backs off once and rebuilds both channels, command
//! first. Rebuild failures are never escalated; the next tick tries again,
//! and an event channel that could not be rebuilt is retried on every tick
//! until the receiver has one.

use std::sync::mpsc;
use std::time::Duration;

use pilight_protocol::{HEARTBEAT_ACK, HEARTBEAT_PROBE};
use tracing::{debug, info, warn};

use crate::errors::ChannelError;
use crate::sender::CommandChannel;
use crate::state::EngineContext;
use crate::transport::{Channel, Role};

pub(crate) struct Watchdog {
    command: CommandChannel,
    /// Hands rebuilt event channels to the receiver.
    replacements: mpsc::Sender<Channel>,
    interval: Duration,
    ctx: EngineContext,
    /// Set while an event channel rebuild is owed to the receiver.
    event_rebuild_pending: bool,
}

impl Watchdog {
    pub(crate) fn new(
        command: CommandChannel,
        replacements: mpsc::Sender<Channel>,
        interval: Duration,
        ctx: EngineContext,
    ) -> Self {
        Self {
            command,
            replacements,
            interval,
            ctx,
            event_rebuild_pending: false,
        }
    }

    pub(crate) fn run(mut self) {
        info!(
            event = "client.watchdog.started",
            interval_ms = self.interval.as_millis() as u64,
        );

        while !self.ctx.pause(self.interval) {
            match self.probe() {
                Ok(()) => {
                    debug!(event = "client.watchdog.probe_completed");
                    if self.event_rebuild_pending {
                        self.retry_event_channel();
                    }
                }
                Err(e) => {
                    warn!(event = "client.watchdog.liveness_lost", error = %e);
                    self.ctx.state.mark_down(Role::Command);
                    if self.ctx.backoff() {
                        break;
                    }
                    self.rebuild_channels();
                }
            }
        }

        info!(event = "client.watchdog.stopped");
    }

    /// One probe round-trip under the command channel lock.
    fn probe(&self) -> Result<(), ChannelError> {
        self.command.transact(|slot| {
            let channel = slot.as_mut().ok_or(ChannelError::Unavailable)?;
            channel.discard_pending()?;
            channel.write_frame(HEARTBEAT_PROBE)?;
            let reply = channel.read_line()?;
            if reply.starts_with(HEARTBEAT_ACK) {
                Ok(())
            } else {
                Err(ChannelError::UnexpectedReply { reply })
            }
        })
    }

    fn rebuild_channels(&mut self) {
        let command_rebuilt = self
            .command
            .transact(|slot| self.ctx.manager.rebuild_command_channel(slot));
        if command_rebuilt.is_err() {
            return;
        }
        self.ctx.state.mark_up(Role::Command);

        self.ctx.state.mark_down(Role::Event);
        self.event_rebuild_pending = true;
        self.rebuild_event_channel();
    }

    /// A later tick after a failed event rebuild. The receiver may have
    /// recovered the channel on its own in the meantime.
    fn retry_event_channel(&mut self) {
        if !self.ctx.state.is_down(Role::Event) {
            debug!(event = "client.watchdog.event_rebuild_skipped");
            self.event_rebuild_pending = false;
            return;
        }
        self.rebuild_event_channel();
    }

    fn rebuild_event_channel(&mut self) {
        match self.ctx.manager.open(Role::Event) {
            Ok(channel) => {
                self.event_rebuild_pending = false;
                if self.replacements.send(channel).is_ok() {
                    self.ctx.state.mark_up(Role::Event);
                    info!(event = "client.watchdog.reconnect_completed");
                }
            }
            Err(e) => warn!(
                event = "client.watchdog.event_rebuild_failed",
                error = %e,
            ),
        }
    }
}
