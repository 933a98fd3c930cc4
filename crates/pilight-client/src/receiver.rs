//! Event receiver loop on the event channel.
//!
//! Owns the event channel outright. Reads are bounded by the channel timeout,
//! which doubles as the stop-check interval. Handlers run on this thread in
//! arrival order, so a slow handler backpressures the socket.

use std::sync::mpsc;

use pilight_protocol::Envelope;
use tracing::{debug, info, trace, warn};

use crate::filter::FilterPolicy;
use crate::state::EngineContext;
use crate::transport::{Channel, Role};

/// Callback invoked once per accepted event notification.
pub(crate) type EventHandler = Box<dyn FnMut(Envelope) + Send + 'static>;

pub(crate) struct EventReceiver {
    channel: Option<Channel>,
    /// Channels rebuilt by the watchdog, swapped in at the next tick.
    replacements: mpsc::Receiver<Channel>,
    policy: FilterPolicy,
    handler: EventHandler,
    ctx: EngineContext,
}

impl EventReceiver {
    pub(crate) fn new(
        channel: Channel,
        replacements: mpsc::Receiver<Channel>,
        policy: FilterPolicy,
        handler: EventHandler,
        ctx: EngineContext,
    ) -> Self {
        Self {
            channel: Some(channel),
            replacements,
            policy,
            handler,
            ctx,
        }
    }

    /// Run until stop is requested. Returns the channel for teardown.
    pub(crate) fn run(mut self) -> Option<Channel> {
        info!(event = "client.receiver.started");

        while !self.ctx.shutdown.is_cancelled() {
            self.adopt_replacement();

            let Some(channel) = self.channel.as_mut() else {
                self.reconnect();
                continue;
            };

            match channel.poll_lines() {
                Ok(lines) => self.dispatch(lines),
                Err(e) if e.is_timeout() => {}
                Err(e) => {
                    warn!(event = "client.receiver.channel_failed", error = %e);
                    if let Some(old) = self.channel.take() {
                        old.shutdown();
                    }
                    self.ctx.state.mark_down(Role::Event);
                }
            }
        }

        info!(event = "client.receiver.stopped");
        self.channel
    }

    /// Swap in the newest channel handed over by the watchdog.
    fn adopt_replacement(&mut self) {
        while let Ok(fresh) = self.replacements.try_recv() {
            if let Some(old) = self.channel.replace(fresh) {
                old.shutdown();
            }
            debug!(event = "client.receiver.channel_replaced");
        }
    }

    fn reconnect(&mut self) {
        if self.ctx.backoff() {
            return;
        }
        self.adopt_replacement();
        if self.channel.is_some() {
            return;
        }
        if self
            .ctx
            .manager
            .rebuild_event_channel(&mut self.channel)
            .is_ok()
        {
            self.ctx.state.mark_up(Role::Event);
        }
    }

    fn dispatch(&mut self, lines: Vec<String>) {
        for line in lines {
            let envelope = match Envelope::parse(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    debug!(event = "client.receiver.frame_malformed", error = %e);
                    continue;
                }
            };

            if !self.policy.accepts(&envelope) {
                trace!(event = "client.receiver.frame_filtered", origin = ?envelope.origin());
                continue;
            }

            (self.handler)(envelope);
        }
    }
}
