use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};
use std::thread::{self, JoinHandle};

use pilight_protocol::Envelope;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::errors::ClientError;
use crate::filter::FilterPolicy;
use crate::receiver::{EventHandler, EventReceiver};
use crate::sender::{self, CommandChannel};
use crate::state::{EngineContext, EngineState, StateCell};
use crate::transport::{Channel, Endpoint};
use crate::watchdog::Watchdog;

struct Workers {
    receiver: JoinHandle<Option<Channel>>,
    watchdog: JoinHandle<()>,
}

/// Lifecycle bookkeeping guarded by one lock.
struct Lifecycle {
    handler: Option<EventHandler>,
    /// Event channel opened by `connect`, moved into the receiver on start.
    pending_event: Option<Channel>,
    workers: Option<Workers>,
    started: bool,
}

/// A connected pilight client.
///
/// Construction opens and identifies both channels. [`Client::start`] spawns
/// the event receiver and the watchdog; [`Client::stop`] (or dropping the
/// client) cancels them, joins them and closes both sockets.
///
/// `Client` is `Send + Sync`: `send_code` may be called from any thread.
pub struct Client {
    ctx: EngineContext,
    command: CommandChannel,
    policy: FilterPolicy,
    heartbeat_interval: std::time::Duration,
    lifecycle: Mutex<Lifecycle>,
}

impl Client {
    /// Connect to the daemon and identify both channels.
    ///
    /// Fails with [`ClientError::ConnectionRejected`] if either channel cannot
    /// be opened or identified; no socket is left open in that case.
    pub fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let endpoint = config.endpoint();
        let manager = ConnectionManager::new(
            endpoint,
            config.timeout(),
            config.receiver_identification(),
        );

        let state = StateCell::new();
        let (command, event) = manager.open_both()?;
        state.mark_ready();

        info!(
            event = "client.engine.connect_completed",
            endpoint = %manager.endpoint(),
        );

        Ok(Self {
            ctx: EngineContext {
                manager: Arc::new(manager),
                state,
                shutdown: CancellationToken::new(),
                reconnect_delay: config.reconnect_delay(),
            },
            command: CommandChannel::new(command),
            policy: config.filter_policy(),
            heartbeat_interval: config.heartbeat_interval(),
            lifecycle: Mutex::new(Lifecycle {
                handler: None,
                pending_event: Some(event),
                workers: None,
                started: false,
            }),
        })
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the callback for event notifications, replacing any earlier
    /// one. Must be called before [`Client::start`].
    pub fn set_handler<F>(&self, handler: F) -> Result<(), ClientError>
    where
        F: FnMut(Envelope) + Send + 'static,
    {
        if self.ctx.state.is_stopped() {
            return Err(ClientError::Stopped);
        }
        let mut lifecycle = self.lifecycle();
        if lifecycle.started {
            return Err(ClientError::AlreadyStarted);
        }
        lifecycle.handler = Some(Box::new(handler));
        Ok(())
    }

    /// Spawn the event receiver and the watchdog.
    pub fn start(&self) -> Result<(), ClientError> {
        if self.ctx.state.is_stopped() {
            return Err(ClientError::Stopped);
        }
        let mut lifecycle = self.lifecycle();
        if lifecycle.started {
            return Err(ClientError::AlreadyStarted);
        }
        let Some(handler) = lifecycle.handler.take() else {
            return Err(ClientError::HandlerMissing);
        };
        let Some(event) = lifecycle.pending_event.take() else {
            return Err(ClientError::Stopped);
        };

        let (replacements_tx, replacements_rx) = mpsc::channel();
        let receiver = EventReceiver::new(
            event,
            replacements_rx,
            self.policy,
            handler,
            self.ctx.clone(),
        );
        let receiver = match thread::Builder::new()
            .name("pilight-receiver".to_string())
            .spawn(move || receiver.run())
        {
            Ok(handle) => handle,
            Err(source) => {
                drop(lifecycle);
                return Err(self.abort_start("receiver", source, None));
            }
        };

        let watchdog = Watchdog::new(
            self.command.clone(),
            replacements_tx,
            self.heartbeat_interval,
            self.ctx.clone(),
        );
        let watchdog = match thread::Builder::new()
            .name("pilight-watchdog".to_string())
            .spawn(move || watchdog.run())
        {
            Ok(handle) => handle,
            Err(source) => {
                drop(lifecycle);
                return Err(self.abort_start("watchdog", source, Some(receiver)));
            }
        };

        lifecycle.workers = Some(Workers { receiver, watchdog });
        lifecycle.started = true;
        info!(event = "client.engine.start_completed");
        Ok(())
    }

    /// Tear down after a thread failed to spawn. The client ends up stopped.
    fn abort_start(
        &self,
        name: &'static str,
        source: std::io::Error,
        receiver: Option<JoinHandle<Option<Channel>>>,
    ) -> ClientError {
        error!(event = "client.engine.start_failed", thread = name, error = %source);
        self.ctx.shutdown.cancel();
        if let Some(Ok(Some(channel))) = receiver.map(JoinHandle::join) {
            channel.shutdown();
        }
        self.stop();
        ClientError::ThreadSpawn { name, source }
    }

    /// Stop the background threads and close both channels.
    ///
    /// Returns within roughly one read timeout plus one heartbeat interval.
    /// Calling it again is a no-op.
    pub fn stop(&self) {
        if self.ctx.state.mark_stopped() == EngineState::Stopped {
            return;
        }
        info!(event = "client.engine.stop_started");
        self.ctx.shutdown.cancel();

        let mut lifecycle = self.lifecycle();
        let mut event = lifecycle.pending_event.take();
        if let Some(workers) = lifecycle.workers.take() {
            if workers.watchdog.join().is_err() {
                error!(event = "client.engine.watchdog_panicked");
            }
            match workers.receiver.join() {
                Ok(channel) => event = channel,
                Err(_) => error!(event = "client.engine.receiver_panicked"),
            }
        }
        lifecycle.handler = None;
        drop(lifecycle);

        if let Some(channel) = self.command.take() {
            channel.shutdown();
        }
        if let Some(channel) = event {
            channel.shutdown();
        }
        info!(event = "client.engine.stop_completed");
    }

    /// Send a code to the daemon.
    ///
    /// `data` must be a JSON object with a `protocol` key. With `acknowledge`
    /// the call waits for the daemon's reply and fails with
    /// [`ClientError::AcknowledgmentMissing`] unless it reports success.
    pub fn send_code(&self, data: &Value, acknowledge: bool) -> Result<(), ClientError> {
        if self.ctx.state.is_stopped() {
            return Err(ClientError::Stopped);
        }
        sender::send_code(&self.command, &self.ctx, data, acknowledge)
    }

    pub fn state(&self) -> EngineState {
        self.ctx.state.get()
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.ctx.manager.endpoint()
    }

    pub fn filter_policy(&self) -> FilterPolicy {
        self.policy
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", self.endpoint())
            .field("state", &self.state())
            .field("policy", &self.policy)
            .finish()
    }
}
