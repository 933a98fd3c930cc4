use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::connection::ConnectionManager;
use crate::transport::Role;

/// Lifecycle of the engine.
///
/// `Connecting -> Ready -> Degraded -> Ready -> ... -> Stopped`. `Stopped` is
/// terminal: no later transition leaves it.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Both channels are being opened for the first time.
    Connecting,
    /// Both channels are open and identified.
    Ready,
    /// A channel failed and is being rebuilt in the background.
    Degraded,
    /// `stop()` was called; channels are closed for good.
    Stopped,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Connecting => write!(f, "connecting"),
            EngineState::Ready => write!(f, "ready"),
            EngineState::Degraded => write!(f, "degraded"),
            EngineState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: EngineState,
    command_down: bool,
    event_down: bool,
}

impl Inner {
    fn down_flag(&mut self, role: Role) -> &mut bool {
        match role {
            Role::Command => &mut self.command_down,
            Role::Event => &mut self.event_down,
        }
    }
}

/// Shared, clonable handle to the engine state.
///
/// Tracks each channel separately: the engine is `Degraded` while either one
/// is down and returns to `Ready` only once both are back.
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<Mutex<Inner>>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(Mutex::new(Inner {
            state: EngineState::Connecting,
            command_down: false,
            event_down: false,
        })))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get(&self) -> EngineState {
        self.lock().state
    }

    /// Both channels opened during construction.
    pub(crate) fn mark_ready(&self) {
        let mut inner = self.lock();
        if inner.state == EngineState::Connecting {
            inner.state = EngineState::Ready;
        }
    }

    /// `role` failed. Returns the state before the transition.
    pub(crate) fn mark_down(&self, role: Role) -> EngineState {
        let mut inner = self.lock();
        let previous = inner.state;
        if previous != EngineState::Stopped {
            *inner.down_flag(role) = true;
            inner.state = EngineState::Degraded;
        }
        previous
    }

    /// `role` was rebuilt. Returns the state after the transition.
    pub(crate) fn mark_up(&self, role: Role) -> EngineState {
        let mut inner = self.lock();
        if inner.state != EngineState::Stopped {
            *inner.down_flag(role) = false;
            if !inner.command_down && !inner.event_down {
                inner.state = EngineState::Ready;
            }
        }
        inner.state
    }

    /// Returns the state before the transition.
    pub(crate) fn mark_stopped(&self) -> EngineState {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.state = EngineState::Stopped;
        previous
    }

    /// Whether `role` has failed and not been rebuilt yet.
    pub(crate) fn is_down(&self, role: Role) -> bool {
        *self.lock().down_flag(role)
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.get() == EngineState::Stopped
    }
}

/// What the background loops share: how to reconnect, where to report state,
/// and when to quit.
#[derive(Debug, Clone)]
pub(crate) struct EngineContext {
    pub(crate) manager: Arc<ConnectionManager>,
    pub(crate) state: StateCell,
    pub(crate) shutdown: CancellationToken,
    pub(crate) reconnect_delay: Duration,
}

/// Granularity of interruptible sleeps.
const PAUSE_STEP: Duration = Duration::from_millis(10);

impl EngineContext {
    /// Sleep for `duration`, waking early once stop is requested. Returns
    /// `true` if stop was requested.
    pub(crate) fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while !self.shutdown.is_cancelled() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining.min(PAUSE_STEP));
        }
        self.shutdown.is_cancelled()
    }

    /// Sleep for the reconnect delay. Returns `true` if stop was requested.
    pub(crate) fn backoff(&self) -> bool {
        self.pause(self.reconnect_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let state = StateCell::new();
        assert_eq!(state.get(), EngineState::Connecting);

        state.mark_ready();
        assert_eq!(state.get(), EngineState::Ready);

        assert_eq!(state.mark_down(Role::Command), EngineState::Ready);
        assert_eq!(state.get(), EngineState::Degraded);

        assert_eq!(state.mark_up(Role::Command), EngineState::Ready);
    }

    #[test]
    fn test_ready_requires_both_channels() {
        let state = StateCell::new();
        state.mark_ready();

        state.mark_down(Role::Command);
        state.mark_down(Role::Event);
        assert_eq!(state.mark_up(Role::Command), EngineState::Degraded);
        assert_eq!(state.mark_up(Role::Event), EngineState::Ready);
    }

    #[test]
    fn test_stopped_is_terminal() {
        let state = StateCell::new();
        state.mark_ready();
        assert_eq!(state.mark_stopped(), EngineState::Ready);

        state.mark_down(Role::Event);
        state.mark_up(Role::Event);
        state.mark_ready();
        assert_eq!(state.get(), EngineState::Stopped);
        assert!(state.is_stopped());
        assert_eq!(state.mark_stopped(), EngineState::Stopped);
    }

    #[test]
    fn test_down_flags_are_per_channel() {
        let state = StateCell::new();
        state.mark_ready();
        state.mark_down(Role::Event);
        assert!(state.is_down(Role::Event));
        assert!(!state.is_down(Role::Command));

        state.mark_up(Role::Event);
        assert!(!state.is_down(Role::Event));
    }

    fn idle_context(reconnect_delay: Duration) -> EngineContext {
        EngineContext {
            manager: Arc::new(ConnectionManager::new(
                crate::transport::Endpoint::new("127.0.0.1", 1, Duration::from_millis(10)),
                Duration::from_millis(10),
                pilight_protocol::IdentifyOptions::receiver(),
            )),
            state: StateCell::new(),
            shutdown: CancellationToken::new(),
            reconnect_delay,
        }
    }

    #[test]
    fn test_backoff_wakes_on_stop() {
        let ctx = idle_context(Duration::from_secs(30));

        let token = ctx.shutdown.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            token.cancel();
        });

        let started = Instant::now();
        assert!(ctx.backoff());
        assert!(started.elapsed() < Duration::from_secs(1));
        canceller.join().unwrap();
    }

    #[test]
    fn test_pause_runs_full_duration_without_stop() {
        let ctx = idle_context(Duration::from_millis(10));

        let started = Instant::now();
        assert!(!ctx.pause(Duration::from_millis(40)));
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_clones_share_state() {
        let state = StateCell::new();
        state.mark_ready();
        let other = state.clone();
        other.mark_down(Role::Event);
        assert_eq!(state.get(), EngineState::Degraded);
        assert_eq!(EngineState::Degraded.to_string(), "degraded");
    }
}
