use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use pilight_protocol::IdentifyOptions;
use serde_json::Value;

/// What the simulator has seen, shared between connection tasks and the
/// test harness.
#[derive(Debug, Default)]
pub struct SimStats {
    received_codes: Mutex<Vec<Value>>,
    identifications: Mutex<Vec<IdentifyOptions>>,
    frames_received: AtomicUsize,
    heartbeats: AtomicUsize,
    connections_accepted: AtomicUsize,
    active_connections: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimStats {
    pub(crate) fn record_code(&self, code: Value) {
        lock(&self.received_codes).push(code);
    }

    pub(crate) fn record_identification(&self, options: IdentifyOptions) {
        lock(&self.identifications).push(options);
    }

    pub(crate) fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::SeqCst);
        self.active_connections.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::SeqCst);
    }

    /// `code` objects of every `send` request, in arrival order.
    pub fn received_codes(&self) -> Vec<Value> {
        lock(&self.received_codes).clone()
    }

    /// Options of every `identify` request, in arrival order.
    pub fn identifications(&self) -> Vec<IdentifyOptions> {
        lock(&self.identifications).clone()
    }

    /// JSON frames received on all connections. Heartbeat probes are
    /// counted separately.
    pub fn frames_received(&self) -> usize {
        self.frames_received.load(Ordering::SeqCst)
    }

    pub fn heartbeats(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }

    pub fn connections_accepted(&self) -> usize {
        self.connections_accepted.load(Ordering::SeqCst)
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }
}
