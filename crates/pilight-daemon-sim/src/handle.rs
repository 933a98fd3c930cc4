use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pilight_protocol::IdentifyOptions;
use serde_json::Value;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::SimError;
use crate::server::{SeverHandle, SimServer};
use crate::stats::SimStats;
use crate::types::SimConfig;

/// A simulator running on its own runtime, driven from blocking code.
///
/// Dropping the handle stops the simulator and closes every connection.
/// Must not be dropped from inside an async context.
pub struct SimDaemon {
    addr: SocketAddr,
    stats: Arc<SimStats>,
    sever: SeverHandle,
    shutdown: CancellationToken,
    runtime: Option<Runtime>,
}

impl SimDaemon {
    pub fn start(config: SimConfig) -> Result<Self, SimError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("pilight-sim")
            .enable_all()
            .build()
            .map_err(SimError::Runtime)?;

        let server = runtime.block_on(SimServer::bind(config))?;
        let addr = server.local_addr()?;
        let stats = server.stats();
        let sever = server.sever_handle();
        let shutdown = CancellationToken::new();
        runtime.spawn(server.run(shutdown.clone()));

        Ok(Self {
            addr,
            stats,
            sever,
            shutdown,
            runtime: Some(runtime),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    pub fn received_codes(&self) -> Vec<Value> {
        self.stats.received_codes()
    }

    pub fn identifications(&self) -> Vec<IdentifyOptions> {
        self.stats.identifications()
    }

    pub fn frames_received(&self) -> usize {
        self.stats.frames_received()
    }

    pub fn heartbeats(&self) -> usize {
        self.stats.heartbeats()
    }

    pub fn connections_accepted(&self) -> usize {
        self.stats.connections_accepted()
    }

    pub fn active_connections(&self) -> usize {
        self.stats.active_connections()
    }

    /// Close every open connection but keep accepting new ones.
    pub fn sever_connections(&self) {
        self.sever.sever();
    }

    /// Stop accepting, close every connection and release the port.
    pub fn stop(mut self) {
        self.shutdown_runtime();
    }

    fn shutdown_runtime(&mut self) {
        self.shutdown.cancel();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(1));
            info!(event = "sim.daemon.stopped", addr = %self.addr);
        }
    }
}

impl Drop for SimDaemon {
    fn drop(&mut self) {
        self.shutdown_runtime();
    }
}

impl std::fmt::Debug for SimDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDaemon")
            .field("addr", &self.addr)
            .field("running", &self.runtime.is_some())
            .finish()
    }
}
