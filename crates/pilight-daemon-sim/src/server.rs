use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::errors::SimError;
use crate::session::{Reply, Session};
use crate::stats::SimStats;
use crate::types::{FeedCursor, SimConfig};

/// Closes every connection open at the time of the call. Later connections
/// are unaffected.
#[derive(Debug, Clone, Default)]
pub struct SeverHandle(Arc<Mutex<CancellationToken>>);

impl SeverHandle {
    fn current(&self) -> CancellationToken {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sever(&self) {
        let mut token = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = CancellationToken::new();
        info!(event = "sim.server.connections_severed");
    }
}

/// A bound simulator, ready to run.
pub struct SimServer {
    listener: TcpListener,
    config: Arc<SimConfig>,
    stats: Arc<SimStats>,
    sever: SeverHandle,
}

impl SimServer {
    pub async fn bind(config: SimConfig) -> Result<Self, SimError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| SimError::Bind { addr, source })?;
        Ok(Self {
            listener,
            config: Arc::new(config),
            stats: Arc::new(SimStats::default()),
            sever: SeverHandle::default(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SimError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn stats(&self) -> Arc<SimStats> {
        self.stats.clone()
    }

    pub fn sever_handle(&self) -> SeverHandle {
        self.sever.clone()
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            event = "sim.server.started",
            addr = ?self.listener.local_addr().ok(),
            accepted_protocol = %self.config.accepted_protocol,
        );

        loop {
            tokio::select! {
                accept = self.listener.accept() => {
                    match accept {
                        Ok((stream, peer)) => {
                            tokio::spawn(handle_connection(
                                stream,
                                peer,
                                self.config.clone(),
                                self.stats.clone(),
                                self.sever.current(),
                                shutdown.clone(),
                            ));
                        }
                        Err(e) => {
                            error!(event = "sim.server.accept_failed", error = %e);
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    info!(event = "sim.server.shutdown_started");
                    break;
                }
            }
        }

        info!(event = "sim.server.shutdown_completed");
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<SimConfig>,
    stats: Arc<SimStats>,
    severed: CancellationToken,
    shutdown: CancellationToken,
) {
    stats.connection_opened();
    debug!(event = "sim.connection.opened", peer = %peer);

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut session = Session::new(config, stats.clone());
    let mut feed: Option<FeedCursor> = None;
    let mut ticker = tokio::time::interval(Duration::from_millis(10));

    loop {
        let feeding = feed.as_ref().is_some_and(|f| !f.is_exhausted());
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        debug!(event = "sim.connection.read_failed", peer = %peer, error = %e);
                        break;
                    }
                };
                let written = match session.handle_line(&line) {
                    Reply::Silent => Ok(()),
                    Reply::Line(reply) => write_line(&mut writer, &reply).await,
                    Reply::Close(reply) => {
                        let _ = write_line(&mut writer, &reply).await;
                        break;
                    }
                };
                if written.is_err() {
                    break;
                }
                if feed.is_none() {
                    if let Some(cursor) = session.feed() {
                        ticker = tokio::time::interval(Duration::from_millis(cursor.interval_ms()));
                        feed = Some(cursor);
                    }
                }
            }
            _ = ticker.tick(), if feeding => {
                if let Some(frame) = feed.as_mut().and_then(FeedCursor::next_frame) {
                    if write_line(&mut writer, &frame.to_string()).await.is_err() {
                        break;
                    }
                }
            }
            _ = severed.cancelled() => break,
            _ = shutdown.cancelled() => break,
        }
    }

    let _ = writer.shutdown().await;
    stats.connection_closed();
    debug!(event = "sim.connection.closed", peer = %peer);
}
