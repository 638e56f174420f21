//! Inbound side of the proxy.
//!
//! ```text
//!   caller ──► ProxyServer (accept loop, one task per connection)
//!                  │  decode Message
//!                  ▼
//!              Processor ──► ServiceHandler (ServiceObject) ──► backend
//!                  │  encode reply
//!                  ▼
//!   caller ◄───────┘
//! ```
//!
//! A connection permit is taken before each accept, so with the default
//! limit of one connection later callers wait in the accept backlog until
//! the current one disconnects. Each connection handles one call at a time.
//!
//! [`ProxyServer::shutdown`] stops the accept loop and cancels every open
//! connection, including one waiting on the backend, then waits for their
//! tasks to finish.

mod processor;

pub use processor::{Processed, Processor, ServiceHandler};

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn, Instrument};
use tproxy_wire::{Framing, ThriftCodec, DEFAULT_MAX_FRAME_SIZE};

use crate::error::ProxyError;

/// Default maximum concurrent inbound connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1;

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to.
    pub listen_addr: SocketAddr,
    /// Transport framing; always the same as the backend's.
    pub framing: Framing,
    /// Maximum concurrent inbound connections.
    pub max_connections: usize,
    pub max_frame_size: usize,
}

impl ServerConfig {
    /// Listen on all interfaces at `port`.
    pub fn new(port: u16) -> Self {
        Self::with_addr(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
    }

    pub fn with_addr(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            framing: Framing::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Counters for the server.
#[derive(Debug, Default)]
pub struct ServerStats {
    /// Total connections accepted.
    pub connections_accepted: AtomicU64,
    /// Connections currently open.
    pub connections_active: AtomicU64,
    /// Total connections closed.
    pub connections_closed: AtomicU64,
    /// Calls handed to the service and answered.
    pub calls_forwarded: AtomicU64,
    /// Calls whose forwarding failed.
    pub calls_failed: AtomicU64,
    /// Calls answered with an exception by the processor (unknown method,
    /// wrong message type).
    pub calls_rejected: AtomicU64,
}

/// Accepts callers and runs the decode, dispatch, encode loop for each.
pub struct ProxyServer {
    config: ServerConfig,
    listener: TcpListener,
    processor: Arc<Processor>,
    conn_semaphore: Arc<Semaphore>,
    stats: Arc<ServerStats>,
    shutdown: CancellationToken,
    connections: TaskTracker,
}

impl ProxyServer {
    /// Bind the listen address.
    pub async fn bind(config: ServerConfig, processor: Arc<Processor>) -> Result<Self, ProxyError> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|source| ProxyError::ListenerBindFailure {
                addr: config.listen_addr.to_string(),
                source,
            })?;

        info!(
            listen_addr = %config.listen_addr,
            max_connections = config.max_connections,
            framing = %config.framing,
            "Listener bound"
        );

        Ok(Self {
            conn_semaphore: Arc::new(Semaphore::new(config.max_connections.max(1))),
            listener,
            config,
            processor,
            stats: Arc::new(ServerStats::default()),
            shutdown: CancellationToken::new(),
            connections: TaskTracker::new(),
        })
    }

    /// Get the local address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Accept and serve connections until [`shutdown`](Self::shutdown) is
    /// called or the task is dropped.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        info!(listen_addr = %local_addr, "Proxy server started");

        loop {
            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                permit = Arc::clone(&self.conn_semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    self.stats
                        .connections_accepted
                        .fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .connections_active
                        .fetch_add(1, Ordering::Relaxed);

                    let server = Arc::clone(&self);
                    let stats = Arc::clone(&self.stats);
                    let shutdown = self.shutdown.clone();

                    self.connections.spawn(
                        async move {
                            tokio::select! {
                                result = server.handle_connection(stream) => {
                                    if let Err(e) = result {
                                        debug!(error = %format!("{:#}", e), "Connection error");
                                    }
                                }
                                _ = shutdown.cancelled() => {
                                    debug!("Connection cancelled by shutdown");
                                }
                            }

                            stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                            stats.connections_closed.fetch_add(1, Ordering::Relaxed);
                            debug!("Connection closed");
                            drop(permit);
                        }
                        .instrument(tracing::info_span!("connection", peer = %peer_addr)),
                    );
                }
                Err(e) => {
                    drop(permit);
                    error!(error = %e, "Accept error");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }

        info!(listen_addr = %local_addr, "Proxy server stopped");
        Ok(())
    }

    /// Stop accepting, cancel open connections and wait for them to finish.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!(
                connections = self.connections.len(),
                "Stopping proxy server"
            );
        }
        self.shutdown.cancel();
        self.connections.close();
        self.connections.wait().await;
    }

    /// Serve one caller until it disconnects or a call fails.
    async fn handle_connection(&self, stream: TcpStream) -> anyhow::Result<()> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        let codec = ThriftCodec::with_max_frame_size(self.config.framing, self.config.max_frame_size);
        let mut framed = Framed::new(stream, codec);
        debug!("Connection opened");

        while let Some(msg) = framed.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) if e.is_disconnect() => {
                    debug!(error = %e, "Caller disconnected mid-message");
                    return Ok(());
                }
                Err(e) => return Err(e).context("failed to decode inbound message"),
            };

            let method = msg.name.clone();
            let seq_id = msg.seq_id;
            debug!(method = %method, seq_id, "Inbound call");

            match self.processor.process(msg).await {
                Ok(processed) => {
                    let counter = match processed {
                        Processed::Handled(_) => &self.stats.calls_forwarded,
                        Processed::Rejected(_) => &self.stats.calls_rejected,
                    };
                    counter.fetch_add(1, Ordering::Relaxed);

                    if let Some(reply) = processed.into_reply() {
                        framed
                            .send(reply)
                            .await
                            .with_context(|| format!("failed to write reply for '{}'", method))?;
                    }
                }
                Err(e) => {
                    self.stats.calls_failed.fetch_add(1, Ordering::Relaxed);
                    warn!(method = %method, seq_id, error = %e, "Call failed, closing connection");
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }
}
