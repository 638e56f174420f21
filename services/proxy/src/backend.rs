//! The single connection to the real service.
//!
//! One `BackendConnection` is opened at startup and shared by every inbound
//! connection through [`SharedBackend`]. The mutex serializes calls so a
//! reply read from the socket always belongs to the call just written.
//!
//! - Connect timeout: 2s default
//! - No reconnect: a link that fails mid-call stays closed
//! - Closed exactly once, by `close()` or on drop

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};
use tproxy_wire::{Framing, Message, ThriftCodec, WireError, DEFAULT_MAX_FRAME_SIZE};

use crate::error::ProxyError;

/// Default connect timeout for the backend.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default backend host.
pub const DEFAULT_BACKEND_HOST: &str = "127.0.0.1";

/// Connection handle shared by all inbound connections.
pub type SharedBackend = Arc<Mutex<BackendConnection>>;

/// Where and how to reach the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Host name or address.
    pub hostname: String,
    pub port: u16,
    pub framing: Framing,
    pub connect_timeout: Duration,
    pub max_frame_size: usize,
}

impl BackendConfig {
    /// Create a configuration for `127.0.0.1:<port>` with default settings.
    pub fn new(port: u16) -> Self {
        Self {
            hostname: DEFAULT_BACKEND_HOST.to_string(),
            port,
            framing: Framing::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn addr(&self) -> String {
        if self.hostname.contains(':') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }
}

/// An open transport to the backend, speaking the binary protocol.
pub struct BackendConnection {
    addr: String,
    peer: Option<SocketAddr>,
    transport: Option<Framed<TcpStream, ThriftCodec>>,
    calls: u64,
}

impl BackendConnection {
    /// Connect to the backend.
    ///
    /// Fails with `BackendUnreachable` if the host does not resolve, refuses
    /// the connection or does not answer within the connect timeout.
    pub async fn open(config: &BackendConfig) -> Result<Self, ProxyError> {
        let addr = config.addr();
        debug!(backend_addr = %addr, "Connecting to backend");

        let stream = match timeout(
            config.connect_timeout,
            TcpStream::connect((config.hostname.as_str(), config.port)),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timeout")),
        }
        .map_err(|source| ProxyError::BackendUnreachable {
            addr: addr.clone(),
            source,
        })?;

        let peer = stream.peer_addr().ok();
        let codec = ThriftCodec::with_max_frame_size(config.framing, config.max_frame_size);

        info!(
            backend_addr = %addr,
            framing = %config.framing,
            "Backend connected"
        );

        Ok(Self {
            addr,
            peer,
            transport: Some(Framed::new(stream, codec)),
            calls: 0,
        })
    }

    /// Wrap for sharing between connections.
    pub fn into_shared(self) -> SharedBackend {
        Arc::new(Mutex::new(self))
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Number of calls completed on this connection.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Send `request` unchanged and, unless `expect_reply` is false, read
    /// the matching reply.
    ///
    /// Any failure leaves the connection closed; later calls fail at once.
    /// So does dropping the returned future before it completes, since the
    /// reply to a half-finished call would otherwise answer the next one.
    pub async fn call(
        &mut self,
        request: Message,
        expect_reply: bool,
    ) -> Result<Option<Message>, WireError> {
        let Some(mut transport) = self.transport.take() else {
            return Err(WireError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "backend connection is closed",
            )));
        };

        let result = exchange(&mut transport, request, expect_reply).await;
        match &result {
            Ok(_) => {
                self.calls += 1;
                self.transport = Some(transport);
            }
            Err(e) => warn!(backend_addr = %self.addr, error = %e, "Backend link broken"),
        }
        result
    }

    /// Close the transport. Returns false if it was already closed.
    pub async fn close(&mut self) -> bool {
        let Some(mut transport) = self.transport.take() else {
            return false;
        };
        if let Err(e) = transport.close().await {
            debug!(backend_addr = %self.addr, error = %e, "Error while closing backend transport");
        }
        info!(backend_addr = %self.addr, calls = self.calls, "Backend connection closed");
        true
    }
}

impl Drop for BackendConnection {
    fn drop(&mut self) {
        if self.transport.take().is_some() {
            debug!(backend_addr = %self.addr, "Backend connection dropped while open");
        }
    }
}

impl std::fmt::Debug for BackendConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConnection")
            .field("addr", &self.addr)
            .field("open", &self.is_open())
            .field("calls", &self.calls)
            .finish()
    }
}

async fn exchange(
    transport: &mut Framed<TcpStream, ThriftCodec>,
    request: Message,
    expect_reply: bool,
) -> Result<Option<Message>, WireError> {
    let name = request.name.clone();
    transport.send(request).await?;
    if !expect_reply {
        return Ok(None);
    }

    let reply = match transport.next().await {
        Some(reply) => reply?,
        None => {
            return Err(WireError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "backend closed the connection",
            )))
        }
    };

    if reply.is_request() {
        return Err(WireError::Protocol(format!(
            "backend sent a {:?} message instead of a reply",
            reply.kind
        )));
    }
    if reply.name != name {
        return Err(WireError::Protocol(format!(
            "reply for '{}' does not match call '{}'",
            reply.name, name
        )));
    }
    Ok(Some(reply))
}

/// Open the backend, run `f` with it, and close it afterwards.
///
/// The connection is closed whether `f` succeeds or fails; if `f` panics
/// the drop of the last handle closes it.
pub async fn with_backend<F, Fut, T>(config: &BackendConfig, f: F) -> Result<T, ProxyError>
where
    F: FnOnce(SharedBackend) -> Fut,
    Fut: Future<Output = Result<T, ProxyError>>,
{
    let backend = BackendConnection::open(config).await?.into_shared();
    let result = f(Arc::clone(&backend)).await;
    backend.lock().await.close().await;
    result
}
