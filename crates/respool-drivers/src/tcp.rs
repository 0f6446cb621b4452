//! Plain TCP connections
//!
//! A `TcpConnection` is the simplest useful pooled resource: an open socket
//! whose liveness is probed with a non-blocking peek.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use respool_core::{ConnectParams, Connection, ConnectionFactory, PoolError, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Connect timeout used when `connect_timeout_ms` is not set
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens TCP connections to a single address
///
/// Recognised options on [`ConnectParams`]:
/// - `connect_timeout_ms` - dial timeout in milliseconds (default 5000)
/// - `nodelay` - `true`/`false`, whether to disable Nagle (default `true`)
#[derive(Debug, Clone)]
pub struct TcpFactory {
    params: ConnectParams,
    connect_timeout: Duration,
    nodelay: bool,
}

impl TcpFactory {
    /// Create a factory for `address` with default options
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            params: ConnectParams::new(address),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            nodelay: true,
        }
    }

    /// Create a factory from connection parameters, parsing its options
    pub fn from_params(params: ConnectParams) -> Result<Self> {
        let connect_timeout = match params.option("connect_timeout_ms") {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| PoolError::Settings(format!("invalid connect_timeout_ms {raw:?}: {e}")))?,
            None => DEFAULT_CONNECT_TIMEOUT,
        };
        let nodelay = match params.option("nodelay") {
            Some(raw) => raw
                .parse::<bool>()
                .map_err(|e| PoolError::Settings(format!("invalid nodelay {raw:?}: {e}")))?,
            None => true,
        };

        Ok(Self {
            params,
            connect_timeout,
            nodelay,
        })
    }

    /// Override the dial timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn params(&self) -> &ConnectParams {
        &self.params
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

#[async_trait]
impl ConnectionFactory for TcpFactory {
    type Connection = TcpConnection;

    #[tracing::instrument(skip(self), fields(address = %self.params.address))]
    async fn open(&self) -> Result<TcpConnection> {
        let address = &self.params.address;
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                PoolError::Timeout(format!(
                    "connecting to {address} took longer than {:?}",
                    self.connect_timeout
                ))
            })?
            .map_err(|e| PoolError::Connection(format!("failed to connect to {address}: {e}")))?;

        stream.set_nodelay(self.nodelay)?;
        let peer = stream.peer_addr()?;
        tracing::debug!(peer = %peer, "tcp connection established");

        Ok(TcpConnection { stream, peer })
    }
}

/// An open TCP socket owned by a pool
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpConnection {
    /// Address of the remote end
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// The underlying stream, for reading and writing
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn validate(&mut self) -> bool {
        let mut buf = [0u8; 1];
        // Poll once: pending means nothing to read and the socket is still open
        match self.stream.peek(&mut buf).now_or_never() {
            None => true,
            Some(Ok(0)) => {
                tracing::debug!(peer = %self.peer, "peer closed the connection");
                false
            }
            Some(Ok(_)) => true,
            Some(Err(e)) => {
                tracing::debug!(peer = %self.peer, error = %e, "tcp liveness probe failed");
                false
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            // Already torn down by the peer
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(PoolError::Connection(format!(
                "failed to shut down connection to {}: {e}",
                self.peer
            ))),
        }
    }
}
