//! Transport module for Sockrelay
//!
//! This module provides socket options, a bounded TCP connect, and the
//! `Connector` abstraction the session supervisor uses to open its
//! upstream transport.

use crate::config::TcpConfig;
use crate::error::RelayError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Socket options for configuring connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts::from_tcp_config(&TcpConfig::default())
    }
}

impl SocketOpts {
    /// Create socket options from TCP config
    pub fn from_tcp_config(config: &TcpConfig) -> Self {
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: Some(config.keepalive_secs),
            keepalive_interval: Some(config.keepalive_interval),
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }

    /// Apply options, logging instead of failing
    pub fn hint(&self, stream: &TcpStream) {
        if let Err(e) = self.apply(stream) {
            tracing::warn!("Failed to apply socket options: {}", e);
        }
    }
}

/// Opens the upstream transport for one session
///
/// Each call yields a fresh, exclusively owned stream that is already
/// positioned at the start of the tunneled payload.
#[async_trait]
pub trait Connector: Debug + Send + Sync + 'static {
    /// The stream type produced by this connector
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + Debug + 'static;

    /// Open a new upstream transport
    async fn connect(&self) -> Result<Self::Stream, RelayError>;
}

/// Connect to `host:port` over TCP within `timeout`
///
/// Both connect failures and timeouts are reported as
/// [`RelayError::ProxyUnreachable`].
pub async fn connect_tcp(
    host: &str,
    port: u16,
    timeout: Duration,
    opts: &SocketOpts,
) -> Result<TcpStream, RelayError> {
    let unreachable = |source: std::io::Error| RelayError::ProxyUnreachable {
        addr: format!("{}:{}", host, port),
        source,
    };

    let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| {
            unreachable(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect timed out after {:?}", timeout),
            ))
        })?
        .map_err(unreachable)?;

    opts.hint(&stream);
    tracing::debug!("TCP connection established to {}:{}", host, port);

    Ok(stream)
}
