//! SOCKS5 client
//!
//! Negotiates a no-auth session and a CONNECT request with a SOCKS5 proxy
//! for a domain-name target. Name resolution is left to the proxy.

use crate::config::ListenerConfig;
use crate::error::RelayError;
use crate::helper::{duration_from_secs, DEFAULT_CONNECT_TIMEOUT_SECS};
use crate::socks::consts::*;
use crate::transport::{connect_tcp, Connector, SocketOpts};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Opens upstream transports by tunneling through a SOCKS5 proxy
#[derive(Debug, Clone)]
pub struct Socks5Connector {
    proxy_addr: String,
    proxy_port: u16,
    target_host: String,
    target_port: u16,
    connect_timeout: Duration,
    socket_opts: SocketOpts,
}

impl Socks5Connector {
    /// Create a connector with default timeout and socket options
    pub fn new(
        proxy_addr: impl Into<String>,
        proxy_port: u16,
        target_host: impl Into<String>,
        target_port: u16,
    ) -> Self {
        Socks5Connector {
            proxy_addr: proxy_addr.into(),
            proxy_port,
            target_host: target_host.into(),
            target_port,
            connect_timeout: duration_from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            socket_opts: SocketOpts::default(),
        }
    }

    /// Create a connector from the relay configuration
    pub fn from_config(config: &ListenerConfig) -> Self {
        Socks5Connector::new(
            config.proxy_addr.clone(),
            config.proxy_port,
            config.target_host.clone(),
            config.target_port,
        )
        .with_connect_timeout(config.connect_timeout())
        .with_socket_opts(SocketOpts::from_tcp_config(&config.tcp))
    }

    /// Set the proxy connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set socket options for the proxy connection
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }
}

#[async_trait]
impl Connector for Socks5Connector {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<TcpStream, RelayError> {
        let mut stream = connect_tcp(
            &self.proxy_addr,
            self.proxy_port,
            self.connect_timeout,
            &self.socket_opts,
        )
        .await?;

        handshake(&mut stream, &self.target_host, self.target_port).await?;

        debug!(
            "SOCKS5 tunnel to {}:{} established via {}:{}",
            self.target_host, self.target_port, self.proxy_addr, self.proxy_port
        );

        Ok(stream)
    }
}

/// Connect to `target_host:target_port` through the proxy at
/// `proxy_addr:proxy_port`
///
/// The returned stream carries raw payload bytes in both directions.
pub async fn connect_through_proxy(
    proxy_addr: &str,
    proxy_port: u16,
    target_host: &str,
    target_port: u16,
) -> Result<TcpStream, RelayError> {
    Socks5Connector::new(proxy_addr, proxy_port, target_host, target_port)
        .connect()
        .await
}

/// Run the full client handshake on an already connected stream
///
/// On success the stream is positioned exactly at the first payload byte.
pub async fn handshake<S>(stream: &mut S, target_host: &str, target_port: u16) -> Result<(), RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    negotiate_method(stream).await?;
    send_connect(stream, target_host, target_port).await?;
    read_connect_reply(stream).await
}

/// Offer "no authentication" and require the proxy to accept it
///
/// # Method Negotiation
///
/// ```text
/// request:  VER=5 NMETHODS=1 METHODS=[0x00]
/// reply:    VER=5 METHOD=0x00
/// ```
pub async fn negotiate_method<S>(stream: &mut S) -> Result<(), RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = [SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE];
    write_request(stream, &request, "method negotiation").await?;

    let mut reply = [0u8; 2];
    stream
        .read_exact(&mut reply)
        .await
        .map_err(|e| RelayError::handshake(format!("failed to read method reply: {}", e)))?;

    match reply {
        [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE] => Ok(()),
        [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE] => Err(RelayError::handshake(
            "proxy accepted none of the offered methods",
        )),
        [version, method] => Err(RelayError::handshake(format!(
            "unexpected method reply: version {} method {:#04x}",
            version, method
        ))),
    }
}

/// Build a CONNECT request for a domain-name target
///
/// # SOCKS5 Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' | X'03'| 1 + len  |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub fn build_connect_request(target_host: &str, target_port: u16) -> Result<Vec<u8>, RelayError> {
    let host = target_host.as_bytes();
    if host.is_empty() || host.len() > MAX_DOMAIN_LEN {
        return Err(RelayError::Config(format!(
            "target host must be 1..={} bytes, got {}",
            MAX_DOMAIN_LEN,
            host.len()
        )));
    }

    let mut request = Vec::with_capacity(7 + host.len());
    request.extend_from_slice(&[
        SOCKS5_VERSION,
        SOCKS5_CMD_TCP_CONNECT,
        SOCKS5_RESERVED,
        SOCKS5_ADDR_TYPE_DOMAIN,
        host.len() as u8,
    ]);
    request.extend_from_slice(host);
    request.extend_from_slice(&target_port.to_be_bytes());
    Ok(request)
}

/// Send the CONNECT request
pub async fn send_connect<S>(stream: &mut S, target_host: &str, target_port: u16) -> Result<(), RelayError>
where
    S: AsyncWrite + Unpin,
{
    let request = build_connect_request(target_host, target_port)?;
    write_request(stream, &request, "connect request").await
}

/// Read and validate the CONNECT reply
///
/// The reply code is checked first, before the version byte. On success the
/// bound address is drained according to its address type so that no reply
/// byte is left in front of the relayed payload.
pub async fn read_connect_reply<S>(stream: &mut S) -> Result<(), RelayError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    stream
        .read_exact(&mut header)
        .await
        .map_err(|e| RelayError::handshake(format!("failed to read connect reply: {}", e)))?;

    let [version, code, _reserved, addr_type] = header;

    // The reply code decides, whatever the version byte says
    if code != SOCKS5_REPLY_SUCCEEDED {
        return Err(RelayError::ProxyConnect { code });
    }

    if version != SOCKS5_VERSION {
        return Err(RelayError::handshake(format!(
            "unexpected version {} in connect reply",
            version
        )));
    }

    let addr_len = match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => 4,
        SOCKS5_ADDR_TYPE_IPV6 => 16,
        SOCKS5_ADDR_TYPE_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await.map_err(|e| {
                RelayError::handshake(format!("failed to read bound address length: {}", e))
            })?;
            len[0] as usize
        }
        other => {
            return Err(RelayError::handshake(format!(
                "unsupported address type {} in connect reply",
                other
            )))
        }
    };

    // BND.ADDR + BND.PORT, unused
    let mut bound = vec![0u8; addr_len + 2];
    stream
        .read_exact(&mut bound)
        .await
        .map_err(|e| RelayError::handshake(format!("failed to read bound address: {}", e)))?;

    debug!("Connect reply accepted, bound address type {}", addr_type);

    Ok(())
}

async fn write_request<S>(stream: &mut S, request: &[u8], what: &str) -> Result<(), RelayError>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(request)
        .await
        .map_err(|e| RelayError::handshake(format!("failed to send {}: {}", what, e)))?;
    stream
        .flush()
        .await
        .map_err(|e| RelayError::handshake(format!("failed to send {}: {}", what, e)))
}
