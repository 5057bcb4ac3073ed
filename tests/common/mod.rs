//! Test utilities and mocks for Sockrelay
//!
//! This module provides a scripted SOCKS5 proxy and relay helpers used
//! across integration tests.

#![allow(dead_code)]

use sockrelay::config::ListenerConfig;
use sockrelay::{Relay, RelayError};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Target host used by the tests
pub const TARGET_HOST: &str = "example.onion";

/// Target port used by the tests
pub const TARGET_PORT: u16 = 443;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Find a local port with nothing listening on it
pub async fn unused_port() -> u16 {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr.port()
}

/// How the mock proxy answers one connection
#[derive(Debug, Clone)]
pub struct ProxyScript {
    /// Reply to the method negotiation
    pub method_reply: Vec<u8>,
    /// Reply to the CONNECT request, may carry trailing payload bytes
    pub connect_reply: Vec<u8>,
    /// Never read or answer anything
    pub stall: bool,
}

impl ProxyScript {
    /// Accept no-auth and answer CONNECT with success (IPv4 bound address)
    pub fn success() -> Self {
        ProxyScript {
            method_reply: vec![0x05, 0x00],
            connect_reply: vec![0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0],
            stall: false,
        }
    }

    /// Answer CONNECT with the given reply code
    pub fn connect_code(code: u8) -> Self {
        ProxyScript {
            connect_reply: vec![0x05, code, 0x00, 0x01, 0, 0, 0, 0, 0, 0],
            ..ProxyScript::success()
        }
    }

    /// Refuse every authentication method
    pub fn reject_methods() -> Self {
        ProxyScript {
            method_reply: vec![0x05, 0xFF],
            ..ProxyScript::success()
        }
    }

    /// Hold the connection without answering
    pub fn stall() -> Self {
        ProxyScript {
            stall: true,
            ..ProxyScript::success()
        }
    }
}

/// One connection seen by the mock proxy
#[derive(Debug)]
pub struct ProxyConn {
    /// Method negotiation bytes received
    pub greeting: Vec<u8>,
    /// CONNECT request bytes received
    pub request: Vec<u8>,
    /// Proxy side of the connection, now acting as the target
    pub stream: TcpStream,
}

/// Start a mock SOCKS5 proxy
///
/// Connection `n` is answered with `scripts[n]`, or with the last script
/// once the list is exhausted. Every connection is reported on the returned
/// channel after the scripted replies have been written.
pub async fn spawn_mock_proxy(
    scripts: Vec<ProxyScript>,
) -> (SocketAddr, mpsc::UnboundedReceiver<ProxyConn>) {
    assert!(!scripts.is_empty());
    let (listener, addr) = create_test_listener().await;
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut index = 0usize;
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let script = scripts
                .get(index)
                .or_else(|| scripts.last())
                .cloned()
                .unwrap();
            index += 1;

            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(conn) = answer(stream, &script).await {
                    let _ = tx.send(conn);
                }
            });
        }
    });

    (addr, rx)
}

async fn answer(mut stream: TcpStream, script: &ProxyScript) -> Option<ProxyConn> {
    if script.stall {
        return Some(ProxyConn {
            greeting: Vec::new(),
            request: Vec::new(),
            stream,
        });
    }

    let mut greeting = vec![0u8; 3];
    stream.read_exact(&mut greeting).await.ok()?;
    stream.write_all(&script.method_reply).await.ok()?;

    if script.method_reply != [0x05, 0x00] {
        return Some(ProxyConn {
            greeting,
            request: Vec::new(),
            stream,
        });
    }

    // VER CMD RSV ATYP LEN
    let mut request = vec![0u8; 5];
    stream.read_exact(&mut request).await.ok()?;
    let mut rest = vec![0u8; request[4] as usize + 2];
    stream.read_exact(&mut rest).await.ok()?;
    request.extend_from_slice(&rest);

    stream.write_all(&script.connect_reply).await.ok()?;

    Some(ProxyConn {
        greeting,
        request,
        stream,
    })
}

/// Relay configuration pointing at the given proxy
pub fn relay_config(proxy: SocketAddr) -> ListenerConfig {
    ListenerConfig {
        bind_addr: "127.0.0.1".to_string(),
        bind_port: 0,
        proxy_addr: proxy.ip().to_string(),
        proxy_port: proxy.port(),
        target_host: TARGET_HOST.to_string(),
        target_port: TARGET_PORT,
        idle_timeout: 30,
        connect_timeout: 2,
        ..ListenerConfig::default()
    }
}

/// A relay running in the background
pub struct RunningRelay {
    /// Address clients connect to
    pub addr: SocketAddr,
    /// Send `true` to stop accepting
    pub shutdown_tx: broadcast::Sender<bool>,
    /// The relay task
    pub handle: JoinHandle<Result<(), RelayError>>,
}

/// Bind and start a relay
pub fn start_relay(config: ListenerConfig) -> RunningRelay {
    let relay = Relay::bind(config).unwrap();
    let addr = relay.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(relay.run(shutdown_rx));

    RunningRelay {
        addr,
        shutdown_tx,
        handle,
    }
}

/// Read until EOF and return what was read
pub async fn read_until_eof(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    buf
}

/// Assert the peer closed the connection
///
/// A reset counts as closed: the relay may close with reply bytes unread.
pub async fn assert_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(std::time::Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("connection still open");
    match read {
        Ok(0) | Err(_) => {}
        Ok(n) => panic!("expected close, read {} bytes", n),
    }
}
