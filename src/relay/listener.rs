//! Connection acceptor
//!
//! Binds the listening socket and exposes accepted connections as a lazy,
//! infinite stream.

use crate::error::RelayError;
use crate::helper::DEFAULT_LISTEN_BACKLOG;
use futures::stream::{self, Stream};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

/// Bind a TCP listener with `SO_REUSEADDR` enabled
///
/// Address reuse lets the relay come back on the same port right after a
/// restart, while old connections are still in TIME_WAIT.
pub fn bind_listener(addr: SocketAddr) -> Result<TcpListener, RelayError> {
    let bind_err = |source: io::Error| RelayError::Bind {
        addr: addr.to_string(),
        source,
    };

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.listen(DEFAULT_LISTEN_BACKLOG).map_err(bind_err)?;

    TcpListener::from_std(socket.into()).map_err(bind_err)
}

/// Accepted connections, in arrival order
///
/// The stream never ends on its own; accept errors are yielded as items so
/// the caller decides whether to continue.
pub fn incoming(
    listener: &TcpListener,
) -> impl Stream<Item = io::Result<(TcpStream, SocketAddr)>> + '_ {
    stream::unfold(listener, |listener| async move {
        let accepted = listener.accept().await;
        Some((accepted, listener))
    })
}

/// What to do after an accept error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptErrorAction {
    /// Per-connection failure, accept again right away
    Continue,
    /// Out of resources (e.g. file descriptors), pause before accepting again
    Backoff,
    /// The listening socket is unusable
    Fatal,
}

/// Classify an accept error
pub fn classify_accept_error(error: &io::Error) -> AcceptErrorAction {
    match error.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => AcceptErrorAction::Continue,
        io::ErrorKind::InvalidInput | io::ErrorKind::Unsupported | io::ErrorKind::NotConnected => {
            AcceptErrorAction::Fatal
        }
        _ => AcceptErrorAction::Backoff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_bind_listener_ephemeral_port() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.port() > 0);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_bind_listener_port_in_use() {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().unwrap();

        match bind_listener(addr) {
            Err(RelayError::Bind { addr: failed, .. }) => assert_eq!(failed, addr.to_string()),
            other => panic!("expected bind error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_incoming_yields_each_connection() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();

        let c1 = TcpStream::connect(addr).await.unwrap();
        let c2 = TcpStream::connect(addr).await.unwrap();

        let mut accepted = Box::pin(incoming(&listener));
        let (_s1, peer1) = accepted.next().await.unwrap().unwrap();
        let (_s2, peer2) = accepted.next().await.unwrap().unwrap();

        let mut expected = vec![c1.local_addr().unwrap(), c2.local_addr().unwrap()];
        let mut got = vec![peer1, peer2];
        expected.sort();
        got.sort();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_classify_accept_error() {
        let cases = vec![
            (io::ErrorKind::ConnectionAborted, AcceptErrorAction::Continue),
            (io::ErrorKind::ConnectionReset, AcceptErrorAction::Continue),
            (io::ErrorKind::Interrupted, AcceptErrorAction::Continue),
            (io::ErrorKind::InvalidInput, AcceptErrorAction::Fatal),
            (io::ErrorKind::Unsupported, AcceptErrorAction::Fatal),
            (io::ErrorKind::OutOfMemory, AcceptErrorAction::Backoff),
            (io::ErrorKind::Other, AcceptErrorAction::Backoff),
        ];

        for (kind, expected) in cases {
            let error = io::Error::new(kind, "test error");
            assert_eq!(classify_accept_error(&error), expected, "{:?}", kind);
        }
    }
}
