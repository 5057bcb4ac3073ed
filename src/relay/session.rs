//! Session supervisor
//!
//! Drives one accepted client connection through
//! `ACCEPTED -> HANDSHAKING -> RELAYING -> CLOSED`, or into `FAILED` when the
//! upstream cannot be opened or the client leaves first. Both transports are
//! shut down on every exit path, and the outcome is logged.

use crate::error::RelayError;
use crate::helper::DEFAULT_TRANSFER_BUFFER_SIZE;
use crate::relay::splice::{splice, CloseReason, Side, SpliceReport};
use crate::transport::Connector;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Client transport obtained from the acceptor
    Accepted,
    /// Opening the upstream through the proxy
    Handshaking,
    /// Splicing client and upstream
    Relaying,
    /// Finished after relaying
    Closed,
    /// Upstream could not be opened
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Accepted => "ACCEPTED",
            SessionState::Handshaking => "HANDSHAKING",
            SessionState::Relaying => "RELAYING",
            SessionState::Closed => "CLOSED",
            SessionState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// Relay ended by EOF or idle timeout
    Completed(SpliceReport),
    /// Relay ended by an I/O error on either transport
    RelayFailed(RelayError),
    /// Upstream could not be opened; nothing was relayed
    Failed(RelayError),
}

impl SessionOutcome {
    /// Terminal state matching this outcome
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Completed(_) | SessionOutcome::RelayFailed(_) => SessionState::Closed,
            SessionOutcome::Failed(_) => SessionState::Failed,
        }
    }

    /// Error carried by the outcome, if any
    pub fn error(&self) -> Option<&RelayError> {
        match self {
            SessionOutcome::Completed(_) => None,
            SessionOutcome::RelayFailed(e) | SessionOutcome::Failed(e) => Some(e),
        }
    }
}

/// One accepted client connection
///
/// The session exclusively owns its client stream and, once the handshake
/// succeeds, its upstream stream.
pub struct Session<S, U> {
    peer: SocketAddr,
    state: SessionState,
    client: S,
    upstream: Option<U>,
}

impl<S, U> Session<S, U>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    U: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a session for a freshly accepted client
    pub fn new(client: S, peer: SocketAddr) -> Self {
        Session {
            peer,
            state: SessionState::Accepted,
            client,
            upstream: None,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {}: {} -> {}", self.peer, self.state, next);
        self.state = next;
    }

    /// Run the session to completion and report its outcome
    ///
    /// Consumes the session: when this returns, both transports are closed.
    pub async fn run<C>(mut self, connector: &C, idle_timeout: Duration) -> SessionOutcome
    where
        C: Connector<Stream = U>,
    {
        self.transition(SessionState::Handshaking);

        let outcome = match self.open_upstream(connector).await {
            Ok((upstream, early)) => {
                self.transition(SessionState::Relaying);
                let upstream = self.upstream.insert(upstream);
                match forward(&mut self.client, upstream, &early, idle_timeout).await {
                    Ok(report) => SessionOutcome::Completed(report),
                    Err(e) => SessionOutcome::RelayFailed(e),
                }
            }
            Err(e) => SessionOutcome::Failed(e),
        };

        self.close().await;
        self.transition(outcome.state());
        log_outcome(self.peer, &outcome);

        outcome
    }

    /// Open the upstream while watching the client
    ///
    /// A client that hangs up during the handshake aborts it. Bytes the
    /// client sends early are kept, up to one transfer buffer, and returned
    /// so they reach the upstream ahead of the relayed stream.
    async fn open_upstream<C>(&mut self, connector: &C) -> Result<(U, Vec<u8>), RelayError>
    where
        C: Connector<Stream = U>,
    {
        let mut connect = connector.connect();
        let mut early = Vec::new();
        let mut buf = [0u8; 4096];

        loop {
            if early.len() >= DEFAULT_TRANSFER_BUFFER_SIZE {
                let upstream = connect.await?;
                return Ok((upstream, early));
            }

            tokio::select! {
                result = &mut connect => {
                    let upstream = result?;
                    return Ok((upstream, early));
                }
                read = self.client.read(&mut buf) => match read {
                    Ok(0) => {
                        return Err(RelayError::RelayIo(io::Error::new(
                            io::ErrorKind::ConnectionAborted,
                            "client closed during handshake",
                        )))
                    }
                    Ok(n) => early.extend_from_slice(&buf[..n]),
                    Err(e) => return Err(RelayError::RelayIo(e)),
                },
            }
        }
    }

    /// Shut down both transports
    ///
    /// Shutdown errors are ignored: the peer may already be gone. The
    /// descriptors themselves are released when the session is dropped.
    async fn close(&mut self) {
        if let Err(e) = self.client.shutdown().await {
            debug!("Client shutdown for {}: {}", self.peer, e);
        }
        if let Some(upstream) = self.upstream.as_mut() {
            if let Err(e) = upstream.shutdown().await {
                debug!("Upstream shutdown for {}: {}", self.peer, e);
            }
        }
    }
}

/// Deliver early client bytes, then splice
async fn forward<S, U>(
    client: &mut S,
    upstream: &mut U,
    early: &[u8],
    idle_timeout: Duration,
) -> Result<SpliceReport, RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    if !early.is_empty() {
        upstream.write_all(early).await.map_err(RelayError::RelayIo)?;
        upstream.flush().await.map_err(RelayError::RelayIo)?;
    }

    let mut report = splice(client, upstream, idle_timeout).await?;
    report.a_to_b += early.len() as u64;
    Ok(report)
}

fn side_name(side: Side) -> &'static str {
    match side {
        Side::A => "client",
        Side::B => "upstream",
    }
}

fn log_outcome(peer: SocketAddr, outcome: &SessionOutcome) {
    if let SessionOutcome::Completed(report) = outcome {
        match report.reason {
            CloseReason::Eof(side) => info!(
                "Connection from {} closed by {} ({} bytes sent, {} bytes received)",
                peer,
                side_name(side),
                report.a_to_b,
                report.b_to_a
            ),
            CloseReason::IdleTimeout => info!(
                "Connection from {} idle timeout ({} bytes sent, {} bytes received)",
                peer, report.a_to_b, report.b_to_a
            ),
        }
    }

    if let Some(e) = outcome.error() {
        if e.is_session_scoped() {
            warn!("Connection from {} error [{}]: {}", peer, e.kind(), e);
        } else {
            error!("Connection from {} error [{}]: {}", peer, e.kind(), e);
        }
    }
}
