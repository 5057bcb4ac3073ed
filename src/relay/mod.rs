//! Relay module for Sockrelay
//!
//! Accepts client connections and tunnels each one to the configured target
//! through the SOCKS5 proxy, one task per connection.
//!
//! ```text
//! TCP Client -> Sockrelay -> SOCKS5 Proxy -> Target
//! ```

pub mod listener;
pub mod session;
pub mod splice;

pub use listener::{bind_listener, incoming};
pub use session::{Session, SessionOutcome, SessionState};
pub use splice::{splice, CloseReason, SpliceReport};

use crate::config::ListenerConfig;
use crate::error::RelayError;
use crate::socks::Socks5Connector;
use crate::transport::{Connector, SocketOpts};
use futures::StreamExt;
use listener::{classify_accept_error, AcceptErrorAction};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, info_span, warn, Instrument};

/// Pause before accepting again after a resource error
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound relay, ready to accept connections
pub struct Relay<C: Connector> {
    /// Relay configuration
    config: Arc<ListenerConfig>,
    /// Listening socket
    listener: TcpListener,
    /// Opens the upstream for each session
    connector: Arc<C>,
}

impl Relay<Socks5Connector> {
    /// Bind the listener and tunnel through the configured SOCKS5 proxy
    pub fn bind(config: ListenerConfig) -> Result<Self, RelayError> {
        let connector = Socks5Connector::from_config(&config);
        Relay::with_connector(config, connector)
    }
}

impl<C: Connector> Relay<C> {
    /// Bind the listener with a custom upstream connector
    pub fn with_connector(config: ListenerConfig, connector: C) -> Result<Self, RelayError> {
        config.validate()?;
        let listener = bind_listener(config.bind_socket_addr()?)?;

        Ok(Relay {
            config: Arc::new(config),
            listener,
            connector: Arc::new(connector),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Accept connections until shutdown
    ///
    /// Returns an error only when the listening socket itself fails.
    /// Sessions still running at shutdown are left to finish on their own.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<(), RelayError> {
        let socket_opts = SocketOpts::from_tcp_config(&self.config.tcp);
        let idle_timeout = self.config.idle_timeout();

        let accepted = incoming(&self.listener);
        futures::pin_mut!(accepted);

        loop {
            tokio::select! {
                next = accepted.next() => {
                    let (stream, peer) = match next {
                        Some(Ok(conn)) => conn,
                        Some(Err(e)) => match classify_accept_error(&e) {
                            AcceptErrorAction::Continue => {
                                warn!("Accept error: {}", e);
                                continue;
                            }
                            AcceptErrorAction::Backoff => {
                                warn!("Accept error: {}, pausing {:?}", e, ACCEPT_BACKOFF);
                                tokio::time::sleep(ACCEPT_BACKOFF).await;
                                continue;
                            }
                            AcceptErrorAction::Fatal => {
                                error!("Listening socket failed: {}", e);
                                return Err(RelayError::Accept(e));
                            }
                        },
                        None => return Ok(()),
                    };

                    info!("Connection from {}", peer);
                    socket_opts.hint(&stream);

                    let connector = self.connector.clone();
                    let span = info_span!("session", peer = %peer);
                    tokio::spawn(
                        async move {
                            Session::new(stream, peer)
                                .run(&*connector, idle_timeout)
                                .await;
                        }
                        .instrument(span),
                    );
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, no longer accepting connections");
                    return Ok(());
                }
            }
        }
    }
}

/// Bind and run the relay until shutdown
pub async fn run_relay(
    config: ListenerConfig,
    shutdown_rx: broadcast::Receiver<bool>,
) -> anyhow::Result<()> {
    let relay = Relay::bind(config)?;
    let local_addr = relay.local_addr()?;

    info!(
        "Listening on {} -> {} via SOCKS5 {}",
        local_addr,
        relay.config().target_endpoint(),
        relay.config().proxy_endpoint()
    );

    relay.run(shutdown_rx).await?;

    info!("Relay stopped");
    Ok(())
}
