//! # Sockrelay - SOCKS5 TCP Tunnel Relay
//!
//! Sockrelay listens on a local TCP port and, for every inbound connection,
//! opens a connection to one fixed target through a SOCKS5 proxy (typically
//! Tor), then splices the two sockets together until either side closes or
//! the session goes idle.
//!
//! ## Features
//!
//! - **Proxy-side Resolution**: the target is sent as a domain name, so
//!   `.onion` and other proxy-only names work
//! - **Task per Connection**: a stalled session never blocks the acceptor
//!   or other sessions
//! - **Paired Close**: client and upstream sockets are always closed together
//! - **Idle Timeout**: sessions with no traffic in either direction end after
//!   a configurable period (60s by default)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sockrelay::config::ListenerConfig;
//! use sockrelay::run_relay;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ListenerConfig::new("example.onion");
//!     let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_relay(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! TCP Client -> Sockrelay -> SOCKS5 Proxy -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod helper;
pub mod relay;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config, ListenerConfig};
pub use error::{RelayError, Socks5ReplyCode};
pub use relay::{run_relay, Relay};
pub use socks::connect_through_proxy;

/// Version of the Sockrelay library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "sockrelay");
    }
}
