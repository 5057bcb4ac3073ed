//! Relay configuration types
//!
//! Defines the listener, proxy and target settings of the relay.

use super::TcpConfig;
use crate::error::RelayError;
use crate::helper::{duration_from_secs, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_IDLE_TIMEOUT_SECS};
use crate::socks::consts::MAX_DOMAIN_LEN;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    10443
}

fn default_proxy_addr() -> String {
    "127.0.0.1".to_string()
}

/// Default SOCKS5 proxy port (Tor)
fn default_proxy_port() -> u16 {
    9050
}

fn default_target_port() -> u16 {
    443
}

/// Default idle timeout in seconds
fn default_idle_timeout() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

/// Default proxy connect timeout in seconds
fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Relay configuration
    pub relay: ListenerConfig,
}

/// Listener configuration
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Local IP address to bind
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Local port to bind
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// SOCKS5 proxy host
    #[serde(default = "default_proxy_addr")]
    pub proxy_addr: String,

    /// SOCKS5 proxy port
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,

    /// Target host, resolved by the proxy (e.g. a .onion address)
    #[serde(default)]
    pub target_host: String,

    /// Target port
    #[serde(default = "default_target_port")]
    pub target_port: u16,

    /// Seconds without traffic in either direction before a session ends
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,

    /// Proxy connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Socket options
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig {
            bind_addr: default_bind_addr(),
            bind_port: default_bind_port(),
            proxy_addr: default_proxy_addr(),
            proxy_port: default_proxy_port(),
            target_host: String::new(),
            target_port: default_target_port(),
            idle_timeout: default_idle_timeout(),
            connect_timeout: default_connect_timeout(),
            tcp: TcpConfig::default(),
        }
    }
}

impl ListenerConfig {
    /// Create a configuration for the given target with default settings
    pub fn new(target_host: impl Into<String>) -> Self {
        ListenerConfig {
            target_host: target_host.into(),
            ..Default::default()
        }
    }

    /// Socket address to bind the listener on
    pub fn bind_socket_addr(&self) -> Result<SocketAddr, RelayError> {
        let ip: IpAddr = self.bind_addr.parse().map_err(|_| {
            RelayError::Config(format!(
                "bind_addr must be an IP address, got {:?}",
                self.bind_addr
            ))
        })?;
        Ok(SocketAddr::new(ip, self.bind_port))
    }

    /// Proxy address in `host:port` form, for logging
    pub fn proxy_endpoint(&self) -> String {
        format_host_port(&self.proxy_addr, self.proxy_port)
    }

    /// Target address in `host:port` form, for logging
    pub fn target_endpoint(&self) -> String {
        format_host_port(&self.target_host, self.target_port)
    }

    /// Idle timeout as a duration
    pub fn idle_timeout(&self) -> Duration {
        duration_from_secs(self.idle_timeout)
    }

    /// Proxy connect timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        duration_from_secs(self.connect_timeout)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.target_host.is_empty() {
            return Err(RelayError::Config("target_host is not set".to_string()));
        }
        if self.target_host.len() > MAX_DOMAIN_LEN {
            return Err(RelayError::Config(format!(
                "target_host is {} bytes, SOCKS5 allows at most {}",
                self.target_host.len(),
                MAX_DOMAIN_LEN
            )));
        }
        if self.proxy_addr.is_empty() {
            return Err(RelayError::Config("proxy_addr is not set".to_string()));
        }
        if self.proxy_port == 0 {
            return Err(RelayError::Config("proxy_port must not be 0".to_string()));
        }
        if self.target_port == 0 {
            return Err(RelayError::Config("target_port must not be 0".to_string()));
        }
        if self.idle_timeout == 0 {
            return Err(RelayError::Config("idle_timeout must not be 0".to_string()));
        }
        self.bind_socket_addr()?;
        Ok(())
    }
}

fn format_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
