//! Configuration module for Sockrelay
//!
//! This module provides configuration types and parsing for the relay.

mod relay;
mod transport;

pub use relay::{Config, ListenerConfig};
pub use transport::TcpConfig;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let config_str = r#"
[relay]
target_host = "example.onion"
"#;

        let config = parse_config(config_str).unwrap();
        assert_eq!(config.relay.target_host, "example.onion");
        assert_eq!(config.relay.target_port, 443);
        assert_eq!(config.relay.proxy_port, 9050);
        assert_eq!(config.relay.bind_port, 10443);
        assert!(config.relay.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config_str = r#"
[relay]
bind_addr = "0.0.0.0"
bind_port = 8443
proxy_addr = "tor.internal"
proxy_port = 9150
target_host = "example.onion"
target_port = 8080
idle_timeout = 120
connect_timeout = 5

[relay.tcp]
nodelay = false
keepalive_secs = 30
keepalive_interval = 10
"#;

        let config = parse_config(config_str).unwrap();
        let relay = &config.relay;
        assert_eq!(relay.bind_addr, "0.0.0.0");
        assert_eq!(relay.bind_port, 8443);
        assert_eq!(relay.proxy_endpoint(), "tor.internal:9150");
        assert_eq!(relay.target_endpoint(), "example.onion:8080");
        assert_eq!(relay.idle_timeout, 120);
        assert_eq!(relay.connect_timeout, 5);
        assert!(!relay.tcp.nodelay);
        assert_eq!(relay.tcp.keepalive_secs, 30);
    }

    #[test]
    fn test_parse_config_missing_relay_table() {
        assert!(parse_config("").is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[relay]\ntarget_host = \"file.onion\"\nbind_port = 0").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.relay.target_host, "file.onion");
        assert_eq!(config.relay.bind_port, 0);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/sockrelay.toml");
        assert!(result.is_err());
    }
}
