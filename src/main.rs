//! Sockrelay - SOCKS5 TCP Tunnel Relay
//!
//! This is the main entry point for the Sockrelay application.

use anyhow::{Context, Result};
use clap::Parser;
use sockrelay::config::{load_config, ListenerConfig};
use sockrelay::run_relay;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Sockrelay - forward local TCP connections to a fixed target through SOCKS5
#[derive(Parser, Debug)]
#[command(name = "sockrelay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Target host resolved by the proxy (e.g. a .onion address)
    target: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local address to bind
    #[arg(long)]
    bind_addr: Option<String>,

    /// Local port to listen on
    #[arg(long)]
    listen_port: Option<u16>,

    /// SOCKS5 proxy host
    #[arg(long)]
    proxy_addr: Option<String>,

    /// SOCKS5 proxy port
    #[arg(long)]
    proxy_port: Option<u16>,

    /// Target port
    #[arg(long)]
    target_port: Option<u16>,

    /// Idle timeout in seconds
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

impl Args {
    /// Build the listener configuration: CLI overrides, then file, then defaults
    fn listener_config(&self) -> Result<ListenerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?.relay,
            None => ListenerConfig::default(),
        };

        if let Some(target) = &self.target {
            config.target_host = target.clone();
        }
        if let Some(bind_addr) = &self.bind_addr {
            config.bind_addr = bind_addr.clone();
        }
        if let Some(port) = self.listen_port {
            config.bind_port = port;
        }
        if let Some(proxy_addr) = &self.proxy_addr {
            config.proxy_addr = proxy_addr.clone();
        }
        if let Some(port) = self.proxy_port {
            config.proxy_port = port;
        }
        if let Some(port) = self.target_port {
            config.target_port = port;
        }
        if let Some(secs) = self.idle_timeout {
            config.idle_timeout = secs;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    let config = args.listener_config()?;

    info!("Sockrelay v{}", sockrelay::VERSION);
    if let Some(path) = &args.config {
        info!("Configuration loaded from: {:?}", path);
    }

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // Handle Ctrl+C and termination signals (cross-platform)
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            info!("Received Ctrl+C, shutting down...");
                        }
                        _ = sigterm.recv() => {
                            info!("Received SIGTERM, shutting down...");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to setup SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received Ctrl+C, shutting down...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            // On Windows, only handle Ctrl+C
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
        }

        let _ = shutdown_tx_clone.send(true);
    });

    // Run the relay
    run_relay(config, shutdown_rx).await
}

/// Setup logging based on configuration
///
/// `RUST_LOG`, when set, takes precedence over `--log-level`.
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
