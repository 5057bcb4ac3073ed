//! Helper utilities for Sockrelay
//!
//! This module provides constants and small utility functions shared across
//! the relay.

use std::time::Duration;

/// Size of each transfer buffer used by the splicer (64 KiB)
pub const DEFAULT_TRANSFER_BUFFER_SIZE: usize = 64 * 1024;

/// Default idle timeout for a relayed session in seconds
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

/// Default timeout for the TCP connect to the SOCKS5 proxy in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Backlog for the listening socket
pub const DEFAULT_LISTEN_BACKLOG: i32 = 1024;

/// Parse duration from seconds
pub fn duration_from_secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}
