//! Error types for Sockrelay
//!
//! This module defines the error taxonomy of the relay. Process-level errors
//! (bind, broken listener) end the program; everything else is scoped to a
//! single session and is resolved by the session supervisor.

use std::io;
use thiserror::Error;

/// Main error type for Sockrelay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Failed to bind the listening socket
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address the relay tried to bind
        addr: String,
        /// Underlying socket error
        source: io::Error,
    },

    /// Accept failed on the listening socket
    #[error("Accept error: {0}")]
    Accept(#[source] io::Error),

    /// The SOCKS5 proxy could not be reached
    #[error("SOCKS5 proxy {addr} unreachable: {source}")]
    ProxyUnreachable {
        /// Proxy address as configured
        addr: String,
        /// Underlying connect error
        source: io::Error,
    },

    /// Malformed or unexpected reply during SOCKS5 negotiation
    #[error("SOCKS5 handshake failed: {0}")]
    ProxyHandshake(String),

    /// The proxy answered the CONNECT request with a non-zero reply code
    #[error("SOCKS5 connect failed: status {} ({})", .code, reply_name(.code))]
    ProxyConnect {
        /// Raw reply code from the proxy
        code: u8,
    },

    /// I/O error on either transport while relaying
    #[error("Relay I/O error: {0}")]
    RelayIo(#[source] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// Short label used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Bind { .. } => "bind",
            RelayError::Accept(_) => "accept",
            RelayError::ProxyUnreachable { .. } => "proxy_unreachable",
            RelayError::ProxyHandshake(_) => "proxy_handshake",
            RelayError::ProxyConnect { .. } => "proxy_connect",
            RelayError::RelayIo(_) => "relay_io",
            RelayError::Config(_) => "config",
        }
    }

    /// Whether the error only concerns one session
    pub fn is_session_scoped(&self) -> bool {
        matches!(
            self,
            RelayError::ProxyUnreachable { .. }
                | RelayError::ProxyHandshake(_)
                | RelayError::ProxyConnect { .. }
                | RelayError::RelayIo(_)
        )
    }

    pub(crate) fn handshake(msg: impl Into<String>) -> Self {
        RelayError::ProxyHandshake(msg.into())
    }
}

fn reply_name(code: &u8) -> &'static str {
    Socks5ReplyCode::describe(*code)
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Socks5ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl Socks5ReplyCode {
    /// Human-readable name for a raw reply code
    pub fn describe(code: u8) -> &'static str {
        match Socks5ReplyCode::try_from(code) {
            Ok(Socks5ReplyCode::Succeeded) => "succeeded",
            Ok(Socks5ReplyCode::GeneralFailure) => "general SOCKS server failure",
            Ok(Socks5ReplyCode::ConnectionNotAllowed) => "connection not allowed by ruleset",
            Ok(Socks5ReplyCode::NetworkUnreachable) => "network unreachable",
            Ok(Socks5ReplyCode::HostUnreachable) => "host unreachable",
            Ok(Socks5ReplyCode::ConnectionRefused) => "connection refused",
            Ok(Socks5ReplyCode::TtlExpired) => "TTL expired",
            Ok(Socks5ReplyCode::CommandNotSupported) => "command not supported",
            Ok(Socks5ReplyCode::AddressTypeNotSupported) => "address type not supported",
            Err(_) => "unknown reply code",
        }
    }
}

impl From<Socks5ReplyCode> for u8 {
    fn from(code: Socks5ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for Socks5ReplyCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Socks5ReplyCode::Succeeded),
            0x01 => Ok(Socks5ReplyCode::GeneralFailure),
            0x02 => Ok(Socks5ReplyCode::ConnectionNotAllowed),
            0x03 => Ok(Socks5ReplyCode::NetworkUnreachable),
            0x04 => Ok(Socks5ReplyCode::HostUnreachable),
            0x05 => Ok(Socks5ReplyCode::ConnectionRefused),
            0x06 => Ok(Socks5ReplyCode::TtlExpired),
            0x07 => Ok(Socks5ReplyCode::CommandNotSupported),
            0x08 => Ok(Socks5ReplyCode::AddressTypeNotSupported),
            other => Err(other),
        }
    }
}
