//! SOCKS5 client module
//!
//! Implements the client half of SOCKS5 (RFC 1928) needed to open a TCP
//! tunnel through a proxy: no-auth method negotiation and CONNECT with a
//! domain-name destination.

pub mod client;
pub mod consts;

pub use client::{connect_through_proxy, handshake, Socks5Connector};
pub use consts::*;
