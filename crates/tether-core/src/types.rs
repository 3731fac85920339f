//! Core domain types

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::error::ConnectionError;

/// Terminal geometry in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    /// Number of rows
    pub rows: u16,
    /// Number of columns
    pub cols: u16,
}

impl TerminalSize {
    /// Create a new terminal size
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Default terminal size (24x80)
    pub fn default_size() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::default_size()
    }
}

impl fmt::Display for TerminalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// The IPv4 endpoint the agent dials out to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteEndpoint(SocketAddrV4);

impl RemoteEndpoint {
    /// Create an endpoint from an already parsed address
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self(SocketAddrV4::new(ip, port))
    }

    /// Parse a dotted-decimal IPv4 address and a decimal port
    pub fn parse(address: &str, port: &str) -> Result<Self, ConnectionError> {
        let ip: Ipv4Addr = address
            .trim()
            .parse()
            .map_err(|_| ConnectionError::InvalidAddress(address.to_string()))?;

        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| ConnectionError::InvalidPort(port.to_string()))?;
        if port == 0 {
            return Err(ConnectionError::InvalidPort("0".to_string()));
        }

        Ok(Self::new(ip, port))
    }

    /// The socket address to connect to
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(self.0)
    }

}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
