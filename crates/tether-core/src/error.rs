//! Core error types for tether

use std::fmt;

use nix::errno::Errno;
use thiserror::Error;

/// Top-level error type for a tether session
///
/// Every variant is terminal: a session is never retried.
#[derive(Error, Debug)]
pub enum TetherError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Terminal error
    #[error("Terminal error: {0}")]
    Terminal(#[from] TerminalError),

    /// Process creation error
    #[error("Spawn error: {0}")]
    Spawn(#[from] SpawnError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors opening the outbound connection
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Address is not a dotted-decimal IPv4 address
    #[error("Invalid IPv4 address: {0}")]
    InvalidAddress(String),

    /// Port is not a number in 1..=65535
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    /// The remote actively refused the connection
    #[error("Connection refused by {0}")]
    Refused(String),

    /// The remote could not be reached
    #[error("Remote unreachable {address}: {source}")]
    Unreachable {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Pseudo-terminal allocation errors
#[derive(Error, Debug)]
pub enum TerminalError {
    /// Failed to open the controlling side
    #[error("failed to open pseudo-terminal: {0}")]
    Open(#[source] Errno),

    /// grantpt failed
    #[error("failed to grant pseudo-terminal access: {0}")]
    Grant(#[source] Errno),

    /// unlockpt failed
    #[error("failed to unlock pseudo-terminal: {0}")]
    Unlock(#[source] Errno),

    /// Could not determine the subordinate device name
    #[error("failed to resolve subordinate device name: {0}")]
    Name(#[source] Errno),

    /// Failed to open the subordinate side
    #[error("failed to open subordinate device {path}: {source}")]
    OpenSubordinate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading or applying the terminal mode failed
    #[error("failed to apply terminal mode: {0}")]
    Mode(#[source] Errno),

    /// Applying the window size failed
    #[error("failed to apply terminal geometry: {0}")]
    Geometry(#[source] Errno),
}

/// Process creation errors
#[derive(Error, Debug)]
pub enum SpawnError {
    /// fork failed
    #[error("failed to create child process: {0}")]
    Fork(#[source] Errno),

    /// An argument or environment entry contains a NUL byte
    #[error("invalid {0}: contains NUL byte")]
    InvalidArgument(String),

    /// The subordinate side was already handed to a child
    #[error("subordinate side already handed off")]
    SubordinateTaken,
}

/// Which relay endpoint an I/O failure happened on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaySide {
    /// The network connection
    Connection,
    /// The controlling side of the pseudo-terminal
    Terminal,
}

impl fmt::Display for RelaySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelaySide::Connection => write!(f, "connection"),
            RelaySide::Terminal => write!(f, "terminal"),
        }
    }
}

/// Read or write failures on a relay endpoint
#[derive(Error, Debug)]
pub enum RelayError {
    /// Reading from an endpoint failed
    #[error("read from {side} failed: {source}")]
    Read {
        side: RelaySide,
        #[source]
        source: std::io::Error,
    },

    /// Writing to an endpoint failed
    #[error("write to {side} failed: {source}")]
    Write {
        side: RelaySide,
        #[source]
        source: std::io::Error,
    },
}

impl RelayError {
    /// The endpoint that failed
    pub fn side(&self) -> RelaySide {
        match self {
            RelayError::Read { side, .. } | RelayError::Write { side, .. } => *side,
        }
    }
}
