//! Outbound TCP connector
//!
//! Dials the remote endpoint once. There is no retry: a failed connection
//! ends the program.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};

use tether_core::error::ConnectionError;
use tether_core::RemoteEndpoint;

/// Opens the outbound stream connection to a [`RemoteEndpoint`]
#[derive(Debug, Clone, Copy)]
pub struct TunnelConnector {
    endpoint: RemoteEndpoint,
}

impl TunnelConnector {
    /// Connector for `endpoint`
    pub fn new(endpoint: RemoteEndpoint) -> Self {
        Self { endpoint }
    }

    /// Connect with the platform's default connect behavior
    pub fn connect(&self) -> Result<Connection, ConnectionError> {
        tracing::info!("Connecting to {}", self.endpoint);

        match TcpStream::connect(self.endpoint.socket_addr()) {
            Ok(stream) => {
                tracing::info!("Connected to {}", self.endpoint);
                Ok(Connection::new(stream, self.endpoint.socket_addr()))
            }
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                tracing::warn!("Connection to {} refused", self.endpoint);
                Err(ConnectionError::Refused(self.endpoint.to_string()))
            }
            Err(source) => {
                tracing::warn!("Failed to connect to {}: {}", self.endpoint, source);
                Err(ConnectionError::Unreachable {
                    address: self.endpoint.to_string(),
                    source,
                })
            }
        }
    }
}

/// An open connection to the remote endpoint
///
/// The socket is closed exactly once: by [`Connection::close`], by handing
/// it to the relay with [`Connection::into_async`], or on drop.
#[derive(Debug)]
pub struct Connection {
    stream: Option<TcpStream>,
    remote: SocketAddr,
}

impl Connection {
    fn new(stream: TcpStream, remote: SocketAddr) -> Self {
        Self {
            stream: Some(stream),
            remote,
        }
    }

    /// Address of the remote endpoint
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Whether the socket is still held by this connection
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Raw descriptor of the socket, `-1` once closed
    pub fn as_raw_fd(&self) -> RawFd {
        self.stream.as_ref().map_or(-1, |s| s.as_raw_fd())
    }

    /// Shut down and release the socket. Later calls do nothing.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            tracing::debug!("Closed connection to {}", self.remote);
        }
    }

    /// Register the socket with the current tokio runtime
    pub fn into_async(mut self) -> io::Result<tokio::net::TcpStream> {
        let stream = self
            .stream
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection closed"))?;
        stream.set_nonblocking(true)?;
        tokio::net::TcpStream::from_std(stream)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
