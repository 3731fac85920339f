//! Bidirectional byte relay between the connection and the terminal
//!
//! The relay waits on both endpoints at once and copies whatever arrives to
//! the other side unchanged. The first end-of-stream or error on either
//! side ends the session for both directions.

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use tether_core::config::SessionConfig;
use tether_core::error::{RelayError, RelaySide};

/// Fixed-capacity buffer reused for every read in one direction
#[derive(Debug)]
pub struct RelayBuffer {
    data: Box<[u8]>,
}

impl RelayBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
        }
    }

    fn space(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn filled(&self, n: usize) -> &[u8] {
        &self.data[..n]
    }
}

/// Counters for one relay direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionStats {
    /// Bytes delivered
    pub bytes: u64,
    /// Reads that produced data
    pub chunks: u64,
}

impl DirectionStats {
    fn record(&mut self, n: usize) {
        self.bytes += n as u64;
        self.chunks += 1;
    }
}

/// Traffic counters for a whole session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Connection to terminal
    pub inbound: DirectionStats,
    /// Terminal to connection
    pub outbound: DirectionStats,
}

/// Why the relay stopped
#[derive(Debug)]
pub enum SessionEnd {
    /// The remote endpoint closed the connection
    RemoteClosed,
    /// Every subordinate descriptor closed, usually because the shell exited
    TerminalClosed,
    /// Reading or writing an endpoint failed
    Failed(RelayError),
}

impl SessionEnd {
    fn closed(side: RelaySide) -> Self {
        match side {
            RelaySide::Connection => SessionEnd::RemoteClosed,
            RelaySide::Terminal => SessionEnd::TerminalClosed,
        }
    }
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::RemoteClosed => write!(f, "remote closed the connection"),
            SessionEnd::TerminalClosed => write!(f, "terminal closed"),
            SessionEnd::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Result of a finished relay
#[derive(Debug)]
pub struct RelayOutcome {
    /// Termination reason
    pub end: SessionEnd,
    /// Traffic counters
    pub stats: RelayStats,
}

/// Readiness-driven relay loop
#[derive(Debug, Clone, Copy)]
pub struct Multiplexer {
    capacity: usize,
}

impl Multiplexer {
    /// Relay with buffers of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Relay sized from the session configuration
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.buffer_capacity)
    }

    /// Relay until either endpoint closes or fails.
    ///
    /// Each wakeup performs at most one read per ready endpoint, and the
    /// bytes read are fully written to the other endpoint before the next
    /// wait. Nothing is drained from the surviving side after the end.
    pub async fn run<C, T>(&self, mut connection: C, mut terminal: T) -> RelayOutcome
    where
        C: AsyncRead + AsyncWrite + Unpin,
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut inbound = RelayBuffer::new(self.capacity);
        let mut outbound = RelayBuffer::new(self.capacity);
        let mut stats = RelayStats::default();

        tracing::info!("Relay started ({} byte buffers)", self.capacity);

        let end = loop {
            let step = tokio::select! {
                result = connection.read(inbound.space()) => {
                    forward(result, RelaySide::Connection, &inbound, &mut terminal, &mut stats.inbound).await
                }
                result = terminal.read(outbound.space()) => {
                    forward(result, RelaySide::Terminal, &outbound, &mut connection, &mut stats.outbound).await
                }
            };

            if let Some(end) = step {
                break end;
            }
        };

        tracing::info!(
            "Relay ended: {} (in: {} bytes / {} chunks, out: {} bytes / {} chunks)",
            end,
            stats.inbound.bytes,
            stats.inbound.chunks,
            stats.outbound.bytes,
            stats.outbound.chunks
        );

        RelayOutcome { end, stats }
    }
}

/// Deliver one read result from `from` to `to`. Returns the session end, if any.
async fn forward<W>(
    result: io::Result<usize>,
    from: RelaySide,
    buffer: &RelayBuffer,
    to: &mut W,
    stats: &mut DirectionStats,
) -> Option<SessionEnd>
where
    W: AsyncWrite + Unpin,
{
    let n = match result {
        Ok(0) => return Some(SessionEnd::closed(from)),
        Ok(n) => n,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => return None,
        Err(source) => {
            return Some(SessionEnd::Failed(RelayError::Read { side: from, source }));
        }
    };

    let data = buffer.filled(n);
    let written = async {
        to.write_all(data).await?;
        to.flush().await
    }
    .await;

    if let Err(source) = written {
        return Some(SessionEnd::Failed(RelayError::Write {
            side: opposite(from),
            source,
        }));
    }

    stats.record(n);
    tracing::trace!("Relayed {} bytes from {}", n, from);
    None
}

fn opposite(side: RelaySide) -> RelaySide {
    match side {
        RelaySide::Connection => RelaySide::Terminal,
        RelaySide::Terminal => RelaySide::Connection,
    }
}
