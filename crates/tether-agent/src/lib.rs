//! tether-agent: dial-out interactive shell relay
//!
//! Connects to a remote endpoint, starts a login shell on a fresh
//! pseudo-terminal and relays raw bytes between the two until either side
//! goes away.

pub mod pty;
pub mod relay;
pub mod session;
pub mod supervisor;
pub mod tunnel;

pub use relay::{Multiplexer, RelayOutcome, RelayStats, SessionEnd};
pub use supervisor::LifecycleSupervisor;
