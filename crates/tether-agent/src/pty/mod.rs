//! Pseudo-terminal management
//!
//! Allocation of the terminal pair, the shell process attached to it, and
//! async access to the controlling side for the relay.

mod allocator;
mod mode;
mod spawner;
mod stream;

pub use allocator::{
    PlatformProvider, PseudoTerminal, PseudoTerminalProvider, RawPair, TerminalAllocator,
};
pub use mode::apply_hybrid_mode;
pub use spawner::{
    ChildHandle, ChildState, ExitReason, ProcessSpawner, SpawnRequest, EXEC_FAILED_STATUS,
};
pub use stream::PtyStream;
