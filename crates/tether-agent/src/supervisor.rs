//! Signal policy and session teardown

use std::time::Duration;

use nix::sys::signal::{signal, SigHandler, Signal};

use crate::pty::{ChildHandle, ChildState};

/// Owns the process-wide signal policy and the end-of-session cleanup.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleSupervisor {
    grace: Duration,
}

impl LifecycleSupervisor {
    /// Supervisor that waits `grace` for the child at each teardown step
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Ignore `SIGPIPE` and `SIGCHLD` in this process.
    ///
    /// Writes to a vanished peer then fail with `EPIPE` at the write site,
    /// and exited children never linger as zombies.
    pub fn install(&self) -> nix::Result<()> {
        // SAFETY: SIG_IGN installs no handler code.
        unsafe {
            signal(Signal::SIGPIPE, SigHandler::SigIgn)?;
            signal(Signal::SIGCHLD, SigHandler::SigIgn)?;
        }
        tracing::debug!("Ignoring SIGPIPE and SIGCHLD");
        Ok(())
    }

    /// End the session: terminate the child, then release the terminal and
    /// the connection.
    ///
    /// The child gets `SIGTERM` and, once both descriptors are closed, the
    /// grace period to exit. A child still running afterwards is killed.
    pub fn teardown<T, C>(&self, child: &mut ChildHandle, terminal: T, connection: C) -> ChildState {
        if let Err(e) = child.request_termination() {
            tracing::warn!("Failed to signal PID {}: {}", child.pid(), e);
        }

        drop(terminal);
        drop(connection);

        self.reap(child)
    }

    /// Clean up a child whose session never reached the relay.
    pub fn abort(&self, child: &mut ChildHandle) -> ChildState {
        if let Err(e) = child.request_termination() {
            tracing::warn!("Failed to signal PID {}: {}", child.pid(), e);
        }
        self.reap(child)
    }

    fn reap(&self, child: &mut ChildHandle) -> ChildState {
        if child.reap_within(self.grace) {
            tracing::info!("Shell PID {} ended: {:?}", child.pid(), child.state());
            return child.state();
        }

        tracing::warn!(
            "Shell PID {} still running after {:?}, killing",
            child.pid(),
            self.grace
        );
        if let Err(e) = child.kill() {
            tracing::warn!("Failed to kill PID {}: {}", child.pid(), e);
        }
        child.reap_within(self.grace);
        child.state()
    }
}
