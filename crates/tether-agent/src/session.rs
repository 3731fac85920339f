//! One complete relay session
//!
//! Setup (connect, allocate, spawn) runs synchronously while the process is
//! still single-threaded. Only then is the single-threaded runtime built to
//! drive the relay.

use std::os::fd::OwnedFd;

use tokio::runtime::{Builder, Runtime};

use tether_core::config::SessionConfig;
use tether_core::{RemoteEndpoint, TetherError};

use crate::pty::{ChildHandle, ProcessSpawner, PtyStream, SpawnRequest, TerminalAllocator};
use crate::relay::{Multiplexer, RelayOutcome};
use crate::supervisor::LifecycleSupervisor;
use crate::tunnel::{Connection, TunnelConnector};

/// Run a session against `endpoint` until the relay ends.
///
/// Returns the relay outcome whenever the relay ran, whatever ended it.
/// Any error means the relay never started.
pub fn run(endpoint: RemoteEndpoint, config: &SessionConfig) -> Result<RelayOutcome, TetherError> {
    let connection = TunnelConnector::new(endpoint).connect()?;
    tracing::debug!("Connection to {} established", connection.remote());

    let mut terminal = TerminalAllocator::new(config.size).allocate()?;

    let request = SpawnRequest::login_shell(config).close_in_child(connection.as_raw_fd());
    let mut child = ProcessSpawner::new(request).spawn(&mut terminal)?;

    let supervisor = LifecycleSupervisor::new(config.terminate_grace);
    if let Err(e) = supervisor.install() {
        supervisor.abort(&mut child);
        return Err(std::io::Error::from(e).into());
    }

    let runtime = match build_runtime() {
        Ok(runtime) => runtime,
        Err(e) => {
            supervisor.abort(&mut child);
            return Err(e.into());
        }
    };

    let controlling = terminal.into_controlling();
    let outcome = relay(&runtime, &supervisor, &mut child, connection, controlling, config)?;

    tracing::info!("Session with {} finished: {}", endpoint, outcome.end);
    Ok(outcome)
}

fn build_runtime() -> std::io::Result<Runtime> {
    Builder::new_current_thread().enable_io().build()
}

fn relay(
    runtime: &Runtime,
    supervisor: &LifecycleSupervisor,
    child: &mut ChildHandle,
    connection: Connection,
    controlling: OwnedFd,
    config: &SessionConfig,
) -> Result<RelayOutcome, TetherError> {
    // Registering with the reactor needs the runtime context.
    let _guard = runtime.enter();

    let endpoints = PtyStream::new(controlling)
        .and_then(|terminal| Ok((terminal, connection.into_async()?)));
    let (terminal, connection) = match endpoints {
        Ok(endpoints) => endpoints,
        Err(e) => {
            tracing::error!("Failed to prepare relay endpoints: {}", e);
            supervisor.abort(child);
            return Err(e.into());
        }
    };

    let (outcome, terminal, connection) = runtime.block_on(async move {
        let mut terminal = terminal;
        let mut connection = connection;
        let outcome = Multiplexer::from_config(config)
            .run(&mut connection, &mut terminal)
            .await;
        (outcome, terminal, connection)
    });

    supervisor.teardown(child, terminal, connection);
    Ok(outcome)
}
