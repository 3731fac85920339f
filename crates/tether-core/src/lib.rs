//! tether-core: Core abstractions and configuration for tether
//!
//! This crate provides the error hierarchy, domain types, session
//! configuration, child environment construction and shell resolution
//! used by the agent.

pub mod config;
pub mod env;
pub mod error;
pub mod shell;
pub mod types;

pub use env::{ChildEnvironment, EnvironmentBuilder};
pub use error::TetherError;
pub use types::{RemoteEndpoint, TerminalSize};
