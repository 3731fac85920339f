//! Configuration management for tether
//!
//! tether reads no configuration file and no environment variables. A
//! [`SessionConfig`] starts from compiled-in defaults and the binary applies
//! command-line overrides on top.

mod session;

pub use session::{
    SessionConfig, DEFAULT_PATH, DEFAULT_PROMPT, DEFAULT_SHELL, DEFAULT_TERM, FALLBACK_SHELL,
    RELAY_BUFFER_CAPACITY, TERMINATE_GRACE,
};
