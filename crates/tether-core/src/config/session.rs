//! Session configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::env::EnvironmentBuilder;
use crate::types::TerminalSize;

/// Terminal type advertised to the shell
pub const DEFAULT_TERM: &str = "xterm-256color";

/// Command search path handed to the shell
pub const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Prompt handed to the shell: working directory followed by `$` or `#`
pub const DEFAULT_PROMPT: &str = "\\w\\$ ";

/// Shell used when none is configured
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Shell used when the resolved one is not executable
pub const FALLBACK_SHELL: &str = "/bin/sh";

/// Capacity of each relay buffer in bytes
pub const RELAY_BUFFER_CAPACITY: usize = 4096;

/// How long teardown waits for the shell to exit before escalating
pub const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// Configuration for one relay session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Initial terminal geometry
    pub size: TerminalSize,

    /// TERM value for the shell
    pub term: String,

    /// PATH value for the shell
    pub path: String,

    /// PS1 value for the shell
    pub prompt: String,

    /// Shell to prefer over the default
    pub shell: Option<PathBuf>,

    /// Shell used when `shell` is unset
    pub default_shell: PathBuf,

    /// Shell used when the resolved one is not executable
    pub fallback_shell: PathBuf,

    /// Capacity of each relay buffer
    pub buffer_capacity: usize,

    /// Grace period for the shell to exit during teardown
    pub terminate_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            size: TerminalSize::default(),
            term: DEFAULT_TERM.to_string(),
            path: DEFAULT_PATH.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            shell: None,
            default_shell: PathBuf::from(DEFAULT_SHELL),
            fallback_shell: PathBuf::from(FALLBACK_SHELL),
            buffer_capacity: RELAY_BUFFER_CAPACITY,
            terminate_grace: TERMINATE_GRACE,
        }
    }
}

impl SessionConfig {
    /// Environment builder pre-populated from this configuration
    pub fn environment(&self) -> EnvironmentBuilder {
        EnvironmentBuilder::new()
            .term(&self.term)
            .path(&self.path)
            .prompt(&self.prompt)
    }
}
