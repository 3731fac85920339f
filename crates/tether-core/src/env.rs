//! Child environment construction
//!
//! The shell never inherits the agent's environment. Instead an
//! [`EnvironmentBuilder`] produces a fixed key/value set that is handed
//! straight to `execve`, so the agent's own process environment is never
//! touched.

use std::collections::BTreeMap;
use std::ffi::CString;

use crate::error::SpawnError;

/// Builder for the explicit environment of the spawned shell
#[derive(Debug, Clone, Default)]
pub struct EnvironmentBuilder {
    vars: BTreeMap<String, String>,
}

impl EnvironmentBuilder {
    /// Start from an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the terminal type (`TERM`)
    pub fn term(self, value: impl Into<String>) -> Self {
        self.with("TERM", value)
    }

    /// Set the command search path (`PATH`)
    pub fn path(self, value: impl Into<String>) -> Self {
        self.with("PATH", value)
    }

    /// Set the interactive prompt (`PS1`)
    pub fn prompt(self, value: impl Into<String>) -> Self {
        self.with("PS1", value)
    }

    fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Freeze the environment
    pub fn build(self) -> ChildEnvironment {
        ChildEnvironment { vars: self.vars }
    }
}

/// A frozen, explicit environment for the child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEnvironment {
    vars: BTreeMap<String, String>,
}

impl ChildEnvironment {
    /// Look up a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterate over variables in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Render as `KEY=value` C strings for `execve`
    pub fn to_c_strings(&self) -> Result<Vec<CString>, SpawnError> {
        self.vars
            .iter()
            .map(|(key, value)| {
                if key.contains('=') {
                    return Err(SpawnError::InvalidArgument(format!(
                        "environment key {}",
                        key
                    )));
                }
                CString::new(format!("{}={}", key, value))
                    .map_err(|_| SpawnError::InvalidArgument(format!("environment entry {}", key)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_only_requested_vars() {
        let env = EnvironmentBuilder::new()
            .term("xterm-256color")
            .path("/usr/bin:/bin")
            .prompt("$ ")
            .build();

        assert_eq!(env.len(), 3);
        assert_eq!(env.get("TERM"), Some("xterm-256color"));
        assert_eq!(env.get("PATH"), Some("/usr/bin:/bin"));
        assert_eq!(env.get("PS1"), Some("$ "));
        assert_eq!(env.get("HOME"), None);
    }

    #[test]
    fn test_builder_does_not_read_process_environment() {
        // Whatever the test runner exports must not appear.
        let env = EnvironmentBuilder::new().term("dumb").build();
        for (key, _) in std::env::vars() {
            if key != "TERM" {
                assert_eq!(env.get(&key), None, "{} leaked into child environment", key);
            }
        }
    }

    #[test]
    fn test_later_value_wins() {
        let env = EnvironmentBuilder::new().term("vt100").term("xterm").build();
        assert_eq!(env.get("TERM"), Some("xterm"));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_c_strings_are_key_value_pairs() {
        let env = EnvironmentBuilder::new()
            .term("xterm")
            .prompt("\\w\\$ ")
            .build();
        let rendered: Vec<String> = env
            .to_c_strings()
            .unwrap()
            .into_iter()
            .map(|c| c.into_string().unwrap())
            .collect();
        assert_eq!(rendered, vec!["PS1=\\w\\$ ", "TERM=xterm"]);
    }

    #[test]
    fn test_c_strings_reject_nul() {
        let env = EnvironmentBuilder::new().term("xt\0erm").build();
        assert!(matches!(
            env.to_c_strings(),
            Err(SpawnError::InvalidArgument(_))
        ));
    }
}
