//! Shell resolution
//!
//! Picks the program the spawned terminal runs: the configured shell when
//! present, otherwise the default shell, falling back to a minimal shell
//! when the choice is not executable.

use std::path::{Path, PathBuf};

use nix::unistd::{access, AccessFlags};

/// Whether `path` names an executable non-directory file
pub fn is_executable(path: &Path) -> bool {
    if path.is_dir() {
        return false;
    }
    access(path, AccessFlags::X_OK).is_ok()
}

/// Resolve the shell to execute
pub fn resolve_shell(preferred: Option<&Path>, default_shell: &Path, fallback: &Path) -> PathBuf {
    let candidate = preferred
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(default_shell)
        .to_path_buf();

    if is_executable(&candidate) {
        candidate
    } else {
        tracing::debug!(
            "Shell {:?} is not executable, falling back to {:?}",
            candidate,
            fallback
        );
        fallback.to_path_buf()
    }
}

/// Argument vector that starts `shell` as a login, interactive shell
///
/// A leading `-` in `argv[0]` marks a login shell for every POSIX shell,
/// unlike `--login` which only some of them accept.
pub fn login_argv(shell: &Path) -> Vec<String> {
    let name = shell
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sh".to_string());
    vec![format!("-{}", name), "-i".to_string()]
}
