//! Shell process creation on a pseudo-terminal
//!
//! [`ProcessSpawner::spawn`] performs the fork once and hides the two
//! resulting continuations: the caller only ever sees a [`ChildHandle`],
//! while the created process runs [`exec_child`], which never returns.

use std::ffi::CString;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use tether_core::config::SessionConfig;
use tether_core::error::SpawnError;
use tether_core::shell::{login_argv, resolve_shell};
use tether_core::ChildEnvironment;

use super::PseudoTerminal;

/// Exit status of the child when its program cannot be started
pub const EXEC_FAILED_STATUS: i32 = 127;

/// Exit status of the child when terminal setup fails before exec
const SETUP_FAILED_STATUS: i32 = 1;

/// Interval between non-blocking reap attempts
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What to run in the child and which inherited descriptors it must drop
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Program to execute
    pub program: PathBuf,
    /// Full argument vector including `argv[0]`
    pub argv: Vec<String>,
    /// Complete environment of the child
    pub env: ChildEnvironment,
    /// Parent descriptors the child closes before anything else
    pub close_in_child: Vec<RawFd>,
}

impl SpawnRequest {
    /// Request an arbitrary program
    pub fn new(program: impl Into<PathBuf>, argv: Vec<String>, env: ChildEnvironment) -> Self {
        Self {
            program: program.into(),
            argv,
            env,
            close_in_child: Vec::new(),
        }
    }

    /// Request the configured shell as a login, interactive shell
    pub fn login_shell(config: &SessionConfig) -> Self {
        let env = config.environment().build();
        let shell = resolve_shell(
            config.shell.as_deref(),
            &config.default_shell,
            &config.fallback_shell,
        );
        let argv = login_argv(&shell);
        Self::new(shell, argv, env)
    }

    /// Close `fd` in the child before it execs
    pub fn close_in_child(mut self, fd: RawFd) -> Self {
        self.close_in_child.push(fd);
        self
    }
}

/// How a child ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Exited with a status code
    Code(i32),
    /// Killed by a signal
    Signal(Signal),
    /// Reaped by the kernel before it could be observed
    Unknown,
}

/// Lifecycle state of a child process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    /// Still running
    Running,
    /// Terminated
    Exited(ExitReason),
}

/// Handle to a spawned shell held by the parent
#[derive(Debug)]
pub struct ChildHandle {
    pid: Pid,
    state: ChildState,
}

impl ChildHandle {
    fn new(pid: Pid) -> Self {
        Self {
            pid,
            state: ChildState::Running,
        }
    }

    /// Process identifier of the child
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Last observed state
    pub fn state(&self) -> ChildState {
        self.state
    }

    /// Whether the child has not been observed to exit
    pub fn is_running(&self) -> bool {
        self.state == ChildState::Running
    }

    /// Ask the child to terminate (`SIGTERM`)
    pub fn request_termination(&self) -> nix::Result<()> {
        self.signal(Signal::SIGTERM)
    }

    /// Kill the child (`SIGKILL`)
    pub fn kill(&self) -> nix::Result<()> {
        self.signal(Signal::SIGKILL)
    }

    fn signal(&self, signal: Signal) -> nix::Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        match kill(self.pid, signal) {
            Err(Errno::ESRCH) => Ok(()),
            other => other,
        }
    }

    /// Observe the child's state without blocking, reaping it if it exited
    pub fn try_reap(&mut self) -> ChildState {
        if !self.is_running() {
            return self.state;
        }

        self.state = match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => ChildState::Exited(ExitReason::Code(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                ChildState::Exited(ExitReason::Signal(signal))
            }
            Ok(_) => ChildState::Running,
            Err(Errno::EINTR) => ChildState::Running,
            // With SIGCHLD ignored the kernel reaps the child itself.
            Err(Errno::ECHILD) => ChildState::Exited(ExitReason::Unknown),
            Err(e) => {
                tracing::warn!("waitpid({}) failed: {}", self.pid, e);
                ChildState::Exited(ExitReason::Unknown)
            }
        };
        self.state
    }

    /// Poll for exit until `grace` elapses. Returns true once the child is gone.
    pub fn reap_within(&mut self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            if !self.try_reap_running() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(REAP_POLL_INTERVAL);
        }
    }

    fn try_reap_running(&mut self) -> bool {
        self.try_reap() == ChildState::Running
    }
}

/// Creates the shell process bound to a pseudo-terminal's subordinate side
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    request: SpawnRequest,
}

impl ProcessSpawner {
    /// Spawner for `request`
    pub fn new(request: SpawnRequest) -> Self {
        Self { request }
    }

    /// Fork the child and hand it the subordinate side of `terminal`.
    ///
    /// On return the parent holds only the controlling side of `terminal`.
    pub fn spawn(&self, terminal: &mut PseudoTerminal) -> Result<ChildHandle, SpawnError> {
        // Everything the child needs is allocated here, before the fork, so
        // the child only makes async-signal-safe calls.
        let program = CString::new(self.request.program.as_os_str().as_bytes())
            .map_err(|_| SpawnError::InvalidArgument("program path".to_string()))?;
        let argv = self
            .request
            .argv
            .iter()
            .map(|arg| {
                CString::new(arg.as_str())
                    .map_err(|_| SpawnError::InvalidArgument(format!("argument {:?}", arg)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let envp = self.request.env.to_c_strings()?;

        let argv_ptrs = null_terminated(&argv);
        let envp_ptrs = null_terminated(&envp);

        let mut close_fds = self.request.close_in_child.clone();
        close_fds.push(terminal.controlling_fd().as_raw_fd());

        let subordinate = terminal
            .take_subordinate()
            .ok_or(SpawnError::SubordinateTaken)?;

        // SAFETY: the child branch only calls async-signal-safe functions on
        // data prepared above and always ends in execve or _exit.
        match unsafe { fork() }.map_err(SpawnError::Fork)? {
            ForkResult::Child => unsafe {
                exec_child(
                    subordinate.as_raw_fd(),
                    &close_fds,
                    &program,
                    &argv_ptrs,
                    &envp_ptrs,
                )
            },
            ForkResult::Parent { child } => {
                drop(subordinate);
                tracing::info!(
                    "Spawned {} with PID {} on {}",
                    self.request.program.display(),
                    child,
                    terminal.device_name()
                );
                Ok(ChildHandle::new(child))
            }
        }
    }
}

fn null_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

/// Child continuation after fork: attach the terminal and exec the program.
///
/// # Safety
///
/// Must only be called in the child process right after `fork()`. Never
/// returns: it either replaces the process image or calls `_exit`.
unsafe fn exec_child(
    subordinate: RawFd,
    close_fds: &[RawFd],
    program: &CString,
    argv: &[*const libc::c_char],
    envp: &[*const libc::c_char],
) -> ! {
    for &fd in close_fds {
        libc::close(fd);
    }

    if libc::setsid() == -1 {
        libc::_exit(SETUP_FAILED_STATUS);
    }
    if libc::ioctl(subordinate, libc::TIOCSCTTY as _, 0) == -1 {
        libc::_exit(SETUP_FAILED_STATUS);
    }

    if libc::dup2(subordinate, libc::STDIN_FILENO) < 0
        || libc::dup2(subordinate, libc::STDOUT_FILENO) < 0
        || libc::dup2(subordinate, libc::STDERR_FILENO) < 0
    {
        libc::_exit(SETUP_FAILED_STATUS);
    }
    if subordinate > libc::STDERR_FILENO {
        libc::close(subordinate);
    }

    // Ignored dispositions survive exec; the shell gets the defaults back.
    libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    libc::signal(libc::SIGCHLD, libc::SIG_DFL);

    libc::execve(program.as_ptr(), argv.as_ptr(), envp.as_ptr());
    libc::_exit(EXEC_FAILED_STATUS);
}
