//! Pseudo-terminal allocation
//!
//! A [`PseudoTerminalProvider`] creates the raw linked pair; the
//! [`TerminalAllocator`] then applies the session's terminal mode and
//! geometry. Linux builds the pair by hand from `posix_openpt`, other Unix
//! targets use the native `openpty`.

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use tether_core::error::TerminalError;
use tether_core::TerminalSize;

use super::mode::{configure_geometry, configure_mode};

/// A freshly created, not yet configured terminal pair
#[derive(Debug)]
pub struct RawPair {
    /// Controlling (master) side
    pub controlling: OwnedFd,
    /// Subordinate (slave) side
    pub subordinate: OwnedFd,
    /// Path of the subordinate device
    pub device_name: String,
}

/// Platform capability that creates a linked terminal pair
pub trait PseudoTerminalProvider {
    /// Create a new pair. Descriptors opened before a failure are closed.
    fn open_pair(&self) -> Result<RawPair, TerminalError>;
}

/// Builds the pair from `posix_openpt`, `grantpt`, `unlockpt` and `ptsname_r`.
#[cfg(any(target_os = "linux", target_os = "android"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualProvider;

#[cfg(any(target_os = "linux", target_os = "android"))]
impl PseudoTerminalProvider for ManualProvider {
    fn open_pair(&self) -> Result<RawPair, TerminalError> {
        use std::fs::OpenOptions;
        use std::os::fd::{FromRawFd, IntoRawFd};
        use std::os::unix::fs::OpenOptionsExt;

        use nix::fcntl::OFlag;
        use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt};

        let master =
            posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).map_err(TerminalError::Open)?;
        grantpt(&master).map_err(TerminalError::Grant)?;
        unlockpt(&master).map_err(TerminalError::Unlock)?;
        let device_name = ptsname_r(&master).map_err(TerminalError::Name)?;

        let subordinate = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&device_name)
            .map_err(|source| TerminalError::OpenSubordinate {
                path: device_name.clone(),
                source,
            })?;

        // SAFETY: into_raw_fd hands over sole ownership of the open master descriptor.
        let controlling = unsafe { OwnedFd::from_raw_fd(master.into_raw_fd()) };

        Ok(RawPair {
            controlling,
            subordinate: OwnedFd::from(subordinate),
            device_name,
        })
    }
}

/// Uses the platform's `openpty`.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeProvider;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
impl PseudoTerminalProvider for NativeProvider {
    fn open_pair(&self) -> Result<RawPair, TerminalError> {
        use std::ffi::CStr;
        use std::os::fd::AsRawFd;

        use nix::errno::Errno;
        use nix::pty::openpty;

        let pair = openpty(None, None).map_err(TerminalError::Open)?;

        // SAFETY: the descriptor is a valid terminal; the returned buffer is
        // copied before any other ttyname call can overwrite it.
        let device_name = unsafe {
            let name = libc::ttyname(pair.slave.as_raw_fd());
            if name.is_null() {
                return Err(TerminalError::Name(Errno::last()));
            }
            CStr::from_ptr(name).to_string_lossy().into_owned()
        };

        Ok(RawPair {
            controlling: pair.master,
            subordinate: pair.slave,
            device_name,
        })
    }
}

/// Provider selected for the build target
#[cfg(any(target_os = "linux", target_os = "android"))]
pub type PlatformProvider = ManualProvider;

/// Provider selected for the build target
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub type PlatformProvider = NativeProvider;

/// A configured pseudo-terminal
///
/// The parent owns the controlling side for the whole session. The
/// subordinate side is owned here only until [`take_subordinate`] hands it
/// to the spawner.
///
/// [`take_subordinate`]: PseudoTerminal::take_subordinate
#[derive(Debug)]
pub struct PseudoTerminal {
    controlling: OwnedFd,
    subordinate: Option<OwnedFd>,
    device_name: String,
    size: TerminalSize,
}

impl PseudoTerminal {
    /// Borrow the controlling side
    pub fn controlling_fd(&self) -> BorrowedFd<'_> {
        self.controlling.as_fd()
    }

    /// Borrow the subordinate side, if it has not been handed off yet
    pub fn subordinate_fd(&self) -> Option<BorrowedFd<'_>> {
        self.subordinate.as_ref().map(|fd| fd.as_fd())
    }

    /// Hand the subordinate side over; later calls return `None`
    pub fn take_subordinate(&mut self) -> Option<OwnedFd> {
        self.subordinate.take()
    }

    /// Path of the subordinate device, e.g. `/dev/pts/3`
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// The geometry that was applied
    pub fn size(&self) -> TerminalSize {
        self.size
    }

    /// Give up everything but the controlling side
    pub fn into_controlling(self) -> OwnedFd {
        self.controlling
    }
}

/// Allocates pseudo-terminals in the session's hybrid mode
pub struct TerminalAllocator<P = PlatformProvider> {
    provider: P,
    size: TerminalSize,
}

impl TerminalAllocator<PlatformProvider> {
    /// Allocator using the build target's provider
    pub fn new(size: TerminalSize) -> Self {
        Self::with_provider(PlatformProvider::default(), size)
    }
}

impl<P: PseudoTerminalProvider> TerminalAllocator<P> {
    /// Allocator using a specific provider
    pub fn with_provider(provider: P, size: TerminalSize) -> Self {
        Self { provider, size }
    }

    /// Create the pair and apply mode and geometry
    pub fn allocate(&self) -> Result<PseudoTerminal, TerminalError> {
        let pair = self.provider.open_pair()?;

        configure_mode(pair.subordinate.as_fd())?;
        configure_geometry(pair.subordinate.as_fd(), self.size)?;

        tracing::info!(
            "Allocated pseudo-terminal {} ({})",
            pair.device_name,
            self.size
        );

        Ok(PseudoTerminal {
            controlling: pair.controlling,
            subordinate: Some(pair.subordinate),
            device_name: pair.device_name,
            size: self.size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;

    use nix::sys::termios::{tcgetattr, ControlFlags, InputFlags, LocalFlags, OutputFlags};

    fn wait_readable(fd: BorrowedFd<'_>, timeout_ms: i32) -> bool {
        let mut pfd = libc::pollfd {
            fd: fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: pfd is a single valid pollfd for the duration of the call.
        let n = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        n > 0 && (pfd.revents & libc::POLLIN) != 0
    }

    fn read_fd(fd: BorrowedFd<'_>) -> Vec<u8> {
        let mut buf = [0u8; 256];
        // SAFETY: buf is valid for writes of buf.len() bytes.
        let n = unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        assert!(n >= 0, "read failed: {}", std::io::Error::last_os_error());
        buf[..n as usize].to_vec()
    }

    fn write_fd(fd: BorrowedFd<'_>, data: &[u8]) {
        // SAFETY: data is valid for reads of data.len() bytes.
        let n = unsafe { libc::write(fd.as_raw_fd(), data.as_ptr().cast(), data.len()) };
        assert_eq!(n, data.len() as isize);
    }

    #[test]
    fn test_allocate_applies_hybrid_mode() {
        let pty = TerminalAllocator::new(TerminalSize::default())
            .allocate()
            .unwrap();
        let termios = tcgetattr(pty.subordinate_fd().unwrap()).unwrap();

        assert!(termios.local_flags.contains(
            LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::ISIG | LocalFlags::IEXTEN
        ));
        assert!(termios.input_flags.contains(InputFlags::ICRNL));
        assert!(termios
            .output_flags
            .contains(OutputFlags::OPOST | OutputFlags::ONLCR));

        // Raw baseline stays in place for everything else.
        assert!(!termios.input_flags.contains(InputFlags::IXON));
        assert!(!termios.input_flags.contains(InputFlags::INLCR));
        assert!(!termios.input_flags.contains(InputFlags::IGNCR));
        assert!(!termios.local_flags.contains(LocalFlags::ECHONL));
        assert!(termios.control_flags.contains(ControlFlags::CS8));
    }

    #[test]
    fn test_allocate_applies_geometry() {
        let pty = TerminalAllocator::new(TerminalSize::new(24, 80))
            .allocate()
            .unwrap();

        // SAFETY: libc::winsize is a plain C struct; zeroed is a valid baseline.
        let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
        // SAFETY: ioctl writes into ws, which outlives the call.
        let result =
            unsafe { libc::ioctl(pty.controlling_fd().as_raw_fd(), libc::TIOCGWINSZ as _, &mut ws) };
        assert_eq!(result, 0);
        assert_eq!((ws.ws_row, ws.ws_col), (24, 80));
        assert_eq!((ws.ws_xpixel, ws.ws_ypixel), (0, 0));
        assert_eq!(pty.size(), TerminalSize::new(24, 80));
    }

    #[test]
    fn test_device_name_points_at_device() {
        let pty = TerminalAllocator::new(TerminalSize::default())
            .allocate()
            .unwrap();
        assert!(pty.device_name().starts_with("/dev/"));
        assert!(std::path::Path::new(pty.device_name()).exists());
    }

    #[test]
    fn test_canonical_input_waits_for_line_terminator() {
        let pty = TerminalAllocator::new(TerminalSize::default())
            .allocate()
            .unwrap();
        let subordinate = pty.subordinate_fd().unwrap();

        write_fd(pty.controlling_fd(), b"abc");
        assert!(!wait_readable(subordinate, 200));

        // CR is translated to NL on input and completes the line.
        write_fd(pty.controlling_fd(), b"\r");
        assert!(wait_readable(subordinate, 2000));
        assert_eq!(read_fd(subordinate), b"abc\n");
    }

    #[test]
    fn test_output_newline_becomes_crlf() {
        let pty = TerminalAllocator::new(TerminalSize::default())
            .allocate()
            .unwrap();

        write_fd(pty.subordinate_fd().unwrap(), b"out\n");
        assert!(wait_readable(pty.controlling_fd(), 2000));
        assert_eq!(read_fd(pty.controlling_fd()), b"out\r\n");
    }

    #[test]
    fn test_take_subordinate_once() {
        let mut pty = TerminalAllocator::new(TerminalSize::default())
            .allocate()
            .unwrap();
        assert!(pty.take_subordinate().is_some());
        assert!(pty.take_subordinate().is_none());
        assert!(pty.subordinate_fd().is_none());
    }

    struct FailingProvider;

    impl PseudoTerminalProvider for FailingProvider {
        fn open_pair(&self) -> Result<RawPair, TerminalError> {
            Err(TerminalError::Open(nix::errno::Errno::EMFILE))
        }
    }

    #[test]
    fn test_provider_failure_is_terminal_error() {
        let allocator = TerminalAllocator::with_provider(FailingProvider, TerminalSize::default());
        assert!(matches!(
            allocator.allocate(),
            Err(TerminalError::Open(nix::errno::Errno::EMFILE))
        ));
    }
}
