//! Terminal mode and geometry applied to a fresh pseudo-terminal

use std::os::fd::{AsRawFd, BorrowedFd};

use nix::errno::Errno;
use nix::pty::Winsize;
use nix::sys::termios::{
    cfmakeraw, tcgetattr, tcsetattr, InputFlags, LocalFlags, OutputFlags, SetArg, Termios,
};

use tether_core::error::TerminalError;
use tether_core::TerminalSize;

/// Turn `termios` into the session's hybrid mode.
///
/// Raw baseline, then line editing, echo, job-control signals and
/// extended input processing come back on, together with CR to NL input
/// translation and NL to CRNL output translation. The remote end then gets
/// the shell's own Ctrl-C / Ctrl-D handling without a local terminal.
pub fn apply_hybrid_mode(termios: &mut Termios) {
    cfmakeraw(termios);
    termios.local_flags |=
        LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::ISIG | LocalFlags::IEXTEN;
    termios.input_flags |= InputFlags::ICRNL;
    termios.output_flags |= OutputFlags::OPOST | OutputFlags::ONLCR;
}

/// Window size for `size` with unset pixel dimensions
pub fn winsize(size: TerminalSize) -> Winsize {
    Winsize {
        ws_row: size.rows,
        ws_col: size.cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    }
}

/// Read the current mode of `fd`, switch it to hybrid mode and write it back.
pub fn configure_mode(fd: BorrowedFd<'_>) -> Result<(), TerminalError> {
    let mut termios = tcgetattr(fd).map_err(TerminalError::Mode)?;
    apply_hybrid_mode(&mut termios);
    tcsetattr(fd, SetArg::TCSAFLUSH, &termios).map_err(TerminalError::Mode)
}

/// Apply the window size to the terminal behind `fd`.
pub fn configure_geometry(fd: BorrowedFd<'_>, size: TerminalSize) -> Result<(), TerminalError> {
    let ws = winsize(size);
    // SAFETY: fd is a valid open terminal descriptor and ws outlives the call.
    let result = unsafe { libc::ioctl(fd.as_raw_fd(), libc::TIOCSWINSZ as _, &ws) };
    if result != 0 {
        return Err(TerminalError::Geometry(Errno::last()));
    }
    Ok(())
}
