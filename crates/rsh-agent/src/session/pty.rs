//! PTY allocation, spawning, and terminal resize.
//!
//! Uses the `nix` crate for POSIX PTY APIs. The PTY master fd is kept alive
//! for the session lifetime so I/O and resize operations can be performed on
//! it; reads and writes go through dup'd descriptors wrapped into tokio
//! files.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::process::Stdio;

use nix::pty::{openpty, OpenptyResult, Winsize};
use tokio::process::{Child, Command};

/// An allocated PTY pair (master + slave).
pub struct PtyPair {
    pub master: OwnedFd,
    pub slave: OwnedFd,
}

/// Initial terminal size before the first resize arrives.
pub fn default_winsize() -> Winsize {
    Winsize {
        ws_row: 24,
        ws_col: 80,
        ws_xpixel: 0,
        ws_ypixel: 0,
    }
}

/// Allocate a PTY pair.
pub fn allocate(winsize: &Winsize) -> Result<PtyPair, nix::Error> {
    let OpenptyResult { master, slave } = openpty(winsize, None)?;
    Ok(PtyPair { master, slave })
}

/// Spawn a command on the slave side of the PTY.
///
/// The child becomes a session leader with the PTY slave as its controlling
/// terminal; stdin/stdout/stderr are all connected to the slave fd and
/// `TERM` is set for the session.
pub fn spawn_on_slave(pty: &PtyPair, command: &str, args: &[String]) -> std::io::Result<Child> {
    let slave_fd = pty.slave.as_raw_fd();
    let mut cmd = Command::new(command);
    cmd.args(args)
        .env("TERM", "xterm-256color")
        .kill_on_drop(true);

    // The child's stdio is handled by pre_exec (dup2 to PTY slave), so tell
    // tokio not to set up pipes.
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // SAFETY: All syscalls used here are async-signal-safe per POSIX.
    unsafe {
        cmd.pre_exec(move || {
            // Create a new session so the child is the session leader
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            // Set the PTY slave as the controlling terminal
            if libc::ioctl(slave_fd, libc::TIOCSCTTY, 0) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            // Redirect stdin/stdout/stderr to the PTY slave
            libc::dup2(slave_fd, 0);
            libc::dup2(slave_fd, 1);
            libc::dup2(slave_fd, 2);
            if slave_fd > 2 {
                libc::close(slave_fd);
            }
            Ok(())
        });
    }

    cmd.spawn()
}

/// Split the PTY master into independent async read and write handles.
///
/// The master fd is dup'd twice so the original stays available for resize
/// ioctls while the read and write sides live in separate tasks.
pub fn split_master(master: &OwnedFd) -> std::io::Result<(tokio::fs::File, tokio::fs::File)> {
    let raw = master.as_raw_fd();

    let read_fd: RawFd = unsafe { libc::dup(raw) };
    if read_fd < 0 {
        return Err(std::io::Error::last_os_error());
    }
    let write_fd: RawFd = unsafe { libc::dup(raw) };
    if write_fd < 0 {
        let err = std::io::Error::last_os_error();
        unsafe {
            libc::close(read_fd);
        }
        return Err(err);
    }

    // SAFETY: we own these file descriptors via dup
    let read = tokio::fs::File::from_std(unsafe { std::fs::File::from_raw_fd(read_fd) });
    let write = tokio::fs::File::from_std(unsafe { std::fs::File::from_raw_fd(write_fd) });
    Ok((read, write))
}

/// Resize the PTY's terminal window, pixel sizes included.
pub fn resize(master: &OwnedFd, winsize: &Winsize) -> std::io::Result<()> {
    // SAFETY: TIOCSWINSZ is a well-defined ioctl that reads a Winsize struct.
    let ret = unsafe {
        libc::ioctl(
            master.as_raw_fd(),
            libc::TIOCSWINSZ,
            std::ptr::addr_of!(*winsize),
        )
    };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}
