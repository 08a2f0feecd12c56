//! Safe wrappers for platform-specific unsafe operations.
//!
//! Every `unsafe` block in the codebase lives here. Call sites use the safe
//! public API and never touch `unsafe` directly.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;

/// Outcome of a non-blocking exclusive lock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    Acquired,
    HeldElsewhere,
}

/// Try to take an exclusive advisory lock (`flock`) on `file` without blocking.
///
/// The lock belongs to the open file description, so it is released when the
/// file is closed or the process exits, however it exits.
///
/// # Safety
/// `flock` only reads the descriptor, which `file` keeps open for the call.
pub fn try_lock_exclusive(file: &File) -> io::Result<LockAttempt> {
    // SAFETY: the descriptor is owned by `file` and valid for this call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(LockAttempt::Acquired);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock {
        Ok(LockAttempt::HeldElsewhere)
    } else {
        Err(err)
    }
}

/// Return true if a process with `pid` exists.
///
/// A permission error still means the process exists.
///
/// # Safety
/// `kill` with signal 0 performs only the existence and permission check.
pub fn process_exists(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 delivers nothing; it only checks the target.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}
