use nix::{
    errno::Errno,
    sys::signal::{Signal, kill, killpg},
    unistd::Pid,
};

use crate::error::ExecError;

/// Zero-cost existence check for `pid`.
///
/// A process we may not signal (`EPERM`) still exists and counts as alive.
/// Non-positive pids never count: `kill(0, ..)` and `kill(-1, ..)` address
/// process groups, not a single process.
pub fn probe_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Deliver `signal` to `pid`. A process that is already gone is not an error.
pub fn send_signal(pid: i32, signal: Signal) -> Result<(), ExecError> {
    if pid <= 0 {
        return Err(ExecError::Signal {
            pid,
            source: Errno::ESRCH,
        });
    }
    match kill(Pid::from_raw(pid), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(source) => Err(ExecError::Signal { pid, source }),
    }
}

/// Deliver `signal` to the process group led by `pid`, or to `pid` alone
/// when it does not lead a group.
///
/// Task processes are session leaders, so this also reaches helpers they
/// started on the same terminal.
pub fn signal_session(pid: i32, signal: Signal) -> Result<(), ExecError> {
    if pid <= 0 {
        return send_signal(pid, signal);
    }
    match killpg(Pid::from_raw(pid), signal) {
        Ok(()) => Ok(()),
        Err(_) => send_signal(pid, signal),
    }
}
