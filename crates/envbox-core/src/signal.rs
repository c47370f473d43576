//! Best-effort signal delivery to processes that may already be gone.

pub use nix::sys::signal::Signal;

use envbox_common::error::{EnvboxError, Result};

/// What happened when a signal was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The kernel accepted the signal.
    Delivered,
    /// No such process (`ESRCH`); it already exited.
    NoSuchProcess,
    /// Not permitted (`EPERM`); the process belongs to a more privileged identity.
    NotPermitted,
}

/// Sends `signal` to `pid`.
///
/// `ESRCH` and `EPERM` are reported as outcomes rather than errors, since a
/// process that vanished or is owned by root is an expected case during
/// teardown. Pid `0` and values outside the kernel's pid range are treated
/// as already gone so a bogus pid can never address a process group.
///
/// # Errors
///
/// Returns [`EnvboxError::PermissionDenied`] for any other `kill(2)` failure.
#[cfg(target_os = "linux")]
pub fn send_signal(pid: u32, signal: Signal) -> Result<SignalOutcome> {
    use nix::errno::Errno;
    use nix::unistd::Pid;

    let Some(raw) = i32::try_from(pid).ok().filter(|p| *p > 0) else {
        return Ok(SignalOutcome::NoSuchProcess);
    };

    match nix::sys::signal::kill(Pid::from_raw(raw), signal) {
        Ok(()) => {
            tracing::debug!(pid, %signal, "signal delivered");
            Ok(SignalOutcome::Delivered)
        }
        Err(Errno::ESRCH) => Ok(SignalOutcome::NoSuchProcess),
        Err(Errno::EPERM) => Ok(SignalOutcome::NotPermitted),
        Err(e) => Err(EnvboxError::PermissionDenied {
            message: format!("kill({pid}, {signal}) failed: {e}"),
        }),
    }
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; envbox manages Linux processes only.
#[cfg(not(target_os = "linux"))]
pub fn send_signal(_pid: u32, _signal: Signal) -> Result<SignalOutcome> {
    Err(EnvboxError::Config {
        message: "Linux required for process signalling".into(),
    })
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn zero_pid_is_never_signalled() {
        assert_eq!(
            send_signal(0, Signal::SIGKILL).unwrap(),
            SignalOutcome::NoSuchProcess
        );
    }

    #[test]
    fn out_of_range_pid_is_treated_as_gone() {
        assert_eq!(
            send_signal(u32::MAX, Signal::SIGTERM).unwrap(),
            SignalOutcome::NoSuchProcess
        );
    }

    #[test]
    fn exited_child_reports_no_such_process() {
        let mut child = std::process::Command::new("/bin/true")
            .spawn()
            .expect("spawn true");
        let pid = child.id();
        let _ = child.wait().expect("reap");
        assert_eq!(
            send_signal(pid, Signal::SIGTERM).unwrap(),
            SignalOutcome::NoSuchProcess
        );
    }

    #[test]
    fn live_child_receives_signal() {
        let mut child = std::process::Command::new("/bin/sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");
        let outcome = send_signal(child.id(), Signal::SIGKILL).unwrap();
        let _ = child.wait();
        assert_eq!(outcome, SignalOutcome::Delivered);
    }
}
