//! Background mode
//!
//! The process forks once after startup has succeeded. The child starts a
//! new session and serves the mount; the parent polls for the ready marker
//! inside the mount and exits once it appears, or as soon as the child dies.

use crate::error::{Error, Result};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, setsid, ForkResult, Pid};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Interval between checks for the ready marker
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Which side of the fork we are on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Original process, holding the child's pid
    Parent(Pid),
    /// Detached process that serves the mount
    Child,
}

/// How waiting for the mount ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The marker is visible
    Ready,
    /// The child exited first, with this status
    ChildExited(i32),
}

/// Fork into the background
///
/// Must be called before any threads are spawned.
pub fn daemonize() -> Result<Role> {
    // SAFETY: the process is still single-threaded at this point
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            debug!("Forked child {}", child);
            Ok(Role::Parent(child))
        }
        Ok(ForkResult::Child) => {
            setsid().map_err(|e| Error::Daemon(format!("setsid failed: {}", e)))?;
            Ok(Role::Child)
        }
        Err(e) => Err(Error::Daemon(format!("fork failed: {}", e))),
    }
}

/// Exit status of `child` if it has terminated, without blocking
///
/// A child killed by a signal reports `128 + signal`, as a shell would.
pub fn child_status(child: Pid) -> Result<Option<i32>> {
    match waitpid(child, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::Exited(_, code)) => Ok(Some(code)),
        Ok(WaitStatus::Signaled(_, signal, _)) => Ok(Some(128 + signal as i32)),
        Ok(_) => Ok(None),
        Err(e) => Err(Error::Daemon(format!("waitpid failed: {}", e))),
    }
}

/// Poll until `marker` exists or `child_exited` reports a status
pub fn wait_until_ready<F>(marker: &Path, interval: Duration, mut child_exited: F) -> Result<Readiness>
where
    F: FnMut() -> Result<Option<i32>>,
{
    loop {
        if marker.exists() {
            return Ok(Readiness::Ready);
        }
        if let Some(code) = child_exited()? {
            return Ok(Readiness::ChildExited(code));
        }

        info!("Waiting for mountpoint to be created...");
        std::thread::sleep(interval);
    }
}
