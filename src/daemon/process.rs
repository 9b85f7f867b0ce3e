use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Result, ZliError};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const FORCE_KILL_CONFIRM: Duration = Duration::from_secs(1);

/// Which termination tier stopped the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillResult {
    KilledGracefully,
    KilledForcefully,
}

impl std::fmt::Display for KillResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KilledGracefully => f.write_str("killed gracefully"),
            Self::KilledForcefully => f.write_str("killed forcefully"),
        }
    }
}

/// Capability over the OS process table.
#[async_trait]
pub trait ProcessManager: Send + Sync {
    /// Liveness probe. A pid that does not exist is simply not running.
    fn is_process_running(&self, pid: u32) -> bool;

    /// Terminate `pid`, gracefully first and forcefully once the grace
    /// period runs out. Errors if the process cannot be signalled or is
    /// still alive after the forceful tier.
    async fn try_kill_process(&self, pid: u32) -> Result<KillResult>;
}

/// [`ProcessManager`] backed by the real OS process table.
pub struct OsProcessManager {
    grace_period: Duration,
}

impl OsProcessManager {
    pub fn new() -> Self {
        Self {
            grace_period: crate::clienv::kill_grace_period(),
        }
    }

    /// Set how long to wait for a graceful exit before escalating
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Poll until `pid` is gone or `timeout` elapses. Returns true if it exited.
    async fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.is_process_running(pid) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

impl Default for OsProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessManager for OsProcessManager {
    fn is_process_running(&self, pid: u32) -> bool {
        sys::is_running(pid)
    }

    async fn try_kill_process(&self, pid: u32) -> Result<KillResult> {
        info!("Stopping daemon process {} gracefully", pid);
        sys::terminate(pid).map_err(|e| ZliError::process_kill(pid, e.to_string()))?;

        if self.wait_for_exit(pid, self.grace_period).await {
            debug!("Process {} stopped gracefully", pid);
            return Ok(KillResult::KilledGracefully);
        }

        warn!(
            "Process {} did not stop within {:?}, force killing",
            pid, self.grace_period
        );
        if let Err(e) = sys::force_kill(pid) {
            // It may have exited between the last probe and the signal.
            if !self.is_process_running(pid) {
                return Ok(KillResult::KilledGracefully);
            }
            return Err(ZliError::process_kill(pid, e.to_string()));
        }

        if self.wait_for_exit(pid, FORCE_KILL_CONFIRM).await {
            Ok(KillResult::KilledForcefully)
        } else {
            Err(ZliError::process_kill(
                pid,
                "process still running after SIGKILL",
            ))
        }
    }
}

#[cfg(unix)]
mod sys {
    use std::io;

    fn signal(pid: u32, sig: libc::c_int) -> io::Result<()> {
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        if pid <= 0 {
            // 0 and negative pids address process groups.
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid pid"));
        }
        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(pid, sig) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    pub fn is_running(pid: u32) -> bool {
        match signal(pid, 0) {
            Ok(()) => true,
            // Exists but owned by someone else.
            Err(e) => e.raw_os_error() == Some(libc::EPERM),
        }
    }

    pub fn terminate(pid: u32) -> io::Result<()> {
        signal(pid, libc::SIGTERM)
    }

    pub fn force_kill(pid: u32) -> io::Result<()> {
        signal(pid, libc::SIGKILL)
    }
}

#[cfg(not(unix))]
mod sys {
    use std::io;
    use std::process::{Command, Stdio};

    pub fn is_running(pid: u32) -> bool {
        let filter = format!("PID eq {pid}");
        Command::new("tasklist")
            .args(["/FI", filter.as_str(), "/NH"])
            .stderr(Stdio::null())
            .output()
            .map(|out| String::from_utf8_lossy(&out.stdout).contains(&pid.to_string()))
            .unwrap_or(false)
    }

    fn taskkill(pid: u32, force: bool) -> io::Result<()> {
        let pid = pid.to_string();
        let mut cmd = Command::new("taskkill");
        cmd.args(["/PID", pid.as_str()]);
        if force {
            cmd.arg("/F");
        }
        let status = cmd.stdout(Stdio::null()).stderr(Stdio::null()).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("taskkill exited with {status}"),
            ))
        }
    }

    pub fn terminate(pid: u32) -> io::Result<()> {
        taskkill(pid, false)
    }

    pub fn force_kill(pid: u32) -> io::Result<()> {
        taskkill(pid, true)
    }
}
