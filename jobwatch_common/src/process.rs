//! Process liveness and CPU-time accounting collaborator.
//!
//! The watchdog never owns the payload process directly — it asks this
//! collaborator whether the process is alive, how much CPU it has
//! consumed, and to kill it. Mirrors the liveness-check pattern used for
//! shared-memory segment orphan detection elsewhere in this workspace
//! (`kill(pid, None)` to probe without signalling).

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    #[error("process {pid} not found")]
    NotFound { pid: u32 },
    #[error("insufficient permission to inspect process {pid}")]
    PermissionDenied { pid: u32 },
    #[error("failed to read process accounting for {pid}: {reason}")]
    AccountingUnavailable { pid: u32, reason: String },
    #[error("failed to signal process {pid}: {reason}")]
    KillFailed { pid: u32, reason: String },
}

/// Process liveness and CPU-accounting collaborator.
pub trait ProcessMonitor: Send + Sync {
    /// Whether the process with the given PID is still alive.
    fn is_alive(&self, pid: u32) -> bool;

    /// Total CPU time consumed by the process, in seconds.
    fn cpu_consumed_seconds(&self, pid: u32) -> Result<f64, ProcessError>;

    /// Kill the process (and its descendants, if `kill_descendants` and
    /// the platform supports it). Best-effort: the watchdog logs the
    /// result but does not otherwise act on it.
    fn kill(&self, pid: u32, kill_descendants: bool) -> Result<(), ProcessError>;
}

/// Linux implementation backed by `/proc` and POSIX signals.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxProcessMonitor;

impl ProcessMonitor for LinuxProcessMonitor {
    fn is_alive(&self, pid: u32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), None) {
            Ok(()) => true,
            Err(nix::errno::Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn cpu_consumed_seconds(&self, pid: u32) -> Result<f64, ProcessError> {
        let stat_path = format!("/proc/{pid}/stat");
        let contents = std::fs::read_to_string(&stat_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::NotFound { pid }
            } else {
                ProcessError::AccountingUnavailable {
                    pid,
                    reason: e.to_string(),
                }
            }
        })?;

        // Fields after the `(comm)` parenthesized group are
        // space-separated; utime/stime are fields 14/15 (1-indexed) of
        // the whole record, i.e. indices 11/12 after the comm group.
        let after_comm = contents
            .rfind(')')
            .map(|idx| &contents[idx + 1..])
            .ok_or_else(|| ProcessError::AccountingUnavailable {
                pid,
                reason: "malformed /proc/pid/stat".to_string(),
            })?;
        let fields: Vec<&str> = after_comm.split_whitespace().collect();
        let utime: u64 = fields
            .get(11)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProcessError::AccountingUnavailable {
                pid,
                reason: "missing utime field".to_string(),
            })?;
        let stime: u64 = fields
            .get(12)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProcessError::AccountingUnavailable {
                pid,
                reason: "missing stime field".to_string(),
            })?;

        let clock_ticks_per_s = unsafe { libc::sysconf(libc::_SC_CLK_TCK) } as f64;
        Ok((utime + stime) as f64 / clock_ticks_per_s)
    }

    fn kill(&self, pid: u32, kill_descendants: bool) -> Result<(), ProcessError> {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let target = if kill_descendants {
            // Negative PID sends the signal to the whole process group.
            Pid::from_raw(-(pid as i32))
        } else {
            Pid::from_raw(pid as i32)
        };

        signal::kill(target, Signal::SIGTERM).map_err(|e| ProcessError::KillFailed {
            pid,
            reason: e.to_string(),
        })
    }
}
