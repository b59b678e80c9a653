//! The actual remote-execution collaborator.
//!
//! [`SshHostBackend`] is the seam between the dispatch algorithm in
//! [`crate::SshBatchComputingElement`] and the mechanics of reaching a
//! given host: preparing it, asking how many jobs are running, submitting
//! a new one, killing jobs, and reading their status. [`RusshBackend`]
//! implements it over a real SSH session; [`InMemorySshBackend`] is a
//! fake used by the dispatch property tests. Mirrors the capability-trait
//! + swappable-concrete-driver pattern used for platform/process
//! dispatch elsewhere in this workspace.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jobwatch_common::handle::JobHandle;
use russh::client::{self, Handle};
use russh::ChannelMsg;
use russh_keys::key::PublicKey;

use crate::error::CeError;

/// Snapshot of a host's current occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostStatus {
    pub running: u32,
}

/// Status of a previously submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Waiting,
    Running,
    Done,
    Failed,
    Unknown,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Waiting => "Waiting",
            JobStatus::Running => "Running",
            JobStatus::Done => "Done",
            JobStatus::Failed => "Failed",
            JobStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Remote-execution collaborator for one configured host.
///
/// Every method is scoped to a single `host` argument rather than to an
/// implicit "current connection" — a backend is free to pool connections
/// internally, but the dispatch algorithm always names the host it means.
pub trait SshHostBackend: Send + Sync {
    /// One-time setup run during `_reset` (e.g. installing the remote
    /// `sshce` helper script).
    fn prepare_remote_host(&self, host: &str) -> impl Future<Output = Result<(), CeError>> + Send;

    /// Current occupancy of `host`.
    fn host_status(&self, host: &str) -> impl Future<Output = Result<HostStatus, CeError>> + Send;

    /// Submit `count` copies of `executable` to `host`; returns the
    /// handles actually created (may be fewer than `count`).
    fn submit_job_to_host(
        &self,
        executable: &Path,
        count: u32,
        host: &str,
    ) -> impl Future<Output = Result<Vec<JobHandle>, CeError>> + Send;

    /// Kill every job in `handles` on `host`.
    fn kill_job_on_host(
        &self,
        handles: &[JobHandle],
        host: &str,
    ) -> impl Future<Output = Result<(), CeError>> + Send;

    /// Status of every job in `handles` on `host`.
    fn job_status_on_host(
        &self,
        handles: &[JobHandle],
        host: &str,
    ) -> impl Future<Output = Result<HashMap<JobHandle, JobStatus>, CeError>> + Send;
}

/// Per-host SSH connection parameters.
#[derive(Debug, Clone)]
pub struct SshHostConfig {
    pub address: String,
    pub port: u16,
    pub user: String,
    pub private_key_path: PathBuf,
}

/// Accepts any server key. Host-key verification is out of scope for
/// this workspace; a production deployment should replace this with a
/// known-hosts check.
struct AcceptAllHostKeys;

impl client::Handler for AcceptAllHostKeys {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// `SshHostBackend` implementation over real SSH sessions via `russh`.
pub struct RusshBackend {
    hosts: HashMap<String, SshHostConfig>,
    remote_script: PathBuf,
}

impl RusshBackend {
    pub fn new(hosts: HashMap<String, SshHostConfig>, remote_script: PathBuf) -> Self {
        Self { hosts, remote_script }
    }

    fn host_config(&self, host: &str) -> Result<&SshHostConfig, CeError> {
        self.hosts.get(host).ok_or_else(|| CeError::Transport {
            host: host.to_string(),
            reason: "no connection parameters configured for this host".to_string(),
        })
    }

    /// Connect, authenticate, run `command`, and collect its stdout plus
    /// exit status. One connection per call — acceptable at the polling
    /// cadence this workspace's dispatcher runs at; a higher-throughput
    /// deployment would pool sessions per host.
    async fn run_remote(&self, host: &str, command: &str) -> Result<(i32, String), CeError> {
        let config = self.host_config(host)?;
        let transport_err = |reason: String| CeError::Transport { host: host.to_string(), reason };

        let client_config = Arc::new(client::Config::default());
        let mut session: Handle<AcceptAllHostKeys> = client::connect(
            client_config,
            (config.address.as_str(), config.port),
            AcceptAllHostKeys,
        )
        .await
        .map_err(|e| transport_err(format!("connect failed: {e}")))?;

        let key = russh_keys::load_secret_key(&config.private_key_path, None)
            .map_err(|e| transport_err(format!("loading private key failed: {e}")))?;

        let authenticated = session
            .authenticate_publickey(&config.user, Arc::new(key))
            .await
            .map_err(|e| transport_err(format!("authentication failed: {e}")))?;
        if !authenticated {
            return Err(transport_err("publickey authentication rejected".to_string()));
        }

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| transport_err(format!("channel open failed: {e}")))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| transport_err(format!("exec failed: {e}")))?;

        let mut output = Vec::new();
        let mut exit_status = 0i32;
        loop {
            let Some(msg) = channel.wait().await else { break };
            match msg {
                ChannelMsg::Data { ref data } => output.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = status as i32,
                ChannelMsg::Eof | ChannelMsg::Close => break,
                _ => {}
            }
        }

        Ok((exit_status, String::from_utf8_lossy(&output).into_owned()))
    }
}

impl SshHostBackend for RusshBackend {
    async fn prepare_remote_host(&self, host: &str) -> Result<(), CeError> {
        let command = format!("test -x {} || chmod +x {}", self.remote_script.display(), self.remote_script.display());
        self.run_remote(host, &command).await.map(|_| ())
    }

    async fn host_status(&self, host: &str) -> Result<HostStatus, CeError> {
        let command = format!("{} status", self.remote_script.display());
        let (_, stdout) = self.run_remote(host, &command).await?;
        let running = stdout.trim().parse().unwrap_or(0);
        Ok(HostStatus { running })
    }

    async fn submit_job_to_host(
        &self,
        executable: &Path,
        count: u32,
        host: &str,
    ) -> Result<Vec<JobHandle>, CeError> {
        let mut handles = Vec::new();
        for _ in 0..count {
            let command = format!("{} submit {}", self.remote_script.display(), executable.display());
            let (exit_status, stdout) = self.run_remote(host, &command).await?;
            if exit_status != 0 {
                continue;
            }
            let local_id = stdout.trim().to_string();
            if !local_id.is_empty() {
                handles.push(JobHandle::new(host, local_id));
            }
        }
        Ok(handles)
    }

    async fn kill_job_on_host(&self, handles: &[JobHandle], host: &str) -> Result<(), CeError> {
        let ids = handles.iter().map(|h| h.local_id.as_str()).collect::<Vec<_>>().join(" ");
        let command = format!("{} kill {}", self.remote_script.display(), ids);
        let (exit_status, stdout) = self.run_remote(host, &command).await?;
        if exit_status != 0 {
            return Err(CeError::KillFailed {
                message: stdout,
                failed: handles.iter().map(|h| h.to_string()).collect(),
            });
        }
        Ok(())
    }

    async fn job_status_on_host(
        &self,
        handles: &[JobHandle],
        host: &str,
    ) -> Result<HashMap<JobHandle, JobStatus>, CeError> {
        let ids = handles.iter().map(|h| h.local_id.as_str()).collect::<Vec<_>>().join(" ");
        let command = format!("{} status-of {}", self.remote_script.display(), ids);
        let (_, stdout) = self.run_remote(host, &command).await?;

        let mut result = HashMap::new();
        for line in stdout.lines() {
            let Some((local_id, status_str)) = line.split_once(' ') else { continue };
            let status = match status_str.trim() {
                "Waiting" => JobStatus::Waiting,
                "Running" => JobStatus::Running,
                "Done" => JobStatus::Done,
                "Failed" => JobStatus::Failed,
                _ => JobStatus::Unknown,
            };
            result.insert(JobHandle::new(host, local_id.to_string()), status);
        }
        Ok(result)
    }
}

/// In-memory fake backend, exposed unconditionally so both unit tests
/// and the crate's own `tests/` integration suite can exercise the
/// dispatch algorithm without a network. Not cfg(test)-gated: `tests/`
/// files link against the library built without `--cfg test`.
pub mod fake {
    use super::*;
    use std::sync::Mutex;

    /// In-memory fake for dispatch-algorithm tests. Each host has a
    /// fixed running count and an optional set of handles returned on
    /// submit; no network activity occurs.
    pub struct InMemorySshBackend {
        running: HashMap<String, u32>,
        next_id: Mutex<u64>,
        unreachable: Vec<String>,
    }

    impl InMemorySshBackend {
        pub fn new(running: HashMap<String, u32>) -> Self {
            Self { running, next_id: Mutex::new(1), unreachable: Vec::new() }
        }

        pub fn with_unreachable(mut self, host: impl Into<String>) -> Self {
            self.unreachable.push(host.into());
            self
        }
    }

    impl SshHostBackend for InMemorySshBackend {
        async fn prepare_remote_host(&self, _host: &str) -> Result<(), CeError> {
            Ok(())
        }

        async fn host_status(&self, host: &str) -> Result<HostStatus, CeError> {
            if self.unreachable.contains(&host.to_string()) {
                return Err(CeError::Transport {
                    host: host.to_string(),
                    reason: "simulated unreachable host".to_string(),
                });
            }
            Ok(HostStatus { running: *self.running.get(host).unwrap_or(&0) })
        }

        async fn submit_job_to_host(
            &self,
            _executable: &Path,
            count: u32,
            host: &str,
        ) -> Result<Vec<JobHandle>, CeError> {
            let mut handles = Vec::new();
            let mut id_guard = self.next_id.lock().unwrap();
            for _ in 0..count {
                handles.push(JobHandle::new(host, id_guard.to_string()));
                *id_guard += 1;
            }
            Ok(handles)
        }

        async fn kill_job_on_host(&self, _handles: &[JobHandle], _host: &str) -> Result<(), CeError> {
            Ok(())
        }

        async fn job_status_on_host(
            &self,
            handles: &[JobHandle],
            _host: &str,
        ) -> Result<HashMap<JobHandle, JobStatus>, CeError> {
            Ok(handles.iter().cloned().map(|h| (h, JobStatus::Running)).collect())
        }
    }
}
