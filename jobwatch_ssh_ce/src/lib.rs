//! Multi-Host SSH Compute Element.
//!
//! Distributes payload invocations across a configured pool of SSH hosts,
//! ranked by free capacity, and exposes kill/status operations on the
//! handles it returns. The actual remote mechanics are delegated to an
//! [`SshHostBackend`]; this module only implements the ranking, grouping
//! and bookkeeping algorithm.

pub mod backend;
pub mod error;
pub mod host;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use jobwatch_common::config::SshCeConfig;
use jobwatch_common::credential::{Credential, CredentialWrapper, ShellCredentialWrapper};
use jobwatch_common::handle::JobHandle;

pub use backend::{HostStatus, JobStatus, SshHostBackend};
pub use error::{CeError, CeResult};
use host::HostDescriptor;

/// Distributes jobs across a pool of SSH hosts.
///
/// Generic over the backend collaborator, whose methods are native
/// `async fn` and therefore not object-safe — matching the watchdog's
/// `Watchdog<X, J, R>` strategy of generics over async collaborators.
pub struct SshBatchComputingElement<B: SshHostBackend> {
    config: SshCeConfig,
    backend: B,
    hosts: Vec<HostDescriptor>,
    credential_wrapper: Box<dyn CredentialWrapper>,
    submitted_jobs: AtomicU64,
}

impl<B: SshHostBackend> SshBatchComputingElement<B> {
    pub fn new(config: SshCeConfig, backend: B) -> CeResult<Self> {
        config.validate().map_err(|e| CeError::Transport {
            host: "<config>".to_string(),
            reason: e.to_string(),
        })?;
        let hosts = HostDescriptor::parse_all(&config.ssh_hosts);
        Ok(Self {
            config,
            backend,
            hosts,
            credential_wrapper: Box::new(ShellCredentialWrapper),
            submitted_jobs: AtomicU64::new(0),
        })
    }

    /// `_reset`: run one-time preparation on every configured host.
    /// Preparation failures are logged and that host is simply left out
    /// of later ranking (`host_status` will fail for it too).
    pub async fn reset(&self) {
        for host in &self.hosts {
            if let Err(e) = self.backend.prepare_remote_host(&host.name).await {
                tracing::warn!(host = %host.name, error = %e, "failed to prepare remote host");
            }
        }
    }

    /// `submitJob`: dispatch up to `number_of_jobs` copies of `executable`
    /// across the ranked host pool. Returns the handles actually created,
    /// which may be fewer than requested.
    pub async fn submit_job(
        &self,
        executable: &Path,
        credential: Option<&Credential>,
        number_of_jobs: u32,
    ) -> CeResult<Vec<JobHandle>> {
        let mut running = HashMap::new();
        for host in &self.hosts {
            if let Ok(status) = self.backend.host_status(&host.name).await {
                running.insert(host.name.clone(), status.running);
            }
        }
        let (rank_map, max_slots) =
            host::rank_by_free_slots(&self.hosts, |name| running.get(name).copied());

        if max_slots == 0 {
            return Err(CeError::NoOnlineNode);
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(executable) {
                let mut perms = metadata.permissions();
                if perms.mode() & 0o111 == 0 {
                    perms.set_mode(perms.mode() | 0o755);
                    std::fs::set_permissions(executable, perms).ok();
                }
            }
        }

        let submit_file = match credential {
            Some(credential) => self
                .credential_wrapper
                .wrap(executable, credential)
                .map_err(|e| CeError::Transport {
                    host: "<local>".to_string(),
                    reason: format!("wrapping credential: {e}"),
                })?,
            None => executable.to_path_buf(),
        };

        let mut submitted = Vec::new();
        let mut remaining = number_of_jobs;

        'ranks: for slots in (1..=max_slots).rev() {
            let Some(hosts_at_rank) = rank_map.get(&slots) else { continue };
            for host in hosts_at_rank {
                let want = slots.min(remaining);
                match self.backend.submit_job_to_host(&submit_file, want, host).await {
                    Ok(handles) if !handles.is_empty() => {
                        remaining = remaining.saturating_sub(handles.len() as u32);
                        submitted.extend(handles);
                        if remaining == 0 {
                            break 'ranks;
                        }
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(host = %host, error = %e, "submit to host failed, trying next");
                        continue;
                    }
                }
            }
        }

        if credential.is_some() {
            std::fs::remove_file(&submit_file).ok();
        }

        self.submitted_jobs.fetch_add(submitted.len() as u64, Ordering::Relaxed);
        Ok(submitted)
    }

    /// `killJob`: group handles by host and kill each group. Unparseable
    /// handles are surfaced in the `failed` list of a `KillFailed` error
    /// rather than silently dropped (see DESIGN.md Open Question 4).
    pub async fn kill_job(&self, handles: &[String]) -> CeResult<()> {
        let mut by_host: HashMap<String, Vec<JobHandle>> = HashMap::new();
        let mut failed = Vec::new();

        for raw in handles {
            match JobHandle::parse(raw) {
                Some(handle) => by_host.entry(handle.host.clone()).or_default().push(handle),
                None => failed.push(raw.clone()),
            }
        }

        let mut last_message = String::new();
        for (host, group) in &by_host {
            if let Err(e) = self.backend.kill_job_on_host(group, host).await {
                last_message = e.to_string();
                failed.extend(group.iter().map(|h| h.to_string()));
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(CeError::KillFailed { message: last_message, failed })
        }
    }

    /// `getJobStatus`: group handles by host, merge per-host results, and
    /// default any handle missing from the merged map to `Unknown`.
    pub async fn get_job_status(&self, handles: &[String]) -> CeResult<HashMap<String, JobStatus>> {
        let mut by_host: HashMap<String, Vec<JobHandle>> = HashMap::new();
        for raw in handles {
            if let Some(handle) = JobHandle::parse(raw) {
                by_host.entry(handle.host.clone()).or_default().push(handle);
            }
        }

        let mut merged = HashMap::new();
        for (host, group) in &by_host {
            match self.backend.job_status_on_host(group, host).await {
                Ok(statuses) => {
                    for (handle, status) in statuses {
                        merged.insert(handle.to_string(), status);
                    }
                }
                Err(_) => continue,
            }
        }

        let mut result = HashMap::new();
        for raw in handles {
            let status = merged.get(raw).copied().unwrap_or(JobStatus::Unknown);
            result.insert(raw.clone(), status);
        }
        Ok(result)
    }

    /// `getCEStatus`: submitted-jobs counter plus the sum of running jobs
    /// across every host that answers its status probe. Waiting is always
    /// zero — there is no local queue.
    pub async fn get_ce_status(&self) -> CeStatus {
        let mut running_jobs = 0;
        for host in &self.hosts {
            if let Ok(status) = self.backend.host_status(&host.name).await {
                running_jobs += status.running;
            }
        }
        CeStatus {
            submitted_jobs: self.submitted_jobs.load(Ordering::Relaxed),
            running_jobs,
            waiting_jobs: 0,
        }
    }

    pub fn effective_exec_queue(&self) -> &str {
        self.config.effective_exec_queue()
    }
}

/// Aggregate compute-element status, mirroring `getCEStatus`'s return
/// shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CeStatus {
    pub submitted_jobs: u64,
    pub running_jobs: u32,
    pub waiting_jobs: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::fake::InMemorySshBackend;
    use std::path::PathBuf;

    fn config(ssh_hosts: &str) -> SshCeConfig {
        SshCeConfig {
            queue: "batch".to_string(),
            exec_queue: None,
            shared_area: "/shared".to_string(),
            batch_output: "output".to_string(),
            batch_error: "error".to_string(),
            info_area: "info".to_string(),
            executable_area: "executable".to_string(),
            work_area: "work".to_string(),
            ssh_hosts: ssh_hosts.to_string(),
            submit_options: String::new(),
            remove_output: "yes".to_string(),
        }
    }

    #[tokio::test]
    async fn submit_fails_when_no_host_has_free_slots() {
        let backend = InMemorySshBackend::new(HashMap::from([("a".to_string(), 2)]));
        let ce = SshBatchComputingElement::new(config("a/2"), backend).unwrap();
        let result = ce.submit_job(&PathBuf::from("/bin/true"), None, 1).await;
        assert!(matches!(result, Err(CeError::NoOnlineNode)));
    }

    #[tokio::test]
    async fn submit_prefers_the_host_with_more_free_slots() {
        let backend = InMemorySshBackend::new(HashMap::from([
            ("a".to_string(), 3), // a/4 -> 1 free
            ("b".to_string(), 0), // b/4 -> 4 free
        ]));
        let ce = SshBatchComputingElement::new(config("a/4,b/4"), backend).unwrap();
        let handles = ce.submit_job(&PathBuf::from("/bin/true"), None, 2).await.unwrap();
        assert_eq!(handles.len(), 2);
        assert!(handles.iter().all(|h| h.host == "b"));
    }

    #[tokio::test]
    async fn submit_spills_over_to_the_next_rank_when_first_is_exhausted() {
        let backend = InMemorySshBackend::new(HashMap::from([
            ("a".to_string(), 0), // 1 free
            ("b".to_string(), 2), // 2 free
        ]));
        let ce = SshBatchComputingElement::new(config("a/1,b/4"), backend).unwrap();
        let handles = ce.submit_job(&PathBuf::from("/bin/true"), None, 3).await.unwrap();
        assert_eq!(handles.len(), 3);
        assert_eq!(handles.iter().filter(|h| h.host == "b").count(), 2);
        assert_eq!(handles.iter().filter(|h| h.host == "a").count(), 1);
    }

    #[tokio::test]
    async fn submit_skips_unreachable_hosts() {
        let backend = InMemorySshBackend::new(HashMap::from([("a".to_string(), 0), ("b".to_string(), 0)]))
            .with_unreachable("a");
        let ce = SshBatchComputingElement::new(config("a/4,b/4"), backend).unwrap();
        let handles = ce.submit_job(&PathBuf::from("/bin/true"), None, 1).await.unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].host, "b");
    }

    #[tokio::test]
    async fn get_job_status_defaults_unparseable_handles_to_unknown() {
        let backend = InMemorySshBackend::new(HashMap::from([("a".to_string(), 0)]));
        let ce = SshBatchComputingElement::new(config("a/4"), backend).unwrap();
        let statuses = ce.get_job_status(&["not-a-handle".to_string()]).await.unwrap();
        assert_eq!(statuses.get("not-a-handle"), Some(&JobStatus::Unknown));
    }

    #[tokio::test]
    async fn get_job_status_merges_per_host_results() {
        let backend = InMemorySshBackend::new(HashMap::from([("a".to_string(), 0), ("b".to_string(), 0)]));
        let ce = SshBatchComputingElement::new(config("a/4,b/4"), backend).unwrap();
        let submitted = ce.submit_job(&PathBuf::from("/bin/true"), None, 2).await.unwrap();
        let raw: Vec<String> = submitted.iter().map(|h| h.to_string()).collect();
        let statuses = ce.get_job_status(&raw).await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.values().all(|s| *s == JobStatus::Running));
    }

    #[tokio::test]
    async fn kill_job_surfaces_unparseable_handles_as_failed() {
        let backend = InMemorySshBackend::new(HashMap::from([("a".to_string(), 0)]));
        let ce = SshBatchComputingElement::new(config("a/4"), backend).unwrap();
        let result = ce.kill_job(&["garbage".to_string()]).await;
        match result {
            Err(CeError::KillFailed { failed, .. }) => assert_eq!(failed, vec!["garbage".to_string()]),
            other => panic!("expected KillFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ce_status_sums_running_jobs_across_hosts() {
        let backend = InMemorySshBackend::new(HashMap::from([("a".to_string(), 1), ("b".to_string(), 2)]));
        let ce = SshBatchComputingElement::new(config("a/4,b/4"), backend).unwrap();
        let status = ce.get_ce_status().await;
        assert_eq!(status.running_jobs, 3);
        assert_eq!(status.waiting_jobs, 0);
    }

    proptest::proptest! {
        #[test]
        fn submitted_jobs_never_exceed_requested(
            free_a in 0u32..5, free_b in 0u32..5, requested in 0u32..10
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let backend = InMemorySshBackend::new(HashMap::from([
                    ("a".to_string(), 5u32.saturating_sub(free_a)),
                    ("b".to_string(), 5u32.saturating_sub(free_b)),
                ]));
                let ce = SshBatchComputingElement::new(config("a/5,b/5"), backend).unwrap();
                let handles = ce.submit_job(&PathBuf::from("/bin/true"), None, requested).await;
                if let Ok(handles) = handles {
                    prop_assert!(handles.len() as u32 <= requested);
                }
                Ok(())
            })?;
        }
    }
}
