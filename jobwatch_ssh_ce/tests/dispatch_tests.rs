//! Integration tests for the SSH dispatch algorithm against the in-memory
//! fake backend — exercises the same path the `submit`/`kill`/`status`
//! CLI subcommands use, without a real SSH session.

use std::collections::HashMap;
use std::path::PathBuf;

use jobwatch_common::config::SshCeConfig;
use jobwatch_ssh_ce::backend::fake::InMemorySshBackend;
use jobwatch_ssh_ce::{CeError, JobStatus, SshBatchComputingElement};

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
async fn full_lifecycle_submit_status_kill() {
    let backend = InMemorySshBackend::new(HashMap::from([("worker-a".to_string(), 0)]));
    let ce = SshBatchComputingElement::new(config("worker-a/4"), backend).unwrap();
    ce.reset().await;

    let handles = ce.submit_job(&PathBuf::from("/bin/true"), None, 2).await.unwrap();
    assert_eq!(handles.len(), 2);

    let raw: Vec<String> = handles.iter().map(|h| h.to_string()).collect();
    let statuses = ce.get_job_status(&raw).await.unwrap();
    assert!(statuses.values().all(|s| *s == JobStatus::Running));

    ce.kill_job(&raw).await.expect("kill succeeds against fake backend");
}

#[tokio::test]
async fn all_hosts_full_returns_no_online_node() {
    let backend = InMemorySshBackend::new(HashMap::from([("worker-a".to_string(), 4)]));
    let ce = SshBatchComputingElement::new(config("worker-a/4"), backend).unwrap();
    let result = ce.submit_job(&PathBuf::from("/bin/true"), None, 1).await;
    assert!(matches!(result, Err(CeError::NoOnlineNode)));
}

#[tokio::test]
async fn kill_routes_each_handle_to_its_owning_host() {
    let backend = InMemorySshBackend::new(HashMap::from([
        ("worker-a".to_string(), 0),
        ("worker-b".to_string(), 0),
    ]));
    let ce = SshBatchComputingElement::new(config("worker-a/2,worker-b/2"), backend).unwrap();
    let handles = ce.submit_job(&PathBuf::from("/bin/true"), None, 4).await.unwrap();
    let raw: Vec<String> = handles.iter().map(|h| h.to_string()).collect();

    assert!(raw.iter().any(|h| h.contains("worker-a")));
    assert!(raw.iter().any(|h| h.contains("worker-b")));
    ce.kill_job(&raw).await.expect("kill spans both hosts");
}
