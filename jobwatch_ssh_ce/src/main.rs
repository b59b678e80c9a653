//! SSH Compute Element CLI.
//!
//! Thin command-line front end over [`jobwatch_ssh_ce::SshBatchComputingElement`]:
//! `submit`, `kill`, `status` and `ce-status` subcommands, all backed by a
//! [`RusshBackend`] built from the same SSH credentials applied to every
//! configured host.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use jobwatch_common::config::{ConfigLoader, SshCeConfig};
use jobwatch_ssh_ce::backend::{RusshBackend, SshHostConfig};
use jobwatch_ssh_ce::host::HostDescriptor;
use jobwatch_ssh_ce::SshBatchComputingElement;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "jobwatch_ssh_ce", about = "Dispatch and manage jobs across a pool of SSH hosts")]
struct Cli {
    #[arg(long, default_value = "ssh_ce.toml")]
    config: PathBuf,

    /// SSH user applied uniformly to every configured host.
    #[arg(long, default_value = "jobwatch")]
    ssh_user: String,

    /// Private key applied uniformly to every configured host.
    #[arg(long, default_value = "~/.ssh/id_ed25519")]
    ssh_key: PathBuf,

    /// Port applied uniformly to every configured host.
    #[arg(long, default_value_t = 22)]
    ssh_port: u16,

    /// Path to the remote dispatch helper script.
    #[arg(long, default_value = "/opt/jobwatch/sshce")]
    remote_script: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit copies of an executable across the ranked host pool.
    Submit {
        executable: PathBuf,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Kill one or more previously returned job handles.
    Kill { handles: Vec<String> },
    /// Report status for one or more previously returned job handles.
    Status { handles: Vec<String> },
    /// Report aggregate compute-element occupancy.
    CeStatus,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();
    let config = SshCeConfig::load(&cli.config)?;
    config.validate()?;

    let descriptors = HostDescriptor::parse_all(&config.ssh_hosts);
    let mut hosts = HashMap::new();
    for host in &descriptors {
        hosts.insert(
            host.name.clone(),
            SshHostConfig {
                address: host.name.clone(),
                port: cli.ssh_port,
                user: cli.ssh_user.clone(),
                private_key_path: cli.ssh_key.clone(),
            },
        );
    }

    let backend = RusshBackend::new(hosts, cli.remote_script);
    let ce = SshBatchComputingElement::new(config, backend)?;
    ce.reset().await;

    match cli.command {
        Command::Submit { executable, count } => {
            let handles = ce.submit_job(&executable, None, count).await?;
            info!(requested = count, dispatched = handles.len(), "submission complete");
            for handle in handles {
                println!("{handle}");
            }
        }
        Command::Kill { handles } => match ce.kill_job(&handles).await {
            Ok(()) => info!("all jobs killed"),
            Err(e) => {
                error!(error = %e, "kill reported failures");
                return Err(Box::new(e));
            }
        },
        Command::Status { handles } => {
            let statuses = ce.get_job_status(&handles).await?;
            for (handle, status) in statuses {
                println!("{handle} {status}");
            }
        }
        Command::CeStatus => {
            let status = ce.get_ce_status().await;
            println!(
                "submitted={} running={} waiting={}",
                status.submitted_jobs, status.running_jobs, status.waiting_jobs
            );
        }
    }

    Ok(())
}
