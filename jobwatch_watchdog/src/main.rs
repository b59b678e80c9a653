//! Job Watchdog binary entry point.
//!
//! Spawns the payload, calibrates the watchdog against it, then drives
//! the supervision loop on a fixed tick until the payload exits or a
//! heavy check kills it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use jobwatch_common::config::{ConfigLoader, WatchdogConfig};
use jobwatch_common::process::LinuxProcessMonitor;
use jobwatch_common::platform::LinuxSystemAdapter;
use jobwatch_common::rpc::{ControlSignal, JobStateUpdateClient, ProxyRenewalClient, RpcError};
use jobwatch_watchdog::exec_thread::ChildProcessExecutionThread;
use jobwatch_watchdog::Watchdog;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "jobwatch_watchdog", about = "Supervise a payload process and report its health")]
struct Cli {
    /// Path to the payload executable.
    executable: PathBuf,

    /// Arguments passed through to the payload.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,

    /// Path to the watchdog's TOML configuration file.
    #[arg(long, default_value = "watchdog.toml")]
    config: PathBuf,

    /// Job's configured CPU time budget, in seconds. Omit to disable the
    /// CPU-limit check regardless of `checks.cpu_limit`.
    #[arg(long)]
    job_cpu_time_s: Option<f64>,

    /// Directory the stop marker and working state are written to.
    #[arg(long, default_value = ".")]
    control_dir: PathBuf,
}

/// Stands in for the out-of-scope RPC transport: logs every call and
/// never returns a control signal. A real deployment substitutes a
/// client backed by whatever wire protocol the controller speaks.
struct LoggingJobStateUpdateClient;

impl JobStateUpdateClient for LoggingJobStateUpdateClient {
    async fn send_heartbeat(
        &self,
        job_id: u64,
        heartbeat: HashMap<String, f64>,
        static_params: HashMap<String, String>,
    ) -> Result<Option<ControlSignal>, RpcError> {
        info!(job_id, ?heartbeat, static_param_count = static_params.len(), "heartbeat");
        Ok(None)
    }

    async fn set_job_parameters(
        &self,
        job_id: u64,
        pairs: Vec<(String, String)>,
    ) -> Result<(), RpcError> {
        info!(job_id, ?pairs, "set job parameters");
        Ok(())
    }
}

struct LoggingProxyRenewalClient;

impl ProxyRenewalClient for LoggingProxyRenewalClient {
    async fn renew_proxy(
        &self,
        min_life_time: Duration,
        new_life_time: Duration,
        proxy_to_connect: &Path,
    ) -> Result<(), RpcError> {
        info!(
            ?min_life_time,
            ?new_life_time,
            proxy = %proxy_to_connect.display(),
            "proxy renewal requested"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();

    let config = WatchdogConfig::load(&cli.config).unwrap_or_else(|e| {
        warn!(error = %e, path = %cli.config.display(), "using default watchdog configuration");
        WatchdogConfig::default()
    });
    if let Err(e) = config.validate() {
        error!(error = %e, "watchdog configuration is invalid");
        return Err(Box::new(e));
    }

    info!(executable = %cli.executable.display(), "starting payload");
    let exec_thread = ChildProcessExecutionThread::spawn(&cli.executable, &cli.args)?;

    let mut watchdog = Watchdog::new(
        config.clone(),
        Box::new(LinuxProcessMonitor),
        Box::new(LinuxSystemAdapter),
        LoggingJobStateUpdateClient,
        Some(LoggingProxyRenewalClient),
        exec_thread,
        cli.job_cpu_time_s,
        cli.control_dir,
    );

    watchdog.initialize()?;
    watchdog.calibrate().await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(config.polling_time_s));
    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                watchdog.execute().await?;
                if watchdog.should_stop() {
                    break;
                }
            }
            _ = &mut shutdown => {
                info!("received shutdown signal; finalizing");
                break;
            }
        }
    }

    info!(summary = ?watchdog.usage_summary(), "watchdog finished");
    Ok(())
}
