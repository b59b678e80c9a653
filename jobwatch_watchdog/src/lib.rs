//! Job Watchdog — periodic supervision of a payload process.
//!
//! A [`Watchdog`] is instantiated once per payload, calibrated to capture
//! t=0 values, then ticked by a driver loop (the `jobwatch_watchdog`
//! binary runs this on a `tokio::time::interval`). Each tick either
//! returns immediately (cheap tick) or runs the full heavy-check
//! algorithm, which samples resource counters, evaluates the ordered
//! health predicates in [`checks`], and either sends a heartbeat or kills
//! the payload and finalizes the run.

pub mod checks;
pub mod error;
pub mod exec_thread;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use jobwatch_common::config::WatchdogConfig;
use jobwatch_common::consts::STOP_MARKER_FILENAME;
use jobwatch_common::platform::SystemAdapter;
use jobwatch_common::process::ProcessMonitor;
use jobwatch_common::rpc::{ControlSignal, JobStateUpdateClient, ProxyRenewalClient};
use jobwatch_common::time::format_cpu_hms;

pub use error::{WatchdogError, WatchdogResult};
use checks::CheckVerdict;
use exec_thread::ExecutionThread;

/// Append-only parameter series sampled once per heavy check.
#[derive(Debug, Default, Clone)]
pub struct ParameterSeries {
    pub load_average: Vec<f64>,
    pub memory_used_kb: Vec<f64>,
    pub disk_space_mb: Vec<f64>,
    pub cpu_consumed_hms: Vec<String>,
    pub cpu_consumed_seconds: Vec<f64>,
    pub wall_clock_time_s: Vec<f64>,
}

/// Scalars captured once at `calibrate()`.
#[derive(Debug, Default, Clone)]
pub struct InitialValues {
    pub cpu_seconds: f64,
    pub load_average: f64,
    pub memory_used_kb: f64,
    pub disk_space_mb: f64,
}

/// The supervisor itself.
///
/// Generic over the three collaborators whose methods are `async fn`
/// (and therefore not object-safe on this edition): the execution
/// thread, the job-state-update RPC client, and the proxy-renewal
/// client. The process monitor and system adapter are ordinary sync
/// traits and are held as trait objects, mirroring the capability-trait
/// pattern used for platform dispatch elsewhere in this workspace.
pub struct Watchdog<X, J, R>
where
    X: ExecutionThread,
    J: JobStateUpdateClient,
    R: ProxyRenewalClient,
{
    config: WatchdogConfig,
    effective_checking_time_s: u64,
    process_monitor: Box<dyn ProcessMonitor>,
    system_adapter: Box<dyn SystemAdapter>,
    job_state_client: J,
    proxy_client: Option<R>,
    exec_thread: X,
    wrapper_pid: u32,
    job_cpu_time_s: Option<f64>,
    job_id: Option<u64>,
    control_dir: PathBuf,
    check_count: u64,
    loop_count: u64,
    max_loops: Option<u64>,
    null_cpu_count: u32,
    peek_fail_count: u32,
    job_peek_flag: bool,
    pilot_proxy_location: Option<PathBuf>,
    pilot_is_generic: bool,
    series: ParameterSeries,
    initial: InitialValues,
    start_time: Instant,
    fatal_reason: Option<String>,
}

impl<X, J, R> Watchdog<X, J, R>
where
    X: ExecutionThread,
    J: JobStateUpdateClient,
    R: ProxyRenewalClient,
{
    pub fn new(
        config: WatchdogConfig,
        process_monitor: Box<dyn ProcessMonitor>,
        system_adapter: Box<dyn SystemAdapter>,
        job_state_client: J,
        proxy_client: Option<R>,
        exec_thread: X,
        job_cpu_time_s: Option<f64>,
        control_dir: PathBuf,
    ) -> Self {
        let wrapper_pid = exec_thread.pid();
        let job_id = std::env::var("JOBID").ok().and_then(|v| v.parse().ok());
        let effective_checking_time_s = config.checking_time_s.max(config.min_checking_time_s);

        Self {
            config,
            effective_checking_time_s,
            process_monitor,
            system_adapter,
            job_state_client,
            proxy_client,
            exec_thread,
            wrapper_pid,
            job_cpu_time_s,
            job_id,
            control_dir,
            check_count: 0,
            loop_count: 0,
            max_loops: None,
            null_cpu_count: 0,
            peek_fail_count: 0,
            job_peek_flag: true,
            pilot_proxy_location: None,
            pilot_is_generic: false,
            series: ParameterSeries::default(),
            initial: InitialValues::default(),
            start_time: Instant::now(),
            fatal_reason: None,
        }
    }

    /// Cap the number of ticks `execute()` will run for. Used by tests
    /// and by the binary's `--max-loops` flag; `None` runs until the
    /// payload exits.
    pub fn with_max_loops(mut self, max_loops: Option<u64>) -> Self {
        self.max_loops = max_loops;
        self
    }

    pub fn series(&self) -> &ParameterSeries {
        &self.series
    }

    pub fn check_count(&self) -> u64 {
        self.check_count
    }

    pub fn effective_checking_time_s(&self) -> u64 {
        self.effective_checking_time_s
    }

    /// `setPilotProxyLocation`: record path and generic-pilot metadata.
    /// Non-fatal on failure — logged and ignored.
    pub fn set_pilot_proxy_location(&mut self, path: PathBuf, is_generic_pilot: bool) {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "pilot proxy location does not exist; ignoring");
            return;
        }
        self.pilot_proxy_location = Some(path);
        self.pilot_is_generic = is_generic_pilot;
    }

    /// `initialize(maxLoops)`: clear any prior stop marker and reset
    /// per-run counters. The `checkingTime >= minCheckingTime` clamp was
    /// already folded into `effective_checking_time_s` at construction.
    pub fn initialize(&mut self) -> WatchdogResult<()> {
        std::fs::create_dir_all(&self.control_dir)
            .map_err(|e| WatchdogError::Other(format!("creating control dir: {e}")))?;
        let marker = self.control_dir.join(STOP_MARKER_FILENAME);
        if marker.exists() {
            std::fs::remove_file(&marker)
                .map_err(|e| WatchdogError::Other(format!("removing stale stop marker: {e}")))?;
        }
        self.check_count = 0;
        self.null_cpu_count = 0;
        self.peek_fail_count = 0;
        self.job_peek_flag = true;
        Ok(())
    }

    /// `calibrate`: acquire t=0 values in the mandated order. Any
    /// measurement failure is fatal to calibration.
    pub async fn calibrate(&mut self) -> WatchdogResult<()> {
        self.series = ParameterSeries::default();
        self.start_time = Instant::now();

        let cpu = self
            .process_monitor
            .cpu_consumed_seconds(self.wrapper_pid)
            .map_err(|e| WatchdogError::CalibrationFailed(format!("CPU: {e}")))?;
        let load = self
            .system_adapter
            .load_average()
            .map_err(|e| WatchdogError::CalibrationFailed(format!("load average: {e}")))?;
        let memory = self
            .system_adapter
            .memory_used_kb()
            .map_err(|e| WatchdogError::CalibrationFailed(format!("memory used: {e}")))?;
        let disk = self
            .system_adapter
            .disk_space_free_mb(&self.control_dir)
            .map_err(|e| WatchdogError::CalibrationFailed(format!("disk space: {e}")))?;
        let mut node_info = self
            .system_adapter
            .node_information()
            .map_err(|e| WatchdogError::CalibrationFailed(format!("node information: {e}")))?;

        if let Some(local_job_id) = detect_local_batch_job_id() {
            node_info.insert("LocalJobID".to_string(), local_job_id);
        }

        self.initial = InitialValues {
            cpu_seconds: cpu,
            load_average: load,
            memory_used_kb: memory,
            disk_space_mb: disk,
        };

        if let Some(job_id) = self.job_id {
            let mut pairs: Vec<(String, String)> = node_info.into_iter().collect();
            pairs.push(("InitialCPU".to_string(), format!("{cpu:.2}")));
            pairs.push(("InitialLoadAverage".to_string(), format!("{load:.2}")));
            pairs.push(("InitialMemoryUsed".to_string(), format!("{memory:.2}")));
            pairs.push(("InitialDiskSpace".to_string(), format!("{disk:.2}")));
            if let Err(e) = self.job_state_client.set_job_parameters(job_id, pairs).await {
                tracing::warn!(error = %e, "reporting initial values failed (non-fatal)");
            }
        }

        Ok(())
    }

    /// One supervision tick.
    pub async fn execute(&mut self) -> WatchdogResult<()> {
        self.loop_count += 1;
        if !self.exec_thread.is_alive() {
            return self.finalize().await;
        }

        let elapsed = self.start_time.elapsed().as_secs_f64();
        let threshold = self.effective_checking_time_s as f64 * self.check_count as f64;
        if elapsed >= threshold {
            self.perform_checks().await?;
        }
        Ok(())
    }

    /// Whether the driver loop should stop (payload dead, or max-loops reached).
    pub fn should_stop(&mut self) -> bool {
        if let Some(max) = self.max_loops {
            if self.loop_count >= max {
                return true;
            }
        }
        !self.exec_thread.is_alive()
    }

    async fn perform_checks(&mut self) -> WatchdogResult<()> {
        let load = self.system_adapter.load_average().ok();
        let memory = self.system_adapter.memory_used_kb().ok();
        let disk = self.system_adapter.disk_space_free_mb(&self.control_dir).ok();
        let cpu_seconds = self.process_monitor.cpu_consumed_seconds(self.wrapper_pid).ok();
        let wall_clock = self.start_time.elapsed().as_secs_f64();

        if let Some(v) = load {
            self.series.load_average.push(v);
        }
        if let Some(v) = memory {
            self.series.memory_used_kb.push(v);
        }
        if let Some(v) = disk {
            self.series.disk_space_mb.push(v);
        }
        if let Some(v) = cpu_seconds {
            self.series.cpu_consumed_seconds.push(v);
            self.series.cpu_consumed_hms.push(format_cpu_hms(v));
        }
        self.series.wall_clock_time_s.push(wall_clock);
        self.check_count += 1;

        if self.pilot_is_generic {
            if let (Some(path), Some(proxy_client)) =
                (self.pilot_proxy_location.clone(), self.proxy_client.as_ref())
            {
                // Renew once remaining lifetime drops below one hour, topping
                // up to a full day.
                const MIN_PROXY_LIFE_S: u64 = 3_600;
                const RENEWED_PROXY_LIFE_S: u64 = 86_400;
                let min_life = Duration::from_secs(MIN_PROXY_LIFE_S);
                let new_life = Duration::from_secs(RENEWED_PROXY_LIFE_S);
                if let Err(e) = proxy_client.renew_proxy(min_life, new_life, &path).await {
                    tracing::warn!(error = %e, "proxy renewal failed (non-fatal)");
                }
            }
        }

        let verdict = self.check_progress();
        if let CheckVerdict::Fatal(detail) = verdict {
            let fatal = WatchdogError::PredicateFatal { check: "checkProgress".to_string(), detail: detail.clone() };
            tracing::warn!(reason = %fatal, "heavy check failed; killing payload");
            if let Some(output) = self.peek() {
                tracing::info!(output = %output, "last observed standard output before kill");
            }
            self.fatal_reason = Some(detail);
            self.kill();
            return self.finalize().await;
        }

        let mut heartbeat = HashMap::new();
        if let Some(v) = load {
            heartbeat.insert("LoadAverage".to_string(), v);
        }
        if let Some(v) = memory {
            heartbeat.insert("MemoryUsed".to_string(), v);
        }
        if let Some(v) = disk {
            heartbeat.insert("AvailableDiskSpace".to_string(), v);
        }
        if let Some(v) = cpu_seconds {
            heartbeat.insert("CPUConsumed".to_string(), v);
        }
        heartbeat.insert("WallClockTime".to_string(), wall_clock);

        let mut static_params = HashMap::new();
        if let Some(output) = self.peek() {
            static_params.insert("StandardOutput".to_string(), output);
        }

        if let Some(job_id) = self.job_id {
            let timeout = Duration::from_secs(jobwatch_common::consts::RPC_TIMEOUT_S);
            match tokio::time::timeout(
                timeout,
                self.job_state_client.send_heartbeat(job_id, heartbeat, static_params),
            )
            .await
            {
                Ok(Ok(Some(ControlSignal::Kill))) => {
                    self.kill();
                    return self.finalize().await;
                }
                Ok(Ok(Some(ControlSignal::Other(_)))) => {
                    tracing::debug!("heartbeat returned a non-Kill control signal; ignored");
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "heartbeat RPC failed (non-fatal)"),
                Err(_) => tracing::warn!("heartbeat RPC timed out (non-fatal)"),
            }
        }

        Ok(())
    }

    /// `checkProgress`: run enabled checks in order, stop at first fatal.
    fn check_progress(&mut self) -> CheckVerdict {
        if self.config.checks.wall_clock {
            let elapsed = self.series.wall_clock_time_s.last().copied().unwrap_or(0.0);
            let verdict = checks::check_wall_clock(elapsed, self.config.max_wall_clock_time_s);
            if verdict.is_fatal() {
                return verdict;
            }
        }
        if self.config.checks.disk_space {
            let verdict =
                checks::check_disk_space(self.series.disk_space_mb.last().copied(), self.config.min_disk_space_mb);
            if verdict.is_fatal() {
                return verdict;
            }
        }
        if self.config.checks.load_average {
            let verdict =
                checks::check_load_average(self.series.load_average.last().copied(), self.config.load_avg_limit);
            if verdict.is_fatal() {
                return verdict;
            }
        }
        if self.config.checks.cpu_consumed {
            let verdict = checks::check_cpu_consumed(
                &self.series.cpu_consumed_seconds,
                self.effective_checking_time_s,
                self.config.sample_cpu_time_s,
                self.config.min_cpu_wall_clock_ratio_pct,
                &mut self.null_cpu_count,
                self.config.null_cpu_limit,
            );
            if verdict.is_fatal() {
                return verdict;
            }
        }
        if self.config.checks.cpu_limit {
            let verdict = checks::check_cpu_limit(
                self.series.cpu_consumed_seconds.last().copied(),
                self.job_cpu_time_s,
                self.config.job_cpu_margin_pct,
            );
            if verdict.is_fatal() {
                return verdict;
            }
        }
        CheckVerdict::Ok("all enabled checks passed".to_string())
    }

    /// `peek`: ask the execution thread for recent stdout. Disables
    /// itself after `peekRetry` consecutive failures.
    fn peek(&mut self) -> Option<String> {
        if !self.job_peek_flag {
            return None;
        }
        match self.exec_thread.recent_output() {
            Ok(lines) => Some(lines.join("\n")),
            Err(e) => {
                self.peek_fail_count += 1;
                if self.peek_fail_count > self.config.peek_retry {
                    self.job_peek_flag = false;
                    tracing::warn!(error = %e, "peek disabled after repeated failures");
                }
                None
            }
        }
    }

    /// `kill`: best-effort. The monitor's result is logged, never acted
    /// on further.
    fn kill(&mut self) {
        if let Err(e) = self.process_monitor.kill(self.wrapper_pid, true) {
            tracing::warn!(error = %e, pid = self.wrapper_pid, "kill request failed (best-effort)");
        }
    }

    /// `finalize`: write the stop marker and send the usage summary.
    /// Safe to call twice — the marker is simply overwritten.
    async fn finalize(&mut self) -> WatchdogResult<()> {
        std::fs::create_dir_all(&self.control_dir)
            .map_err(|e| WatchdogError::Other(format!("creating control dir: {e}")))?;
        let marker = self.control_dir.join(STOP_MARKER_FILENAME);
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        std::fs::write(&marker, format!("Watchdog Agent Stopped at {timestamp}"))
            .map_err(|e| WatchdogError::Other(format!("writing stop marker: {e}")))?;

        let summary = self.usage_summary();
        if let Some(job_id) = self.job_id {
            if let Err(e) = self.job_state_client.set_job_parameters(job_id, summary).await {
                tracing::warn!(error = %e, "reporting usage summary failed (non-fatal)");
            }
        }
        Ok(())
    }

    /// Final usage summary: average load, absolute deltas for memory and
    /// disk space from their initial values, last CPU consumed (seconds),
    /// total wall-clock time.
    pub fn usage_summary(&self) -> Vec<(String, String)> {
        let avg_load = if self.series.load_average.is_empty() {
            0.0
        } else {
            self.series.load_average.iter().sum::<f64>() / self.series.load_average.len() as f64
        };
        let memory_delta = self
            .series
            .memory_used_kb
            .last()
            .map(|v| (v - self.initial.memory_used_kb).abs())
            .unwrap_or(0.0);
        let disk_delta = self
            .series
            .disk_space_mb
            .last()
            .map(|v| (v - self.initial.disk_space_mb).abs())
            .unwrap_or(0.0);
        let last_cpu = self.series.cpu_consumed_seconds.last().copied().unwrap_or(0.0);
        let total_wall_clock = self.series.wall_clock_time_s.last().copied().unwrap_or(0.0);

        let mut summary = vec![
            ("AverageLoadAverage".to_string(), format!("{avg_load:.2}")),
            ("MemoryUsedDelta".to_string(), format!("{memory_delta:.2}")),
            ("DiskSpaceDelta".to_string(), format!("{disk_delta:.2}")),
            ("LastCPUConsumed".to_string(), format!("{last_cpu:.2}")),
            ("TotalWallClockTime".to_string(), format!("{total_wall_clock:.2}")),
        ];
        if let Some(reason) = &self.fatal_reason {
            summary.push(("FatalReason".to_string(), reason.clone()));
        }
        summary
    }
}

/// Scan `LSB_JOBID`, `PBS_JOBID`, `QSUB_REQNAME` in that order and return
/// the first one present in the environment.
fn detect_local_batch_job_id() -> Option<String> {
    for var in ["LSB_JOBID", "PBS_JOBID", "QSUB_REQNAME"] {
        if let Ok(value) = std::env::var(var) {
            return Some(value);
        }
    }
    None
}
