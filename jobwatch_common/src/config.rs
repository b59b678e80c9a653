//! Configuration loading traits and types.
//!
//! Provides a standardized way to load TOML configuration for both the
//! watchdog and the SSH compute element: [`ConfigLoader`] gives any
//! `Deserialize`-able struct a `load()` that maps I/O and parse failures
//! onto [`ConfigError`], and both [`WatchdogConfig`] and [`SshCeConfig`]
//! follow with their own `validate()`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use jobwatch_common::config::{ConfigLoader, WatchdogConfig};
//! use std::path::Path;
//!
//! let cfg = WatchdogConfig::load(Path::new("watchdog.toml")).expect("load config");
//! cfg.validate().expect("valid config");
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::*;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Unknown field in TOML (strict parsing with `deny_unknown_fields`).
    #[error("Unknown field: {0}")]
    UnknownField(String),
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist.
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid or an
///   unknown field is present (`deny_unknown_fields` surfaces these as
///   ordinary `toml` parse errors).
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Check flags ─────────────────────────────────────────────────────

/// Per-check enable flags for the watchdog's heavy-check predicates.
///
/// Defaults follow the original Watchdog constructor: wall-clock, disk
/// space and load average are enabled out of the box; CPU-consumed and
/// CPU-limit require an explicit job CPU budget and are opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckFlags {
    #[serde(default = "default_check_wall_clock")]
    pub wall_clock: bool,
    #[serde(default = "default_check_disk_space")]
    pub disk_space: bool,
    #[serde(default = "default_check_load_average")]
    pub load_average: bool,
    #[serde(default = "default_check_cpu_consumed")]
    pub cpu_consumed: bool,
    #[serde(default = "default_check_cpu_limit")]
    pub cpu_limit: bool,
}

impl Default for CheckFlags {
    fn default() -> Self {
        Self {
            wall_clock: DEFAULT_CHECK_WALL_CLOCK,
            disk_space: DEFAULT_CHECK_DISK_SPACE,
            load_average: DEFAULT_CHECK_LOAD_AVERAGE,
            cpu_consumed: DEFAULT_CHECK_CPU_CONSUMED,
            cpu_limit: DEFAULT_CHECK_CPU_LIMIT,
        }
    }
}

fn default_check_wall_clock() -> bool {
    DEFAULT_CHECK_WALL_CLOCK
}
fn default_check_disk_space() -> bool {
    DEFAULT_CHECK_DISK_SPACE
}
fn default_check_load_average() -> bool {
    DEFAULT_CHECK_LOAD_AVERAGE
}
fn default_check_cpu_consumed() -> bool {
    DEFAULT_CHECK_CPU_CONSUMED
}
fn default_check_cpu_limit() -> bool {
    DEFAULT_CHECK_CPU_LIMIT
}

// ─── WatchdogConfig ────────────────────────────────────────────────

fn default_polling_time_s() -> u64 {
    DEFAULT_POLLING_TIME_S
}
fn default_checking_time_s() -> u64 {
    DEFAULT_CHECKING_TIME_S
}
fn default_min_checking_time_s() -> u64 {
    DEFAULT_MIN_CHECKING_TIME_S
}
fn default_max_wall_clock_time_s() -> u64 {
    DEFAULT_MAX_WALL_CLOCK_TIME_S
}
fn default_min_disk_space_mb() -> f64 {
    DEFAULT_MIN_DISK_SPACE_MB
}
fn default_load_avg_limit() -> f64 {
    DEFAULT_LOAD_AVG_LIMIT
}
fn default_sample_cpu_time_s() -> u64 {
    DEFAULT_SAMPLE_CPU_TIME_S
}
fn default_job_cpu_margin_pct() -> f64 {
    DEFAULT_JOB_CPU_MARGIN_PCT
}
fn default_min_cpu_wall_clock_ratio_pct() -> f64 {
    DEFAULT_MIN_CPU_WALL_CLOCK_RATIO_PCT
}
fn default_null_cpu_limit() -> u32 {
    DEFAULT_NULL_CPU_LIMIT
}
fn default_peek_retry() -> u32 {
    DEFAULT_PEEK_RETRY
}

/// Watchdog configuration — supervision tuning for a single payload.
///
/// See the data-model table for each field's meaning; `checking_time_s`
/// is clamped to `>= min_checking_time_s` by [`WatchdogConfig::validate`]
/// rather than rejected, matching the "clamped" wording in the spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchdogConfig {
    #[serde(default = "default_polling_time_s")]
    pub polling_time_s: u64,
    #[serde(default = "default_checking_time_s")]
    pub checking_time_s: u64,
    #[serde(default = "default_min_checking_time_s")]
    pub min_checking_time_s: u64,
    #[serde(default = "default_max_wall_clock_time_s")]
    pub max_wall_clock_time_s: u64,
    #[serde(default = "default_min_disk_space_mb")]
    pub min_disk_space_mb: f64,
    #[serde(default = "default_load_avg_limit")]
    pub load_avg_limit: f64,
    #[serde(default = "default_sample_cpu_time_s")]
    pub sample_cpu_time_s: u64,
    #[serde(default = "default_job_cpu_margin_pct")]
    pub job_cpu_margin_pct: f64,
    #[serde(default = "default_min_cpu_wall_clock_ratio_pct")]
    pub min_cpu_wall_clock_ratio_pct: f64,
    #[serde(default = "default_null_cpu_limit")]
    pub null_cpu_limit: u32,
    #[serde(default = "default_peek_retry")]
    pub peek_retry: u32,
    #[serde(default)]
    pub checks: CheckFlags,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            polling_time_s: DEFAULT_POLLING_TIME_S,
            checking_time_s: DEFAULT_CHECKING_TIME_S,
            min_checking_time_s: DEFAULT_MIN_CHECKING_TIME_S,
            max_wall_clock_time_s: DEFAULT_MAX_WALL_CLOCK_TIME_S,
            min_disk_space_mb: DEFAULT_MIN_DISK_SPACE_MB,
            load_avg_limit: DEFAULT_LOAD_AVG_LIMIT,
            sample_cpu_time_s: DEFAULT_SAMPLE_CPU_TIME_S,
            job_cpu_margin_pct: DEFAULT_JOB_CPU_MARGIN_PCT,
            min_cpu_wall_clock_ratio_pct: DEFAULT_MIN_CPU_WALL_CLOCK_RATIO_PCT,
            null_cpu_limit: DEFAULT_NULL_CPU_LIMIT,
            peek_retry: DEFAULT_PEEK_RETRY,
            checks: CheckFlags::default(),
        }
    }
}

impl WatchdogConfig {
    /// Validate fields and clamp `checking_time_s` up to `min_checking_time_s`.
    ///
    /// Returns the effective `checking_time_s` to use for the run.
    pub fn validate(&self) -> Result<u64, ConfigError> {
        if self.polling_time_s == 0 {
            return Err(ConfigError::ValidationError(
                "watchdog.polling_time_s must be > 0".to_string(),
            ));
        }
        if self.min_checking_time_s == 0 {
            return Err(ConfigError::ValidationError(
                "watchdog.min_checking_time_s must be > 0".to_string(),
            ));
        }
        if self.max_wall_clock_time_s == 0 {
            return Err(ConfigError::ValidationError(
                "watchdog.max_wall_clock_time_s must be > 0".to_string(),
            ));
        }
        if self.sample_cpu_time_s == 0 {
            return Err(ConfigError::ValidationError(
                "watchdog.sample_cpu_time_s must be > 0".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.min_cpu_wall_clock_ratio_pct) {
            return Err(ConfigError::ValidationError(format!(
                "watchdog.min_cpu_wall_clock_ratio_pct={} out of range [0, 100]",
                self.min_cpu_wall_clock_ratio_pct
            )));
        }
        if self.job_cpu_margin_pct < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "watchdog.job_cpu_margin_pct={} must be >= 0",
                self.job_cpu_margin_pct
            )));
        }
        Ok(self.checking_time_s.max(self.min_checking_time_s))
    }
}

// ─── SshCeConfig ─────────────────────────────────────────────────────

fn default_exec_queue() -> Option<String> {
    None
}
fn default_submit_options() -> String {
    String::new()
}
fn default_remove_output() -> String {
    "yes".to_string()
}

/// SSH Compute Element configuration — queue identity, filesystem layout
/// and the configured host pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SshCeConfig {
    pub queue: String,
    #[serde(default = "default_exec_queue")]
    pub exec_queue: Option<String>,
    pub shared_area: String,
    pub batch_output: String,
    pub batch_error: String,
    pub info_area: String,
    pub executable_area: String,
    pub work_area: String,
    /// Comma-separated `host[/maxSlots]` tokens.
    pub ssh_hosts: String,
    #[serde(default = "default_submit_options")]
    pub submit_options: String,
    /// Truthy string: anything except `no`/`false`/`0` (case-insensitive)
    /// enables output removal.
    #[serde(default = "default_remove_output")]
    pub remove_output: String,
}

impl SshCeConfig {
    /// Effective exec-queue name (defaults to `queue` when unset).
    pub fn effective_exec_queue(&self) -> &str {
        self.exec_queue.as_deref().unwrap_or(&self.queue)
    }

    /// Parse `remove_output` per the documented truthy rule.
    pub fn remove_output_enabled(&self) -> bool {
        !matches!(
            self.remove_output.to_lowercase().as_str(),
            "no" | "false" | "0"
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.is_empty() {
            return Err(ConfigError::ValidationError(
                "ssh_ce.queue cannot be empty".to_string(),
            ));
        }
        if self.shared_area.is_empty() {
            return Err(ConfigError::ValidationError(
                "ssh_ce.shared_area cannot be empty".to_string(),
            ));
        }
        if self.ssh_hosts.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "ssh_ce.ssh_hosts cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Join a relative area path onto `shared_area`; absolute paths pass through.
    pub fn resolve_area(&self, area: &str) -> std::path::PathBuf {
        let p = Path::new(area);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            Path::new(&self.shared_area).join(p)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn watchdog_config_defaults_are_consistent() {
        let cfg = WatchdogConfig::default();
        let effective = cfg.validate().expect("default config is valid");
        assert_eq!(effective, DEFAULT_CHECKING_TIME_S);
    }

    #[test]
    fn watchdog_config_clamps_checking_time_to_min() {
        let mut cfg = WatchdogConfig::default();
        cfg.checking_time_s = 100;
        cfg.min_checking_time_s = 1200;
        let effective = cfg.validate().expect("still valid");
        assert_eq!(effective, 1200);
    }

    #[test]
    fn watchdog_config_rejects_zero_polling_time() {
        let mut cfg = WatchdogConfig::default();
        cfg.polling_time_s = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn watchdog_config_check_flag_defaults_match_original() {
        let flags = CheckFlags::default();
        assert!(flags.wall_clock);
        assert!(flags.disk_space);
        assert!(flags.load_average);
        assert!(!flags.cpu_consumed);
        assert!(!flags.cpu_limit);
    }

    #[test]
    fn watchdog_config_loads_from_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            polling_time_s = 5
            checking_time_s = 60
            min_checking_time_s = 30
            "#
        )
        .unwrap();
        let cfg = WatchdogConfig::load(file.path()).expect("load");
        assert_eq!(cfg.polling_time_s, 5);
        assert_eq!(cfg.validate().unwrap(), 60);
    }

    #[test]
    fn watchdog_config_unknown_field_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "bogus_field = 1").unwrap();
        let result = WatchdogConfig::load(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn watchdog_config_missing_file_reports_file_not_found() {
        let result = WatchdogConfig::load(Path::new("/nonexistent/watchdog.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn ssh_ce_config_exec_queue_defaults_to_queue() {
        let cfg = SshCeConfig {
            queue: "batch".to_string(),
            exec_queue: None,
            shared_area: "/shared".to_string(),
            batch_output: "output".to_string(),
            batch_error: "error".to_string(),
            info_area: "info".to_string(),
            executable_area: "executable".to_string(),
            work_area: "work".to_string(),
            ssh_hosts: "host-a,host-b/3".to_string(),
            submit_options: String::new(),
            remove_output: "yes".to_string(),
        };
        assert_eq!(cfg.effective_exec_queue(), "batch");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn ssh_ce_config_remove_output_truthy_rule() {
        let mut cfg_base = SshCeConfig {
            queue: "batch".to_string(),
            exec_queue: None,
            shared_area: "/shared".to_string(),
            batch_output: "output".to_string(),
            batch_error: "error".to_string(),
            info_area: "info".to_string(),
            executable_area: "executable".to_string(),
            work_area: "work".to_string(),
            ssh_hosts: "host-a".to_string(),
            submit_options: String::new(),
            remove_output: "yes".to_string(),
        };
        assert!(cfg_base.remove_output_enabled());
        cfg_base.remove_output = "No".to_string();
        assert!(!cfg_base.remove_output_enabled());
        cfg_base.remove_output = "0".to_string();
        assert!(!cfg_base.remove_output_enabled());
        cfg_base.remove_output = "FALSE".to_string();
        assert!(!cfg_base.remove_output_enabled());
    }

    #[test]
    fn ssh_ce_config_resolve_area_joins_relative_paths() {
        let cfg = SshCeConfig {
            queue: "batch".to_string(),
            exec_queue: None,
            shared_area: "/shared".to_string(),
            batch_output: "output".to_string(),
            batch_error: "error".to_string(),
            info_area: "info".to_string(),
            executable_area: "executable".to_string(),
            work_area: "work".to_string(),
            ssh_hosts: "host-a".to_string(),
            submit_options: String::new(),
            remove_output: "yes".to_string(),
        };
        assert_eq!(cfg.resolve_area("output"), Path::new("/shared/output"));
        assert_eq!(
            cfg.resolve_area("/abs/output"),
            Path::new("/abs/output")
        );
    }
}
