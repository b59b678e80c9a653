//! Default values for the watchdog and SSH CE configuration tables.

/// Supervision tick, seconds.
pub const DEFAULT_POLLING_TIME_S: u64 = 10;
/// Heavy-check interval, seconds, before the `minCheckingTime` clamp.
pub const DEFAULT_CHECKING_TIME_S: u64 = 1800;
/// Lower clamp for `checkingTime`.
pub const DEFAULT_MIN_CHECKING_TIME_S: u64 = 1200;
/// Hard wall-clock cap, seconds (4 days).
pub const DEFAULT_MAX_WALL_CLOCK_TIME_S: u64 = 345_600;
/// Floor on free disk space, MB.
pub const DEFAULT_MIN_DISK_SPACE_MB: f64 = 10.0;
/// Kill threshold for 1-minute load average.
pub const DEFAULT_LOAD_AVG_LIMIT: f64 = 1000.0;
/// CPU-ratio window, seconds.
pub const DEFAULT_SAMPLE_CPU_TIME_S: u64 = 1800;
/// Percent slack allowed over the job's configured CPU time.
pub const DEFAULT_JOB_CPU_MARGIN_PCT: f64 = 20.0;
/// Floor percent of CPU/wall-clock ratio before a stall is suspected.
pub const DEFAULT_MIN_CPU_WALL_CLOCK_RATIO_PCT: f64 = 5.0;
/// Consecutive null-delta CPU ticks tolerated before a stall is fatal.
pub const DEFAULT_NULL_CPU_LIMIT: u32 = 5;
/// Consecutive peek failures tolerated before peeking is disabled.
pub const DEFAULT_PEEK_RETRY: u32 = 5;

/// Default enablement of each heavy check, taken from the original
/// Watchdog constructor (not stated in the config table defaults).
pub const DEFAULT_CHECK_WALL_CLOCK: bool = true;
pub const DEFAULT_CHECK_DISK_SPACE: bool = true;
pub const DEFAULT_CHECK_LOAD_AVERAGE: bool = true;
pub const DEFAULT_CHECK_CPU_CONSUMED: bool = false;
pub const DEFAULT_CHECK_CPU_LIMIT: bool = false;

/// Heartbeat / setJobParameters RPC timeout, seconds.
pub const RPC_TIMEOUT_S: u64 = 120;

/// Name of the stop-marker sentinel file written at finalize.
pub const STOP_MARKER_FILENAME: &str = "stop_agent";

/// Default max job slots for a host descriptor without a `/MAXSLOTS` suffix.
pub const DEFAULT_HOST_MAX_SLOTS: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checking_time_default_exceeds_min_clamp() {
        assert!(DEFAULT_CHECKING_TIME_S >= DEFAULT_MIN_CHECKING_TIME_S);
    }

    #[test]
    fn null_cpu_limit_is_positive() {
        assert!(DEFAULT_NULL_CPU_LIMIT > 0);
    }
}
