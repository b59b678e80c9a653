//! Polymorphic platform adapters.
//!
//! `getLoadAverage`, `getMemoryUsed`, `getDiskSpace` and
//! `getNodeInformation` are declared here as a capability trait rather
//! than as virtual methods overridden per-OS subclass: the watchdog is
//! handed a concrete adapter at construction and never performs any
//! runtime OS dispatch of its own. This mirrors the HAL driver trait
//! used elsewhere in this workspace for the analogous hardware-dispatch
//! problem — a capability interface supplied once, no global registry.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    #[error("{what} is not implemented on this platform")]
    NotImplemented { what: &'static str },
    #[error("failed to read {what}: {reason}")]
    ReadFailed { what: &'static str, reason: String },
}

/// Capability set for per-OS system measurements.
///
/// Every method can fail with [`PlatformError`]; a measurement failure is
/// never fatal to the watchdog by itself (§7, "measurement-unavailable")
/// — callers degrade the corresponding check to "could not be
/// established" rather than treating it as a policy violation.
pub trait SystemAdapter: Send + Sync {
    /// 1-minute load average.
    fn load_average(&self) -> Result<f64, PlatformError>;

    /// Memory used by the current host, in kB.
    fn memory_used_kb(&self) -> Result<f64, PlatformError>;

    /// Free disk space at `path`, in MB.
    fn disk_space_free_mb(&self, path: &Path) -> Result<f64, PlatformError>;

    /// Free-form node identity information (hostname, kernel, arch, ...).
    fn node_information(&self) -> Result<HashMap<String, String>, PlatformError>;
}

/// Linux implementation backed by `libc`/`/proc`/`statvfs`/`uname`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxSystemAdapter;

impl SystemAdapter for LinuxSystemAdapter {
    fn load_average(&self) -> Result<f64, PlatformError> {
        let mut loads = [0.0_f64; 3];
        let n = unsafe { libc::getloadavg(loads.as_mut_ptr(), 3) };
        if n < 1 {
            return Err(PlatformError::ReadFailed {
                what: "load average",
                reason: "getloadavg returned no samples".to_string(),
            });
        }
        Ok(loads[0])
    }

    fn memory_used_kb(&self) -> Result<f64, PlatformError> {
        let contents = std::fs::read_to_string("/proc/meminfo").map_err(|e| {
            PlatformError::ReadFailed {
                what: "memory usage",
                reason: e.to_string(),
            }
        })?;

        let mut total_kb = None;
        let mut available_kb = None;
        for line in contents.lines() {
            if let Some(rest) = line.strip_prefix("MemTotal:") {
                total_kb = parse_meminfo_kb(rest);
            } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
                available_kb = parse_meminfo_kb(rest);
            }
        }

        match (total_kb, available_kb) {
            (Some(total), Some(available)) => Ok((total - available).max(0.0)),
            _ => Err(PlatformError::ReadFailed {
                what: "memory usage",
                reason: "MemTotal/MemAvailable not found in /proc/meminfo".to_string(),
            }),
        }
    }

    fn disk_space_free_mb(&self, path: &Path) -> Result<f64, PlatformError> {
        let stats = nix::sys::statvfs::statvfs(path).map_err(|e| PlatformError::ReadFailed {
            what: "disk space",
            reason: e.to_string(),
        })?;
        let bytes = stats.blocks_available() as f64 * stats.fragment_size() as f64;
        Ok(bytes / (1024.0 * 1024.0))
    }

    fn node_information(&self) -> Result<HashMap<String, String>, PlatformError> {
        let uname = nix::sys::utsname::uname().map_err(|e| PlatformError::ReadFailed {
            what: "node information",
            reason: e.to_string(),
        })?;

        let mut info = HashMap::new();
        info.insert(
            "sysname".to_string(),
            uname.sysname().to_string_lossy().into_owned(),
        );
        info.insert(
            "nodename".to_string(),
            uname.nodename().to_string_lossy().into_owned(),
        );
        info.insert(
            "release".to_string(),
            uname.release().to_string_lossy().into_owned(),
        );
        info.insert(
            "version".to_string(),
            uname.version().to_string_lossy().into_owned(),
        );
        info.insert(
            "machine".to_string(),
            uname.machine().to_string_lossy().into_owned(),
        );
        Ok(info)
    }
}

fn parse_meminfo_kb(field: &str) -> Option<f64> {
    field.trim().split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_load_average_is_nonnegative() {
        let adapter = LinuxSystemAdapter;
        let load = adapter.load_average().expect("load average readable");
        assert!(load >= 0.0);
    }

    #[test]
    fn linux_disk_space_free_is_nonnegative_for_tmp() {
        let adapter = LinuxSystemAdapter;
        let free = adapter
            .disk_space_free_mb(Path::new("/tmp"))
            .expect("disk space readable for /tmp");
        assert!(free >= 0.0);
    }

    #[test]
    fn linux_node_information_includes_sysname() {
        let adapter = LinuxSystemAdapter;
        let info = adapter.node_information().expect("node info readable");
        assert!(info.contains_key("sysname"));
    }

    /// A fake adapter proving `SystemAdapter` is usable as a trait
    /// object, the way the watchdog consumes it.
    struct AlwaysFailsAdapter;
    impl SystemAdapter for AlwaysFailsAdapter {
        fn load_average(&self) -> Result<f64, PlatformError> {
            Err(PlatformError::NotImplemented { what: "load_average" })
        }
        fn memory_used_kb(&self) -> Result<f64, PlatformError> {
            Err(PlatformError::NotImplemented { what: "memory_used_kb" })
        }
        fn disk_space_free_mb(&self, _path: &Path) -> Result<f64, PlatformError> {
            Err(PlatformError::NotImplemented { what: "disk_space_free_mb" })
        }
        fn node_information(&self) -> Result<HashMap<String, String>, PlatformError> {
            Err(PlatformError::NotImplemented { what: "node_information" })
        }
    }

    #[test]
    fn system_adapter_is_object_safe() {
        let adapter: Box<dyn SystemAdapter> = Box::new(AlwaysFailsAdapter);
        assert!(adapter.load_average().is_err());
    }
}
