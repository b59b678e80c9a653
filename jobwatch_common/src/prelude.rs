//! Prelude module for common re-exports.
//!
//! ```rust
//! use jobwatch_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{CheckFlags, ConfigError, ConfigLoader, SshCeConfig, WatchdogConfig};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::credential::{Credential, CredentialWrapper};
pub use crate::platform::{PlatformError, SystemAdapter};
pub use crate::process::{ProcessError, ProcessMonitor};
pub use crate::rpc::{ControlSignal, JobStateUpdateClient, ProxyRenewalClient, RpcError};

// ─── Job handle & time ───────────────────────────────────────────────
pub use crate::handle::JobHandle;
pub use crate::time::{format_cpu_hms, parse_cpu_hms_quirky, TimeError};
