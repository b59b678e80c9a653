//! Upstream-controller RPC collaborators.
//!
//! The RPC transport itself is explicitly out of scope; these traits
//! define the two call shapes the watchdog needs and the proxy-renewal
//! call it makes on behalf of a generic pilot credential. Methods use
//! native `async fn` in traits (no `async-trait` shim needed on this
//! workspace's edition).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("RPC timed out after {0:?}")]
    Timeout(Duration),
    #[error("RPC transport error: {0}")]
    Transport(String),
}

/// A control signal carried back in a heartbeat response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSignal {
    /// The controller is requesting the payload be killed.
    Kill,
    /// Any other mapping — logged and otherwise ignored.
    Other(HashMap<String, String>),
}

/// `WorkloadManagement/JobStateUpdate` RPC collaborator.
pub trait JobStateUpdateClient: Send + Sync {
    /// `sendHeartBeat(jobID, heartBeatDict, staticParamDict)`. A 120 s
    /// timeout is the caller's responsibility (`tokio::time::timeout`);
    /// this trait only defines the call shape.
    fn send_heartbeat(
        &self,
        job_id: u64,
        heartbeat: HashMap<String, f64>,
        static_params: HashMap<String, String>,
    ) -> impl Future<Output = Result<Option<ControlSignal>, RpcError>> + Send;

    /// `setJobParameters(jobID, pairs)`.
    fn set_job_parameters(
        &self,
        job_id: u64,
        pairs: Vec<(String, String)>,
    ) -> impl Future<Output = Result<(), RpcError>> + Send;
}

/// Proxy-renewal collaborator consumed by the watchdog when the current
/// credential is a generic pilot.
pub trait ProxyRenewalClient: Send + Sync {
    fn renew_proxy(
        &self,
        min_life_time: Duration,
        new_life_time: Duration,
        proxy_to_connect: &Path,
    ) -> impl Future<Output = Result<(), RpcError>> + Send;
}
