//! SSH Compute Element error type.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CeError {
    /// No configured host currently has a free slot.
    #[error("No online node found on queue")]
    NoOnlineNode,

    /// One or more per-host kill requests failed. `message` carries the
    /// last failure's text (matching the original's single-`message`
    /// result payload); `failed` lists every handle whose host group
    /// failed, including handles that did not parse at all.
    #[error("kill failed: {message}")]
    KillFailed { message: String, failed: Vec<String> },

    /// A backend-level transport failure (connection, auth, non-zero
    /// remote exit). Carried up from [`crate::backend::SshHostBackend`].
    #[error("SSH transport error on host {host}: {reason}")]
    Transport { host: String, reason: String },
}

pub type CeResult<T> = Result<T, CeError>;
