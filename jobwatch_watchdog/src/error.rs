//! Watchdog-specific error type.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum WatchdogError {
    #[error("calibration failed: {0}")]
    CalibrationFailed(String),

    /// A heavy-check predicate returned a fatal verdict. Carried for
    /// logging and embedding in the final usage report; by the time this
    /// is constructed the payload has already been killed.
    #[error("{check} check failed: {detail}")]
    PredicateFatal { check: String, detail: String },

    #[error("{0}")]
    Other(String),
}

pub type WatchdogResult<T> = Result<T, WatchdogError>;
