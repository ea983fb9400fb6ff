//! Error types for the orbit engine

use crate::bodies::BodyId;
use thiserror::Error;

/// Errors surfaced by propagation, scheduling and ephemeris handling
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Requested dominant body is absent from the ephemeris snapshot
    #[error("body {0} is not present in the ephemeris snapshot")]
    MissingBody(BodyId),

    /// Integrator produced non-finite values
    #[error("numerical failure at t = {time:.3} s: non-finite state")]
    NumericalFailure { time: f64 },

    /// Request parameters cannot be propagated
    #[error("invalid propagation request: {0}")]
    InvalidRequest(String),

    /// Transport-level failure of a pool worker
    #[error("worker {worker} faulted")]
    WorkerFault { worker: usize },

    /// Job was cancelled before completion
    #[error("job cancelled")]
    Cancelled,

    /// Catalog epoch could not be converted
    #[error("invalid epoch: {0}")]
    InvalidEpoch(String),
}

impl EngineError {
    /// Whether the caller may simply resubmit the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WorkerFault { .. } | Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
