//! Client-side error types.

use ferry_protocol::{ErrorCode, ErrorValue};
use std::time::Duration;
use thiserror::Error;

/// Errors a caller can observe from [`WorkerClient`](crate::WorkerClient).
///
/// `Timeout`, `Terminated` and `ConnectionLost` are purely local and
/// never reach the worker context. `Rejected` wraps the worker's own
/// typed failure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    /// `initialize()` has not been called (or the client was terminated).
    #[error("worker client not initialized")]
    NotInitialized,
    /// No response arrived within the wait window.
    #[error("request timed out after {window:?}")]
    Timeout { window: Duration },
    /// `terminate()` destroyed the worker while this call was pending.
    #[error("worker terminated")]
    Terminated,
    /// The worker context went away without being terminated.
    #[error("worker connection lost")]
    ConnectionLost,
    /// The worker answered with a failure.
    #[error("request rejected: {0}")]
    Rejected(ErrorValue),
}

impl ClientError {
    /// The protocol error code for this failure.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::WorkerNotInitialized,
            Self::Timeout { .. } => ErrorCode::HandlerTimeout,
            Self::Terminated | Self::ConnectionLost => ErrorCode::OperationFailed,
            Self::Rejected(error) => error.code,
        }
    }
}
