//! Failure taxonomy for the bridge.
//!
//! Every failure a caller can observe carries one of the codes below,
//! whether it was raised by a handler, detected by the router before any
//! handler ran, or produced client-side (timeout, termination).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Exhaustive error code enumeration for the bridge protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The worker's lifecycle has not reached `ready`.
    #[serde(rename = "WORKER_NOT_INITIALIZED")]
    WorkerNotInitialized,
    /// The core runtime behind the worker is not initialized.
    #[serde(rename = "ONECORE_NOT_INITIALIZED")]
    OnecoreNotInitialized,
    /// The platform storage quota is exhausted.
    #[serde(rename = "STORAGE_QUOTA_EXCEEDED")]
    StorageQuotaExceeded,
    /// The request payload failed the registered validator.
    #[serde(rename = "INVALID_PAYLOAD")]
    InvalidPayload,
    /// The handler did not complete within its window.
    #[serde(rename = "HANDLER_TIMEOUT")]
    HandlerTimeout,
    /// No handler is registered for the request type.
    #[serde(rename = "HANDLER_NOT_FOUND")]
    HandlerNotFound,
    /// The handler ran and failed.
    #[serde(rename = "OPERATION_FAILED")]
    OperationFailed,
    /// A network fault inside the handler.
    #[serde(rename = "NETWORK_ERROR")]
    NetworkError,
    /// The platform refused the operation.
    #[serde(rename = "PERMISSION_DENIED")]
    PermissionDenied,
    /// The platform lacks a required primitive.
    #[serde(rename = "UNSUPPORTED_BROWSER")]
    UnsupportedBrowser,
}

impl ErrorCode {
    /// The wire string for this code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkerNotInitialized => "WORKER_NOT_INITIALIZED",
            Self::OnecoreNotInitialized => "ONECORE_NOT_INITIALIZED",
            Self::StorageQuotaExceeded => "STORAGE_QUOTA_EXCEEDED",
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::HandlerTimeout => "HANDLER_TIMEOUT",
            Self::HandlerNotFound => "HANDLER_NOT_FOUND",
            Self::OperationFailed => "OPERATION_FAILED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::UnsupportedBrowser => "UNSUPPORTED_BROWSER",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error carried in a response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorValue {
    /// Protocol error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Arbitrary structured context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Capture trace, attached only in debug builds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl ErrorValue {
    /// Create an error value, attaching a capture trace in debug builds.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            trace: capture_trace(),
        }
    }

    /// Attach structured context.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorValue {}

fn capture_trace() -> Option<String> {
    if cfg!(debug_assertions) {
        Some(std::backtrace::Backtrace::force_capture().to_string())
    } else {
        None
    }
}

/// Error type business handlers return.
///
/// Defaults to [`ErrorCode::OperationFailed`]; handlers that know better
/// attach a more specific code and the router preserves it.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct HandlerError {
    /// Protocol error code for this failure.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Arbitrary structured context.
    pub details: Option<serde_json::Value>,
}

impl HandlerError {
    /// A generic handler failure (`OPERATION_FAILED`).
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::OperationFailed, message)
    }

    /// A failure with a specific protocol code.
    pub fn with_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured context.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_code(ErrorCode::InvalidPayload, err.to_string())
    }
}

impl From<HandlerError> for ErrorValue {
    fn from(err: HandlerError) -> Self {
        let mut value = ErrorValue::new(err.code, err.message);
        value.details = err.details;
        value
    }
}
