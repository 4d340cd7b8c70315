//! Request and response envelopes exchanged across the bridge.

use crate::correlation::CorrelationId;
use crate::error::ErrorValue;
use crate::message_type::MessageType;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request envelope posted from the main context to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Correlation ID for response matching; unique among the sending
    /// correlator's pending requests.
    pub id: CorrelationId,
    /// The `namespace:action` tag naming the operation.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Type-specific structured payload.
    pub payload: serde_json::Value,
    /// Creation instant.
    pub timestamp: DateTime<Utc>,
    /// Buffer-like values moved (not copied) across the bridge. Not part
    /// of the serialized wire shape; they travel beside it.
    #[serde(skip)]
    pub transferables: Vec<Bytes>,
}

impl RequestEnvelope {
    /// Create a request envelope with a fresh correlation ID.
    pub fn new(message_type: MessageType, payload: serde_json::Value) -> Self {
        Self {
            id: CorrelationId::new(),
            message_type,
            payload,
            timestamp: Utc::now(),
            transferables: Vec::new(),
        }
    }

    /// Create a request envelope under a caller-supplied correlation ID.
    pub fn with_id(
        id: CorrelationId,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id,
            message_type,
            payload,
            timestamp: Utc::now(),
            transferables: Vec::new(),
        }
    }

    /// Attach transferable buffers.
    #[must_use]
    pub fn with_transferables(mut self, transferables: Vec<Bytes>) -> Self {
        self.transferables = transferables;
        self
    }
}

/// Response envelope posted from the worker back to the main context.
///
/// `data` is present iff `success`; `error` is present iff not. The
/// constructors are the only way this crate builds responses, so the
/// exclusivity holds everywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Matches the originating request's ID.
    pub id: CorrelationId,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Result data, present iff `success`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Failure description, present iff not `success`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorValue>,
    /// Creation instant.
    pub timestamp: DateTime<Utc>,
}

impl ResponseEnvelope {
    /// Build a success response.
    pub fn ok(id: CorrelationId, data: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Build a failure response.
    pub fn fail(id: CorrelationId, error: ErrorValue) -> Self {
        Self {
            id,
            success: false,
            data: None,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }

    /// Collapse into the caller-facing result.
    ///
    /// A malformed envelope (success without data, or failure without an
    /// error) maps onto a generic failure rather than panicking.
    pub fn into_result(self) -> Result<serde_json::Value, ErrorValue> {
        if self.success {
            Ok(self.data.unwrap_or(serde_json::Value::Null))
        } else {
            Err(self.error.unwrap_or_else(|| {
                ErrorValue::new(
                    crate::error::ErrorCode::OperationFailed,
                    "response envelope carried no error value",
                )
            }))
        }
    }
}
