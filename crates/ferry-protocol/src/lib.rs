//! # Ferry Protocol - Wire Types for the Main/Worker Bridge
//!
//! Everything both execution contexts must agree on lives here:
//!
//! - [`RequestEnvelope`] / [`ResponseEnvelope`]: the message shapes
//!   exchanged across the bridge (pure data, no behavior).
//! - [`MessageType`]: the closed `namespace:action` set, as a sum type.
//! - [`CorrelationId`]: the opaque token linking a request to its
//!   eventual response.
//! - [`ErrorCode`] / [`ErrorValue`]: the exhaustive failure taxonomy.
//! - Storage payload types ([`StorageState`], [`QuotaWarning`], ...) for
//!   the `storage:*` operations.
//!
//! ## Invariants
//!
//! - A response's `id` always equals the originating request's `id`.
//! - `data` and `error` are mutually exclusive on a response; the
//!   constructors make any other shape unrepresentable.
//! - Transferables ride next to the JSON payload as [`bytes::Bytes`]:
//!   they are moved through the channel, never structurally copied, and
//!   they are not part of the serialized wire shape.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod correlation;
pub mod envelope;
pub mod error;
pub mod message_type;
pub mod storage;

// Re-export main types
pub use correlation::CorrelationId;
pub use envelope::{RequestEnvelope, ResponseEnvelope};
pub use error::{ErrorCode, ErrorValue, HandlerError};
pub use message_type::{MessageType, MessageTypeError};
pub use storage::{CleanupReport, PersistenceGrant, QuotaWarning, StorageState, WarningLevel};

/// Current protocol version for bridge messages.
pub const PROTOCOL_VERSION: u16 = 1;
