//! # Ferry Client - The Main-Context Correlator
//!
//! Turns one-way message posting into awaitable, timeout-bounded calls.
//! [`WorkerClient`] posts a [`RequestEnvelope`] with a fresh correlation
//! id, parks the caller on a oneshot, and settles it when the matching
//! response arrives, the wait window elapses, or the worker goes away.
//!
//! Responses arrive in completion order, not send order; the pending
//! table's id matching is what makes that safe. A timed-out call only
//! severs the caller's wait; the handler keeps running and its eventual
//! response is logged and dropped.
//!
//! [`RequestEnvelope`]: ferry_protocol::RequestEnvelope

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod error;
pub mod pending;

// Re-export main types
pub use client::{WorkerClient, DEFAULT_REQUEST_TIMEOUT};
pub use error::ClientError;
pub use pending::PendingCallStore;
