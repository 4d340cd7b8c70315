//! # Ferry Worker - The Background Execution Context
//!
//! One spawned task owns everything stateful: the handler registry, the
//! initialization lifecycle, the quota monitor, and the storage handle
//! behind the [`StorageEstimator`] port. The main context never touches
//! any of it directly; it only posts [`RequestEnvelope`]s and receives
//! [`ResponseEnvelope`]s.
//!
//! ## Components
//!
//! - [`HandlerRegistry`]: message type to async handler, with
//!   duplicate-registration rejection, per-registration timeout override
//!   and optional payload validation.
//! - [`Lifecycle`]: the `not-started -> loading -> initializing -> ready`
//!   state machine that gates dispatch.
//! - [`QuotaMonitor`]: polls storage usage, classifies it against the
//!   warning thresholds and emits de-duplicated warnings on a broadcast
//!   side channel.
//! - [`Router`]: the single dispatch pipeline. Every failure, protocol
//!   or handler level, is normalized into a response envelope; nothing
//!   escapes as an uncaught fault.
//! - [`Worker`]: the entry point wiring the above together and serving
//!   the request loop.
//!
//! All registries and monitors are explicit instances constructed in
//! [`Worker::spawn`] and passed by `Arc`. There is no module-level
//! mutable state in this crate.
//!
//! [`RequestEnvelope`]: ferry_protocol::RequestEnvelope
//! [`ResponseEnvelope`]: ferry_protocol::ResponseEnvelope

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod lifecycle;
pub mod quota;
pub mod registry;
pub mod router;
pub mod worker;

// Re-export main types
pub use config::{ConfigError, QuotaConfig, WorkerConfig};
pub use lifecycle::{InitPhase, InitState, Lifecycle, LifecycleError};
pub use quota::{QuotaMonitor, StorageError, StorageEstimate, StorageEstimator};
pub use registry::{
    handler_fn, transfer_handler_fn, HandlerRegistry, RegisterOptions, RegistryError,
    RequestHandler,
};
pub use router::Router;
pub use worker::{SetupContext, Worker, WorkerError, WorkerHandle, WorkerSetup};
