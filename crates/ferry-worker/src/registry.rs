//! Handler registry: message type → async handler.
//!
//! Re-registration under an already-taken type is rejected, never
//! silently overwritten. Silent replacement is how duplicate side
//! effects slip in.

use async_trait::async_trait;
use bytes::Bytes;
use ferry_protocol::{HandlerError, MessageType};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors from registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A handler is already registered under this type.
    #[error("handler already registered for {message_type}")]
    DuplicateHandler { message_type: MessageType },
}

impl From<RegistryError> for HandlerError {
    fn from(err: RegistryError) -> Self {
        HandlerError::new(err.to_string())
    }
}

/// Payload validator run by the router before the handler is invoked.
/// Returns a human-readable reason on rejection.
pub type PayloadValidator = Arc<dyn Fn(&serde_json::Value) -> Result<(), String> + Send + Sync>;

/// An asynchronous request handler.
///
/// Handlers receive the request payload plus any transferable buffers
/// that rode beside it, and either return result data or fail with a
/// [`HandlerError`] carrying a protocol code.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(
        &self,
        payload: serde_json::Value,
        transferables: Vec<Bytes>,
    ) -> Result<serde_json::Value, HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send,
{
    async fn handle(
        &self,
        payload: serde_json::Value,
        _transferables: Vec<Bytes>,
    ) -> Result<serde_json::Value, HandlerError> {
        (self.0)(payload).await
    }
}

struct TransferFnHandler<F>(F);

#[async_trait]
impl<F, Fut> RequestHandler for TransferFnHandler<F>
where
    F: Fn(serde_json::Value, Vec<Bytes>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send,
{
    async fn handle(
        &self,
        payload: serde_json::Value,
        transferables: Vec<Bytes>,
    ) -> Result<serde_json::Value, HandlerError> {
        (self.0)(payload, transferables).await
    }
}

/// Adapt a payload-only async closure into a [`RequestHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn RequestHandler>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Adapt an async closure that also consumes transferable buffers.
pub fn transfer_handler_fn<F, Fut>(f: F) -> Arc<dyn RequestHandler>
where
    F: Fn(serde_json::Value, Vec<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
{
    Arc::new(TransferFnHandler(f))
}

/// Per-registration options.
#[derive(Default, Clone)]
pub struct RegisterOptions {
    /// Worker-side bound on this handler's execution, overriding the
    /// router default.
    pub timeout: Option<Duration>,
    /// Payload validator run before the handler is invoked.
    pub validator: Option<PayloadValidator>,
}

impl RegisterOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_validator<V>(mut self, validator: V) -> Self
    where
        V: Fn(&serde_json::Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }
}

/// One registry entry. Cloned out of the table on lookup so dispatches
/// overlap without holding the lock.
#[derive(Clone)]
pub struct Registration {
    pub handler: Arc<dyn RequestHandler>,
    pub timeout: Option<Duration>,
    pub validator: Option<PayloadValidator>,
}

/// Table mapping message types to handlers.
///
/// Constructed as an explicit instance by the worker entry point and
/// shared by `Arc`, never as a process-wide global.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<MessageType, Registration>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a message type.
    ///
    /// Fails with [`RegistryError::DuplicateHandler`] if the type is
    /// already taken; the existing handler stays in place.
    pub fn register(
        &self,
        message_type: MessageType,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), RegistryError> {
        self.register_with(message_type, handler, RegisterOptions::default())
    }

    /// Register a handler with per-registration options.
    pub fn register_with(
        &self,
        message_type: MessageType,
        handler: Arc<dyn RequestHandler>,
        options: RegisterOptions,
    ) -> Result<(), RegistryError> {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&message_type) {
            return Err(RegistryError::DuplicateHandler { message_type });
        }
        debug!(message_type = %message_type, "Registered handler");
        handlers.insert(
            message_type,
            Registration {
                handler,
                timeout: options.timeout,
                validator: options.validator,
            },
        );
        Ok(())
    }

    /// Look up the registration for a message type.
    #[must_use]
    pub fn lookup(&self, message_type: &MessageType) -> Option<Registration> {
        self.handlers.read().get(message_type).cloned()
    }

    /// Whether a handler is registered for this type.
    #[must_use]
    pub fn contains(&self, message_type: &MessageType) -> bool {
        self.handlers.read().contains_key(message_type)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// The currently registered types, in no particular order.
    #[must_use]
    pub fn registered_types(&self) -> Vec<MessageType> {
        self.handlers.read().keys().cloned().collect()
    }
}
