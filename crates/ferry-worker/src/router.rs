//! Request router: the single dispatch pipeline for the worker context.
//!
//! Order of checks per incoming request: readiness gate, handler lookup,
//! payload validation, invocation. Every failure, at any stage, becomes
//! a response envelope; a handler can reject, time out or panic and the
//! caller still gets exactly one typed response.

use crate::lifecycle::Lifecycle;
use crate::registry::HandlerRegistry;
use ferry_protocol::{ErrorCode, ErrorValue, RequestEnvelope, ResponseEnvelope};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Aborts the handler task when dropped. Dispatch holds one of these
/// across every await, so cancelling the dispatch (worker teardown,
/// worker-side timeout) also stops the handler instead of leaving it
/// running detached. Aborting an already-finished task is a no-op.
struct HandlerGuard(AbortHandle);

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Routes request envelopes to registered handlers.
#[derive(Clone)]
pub struct Router {
    registry: Arc<HandlerRegistry>,
    lifecycle: Arc<Lifecycle>,
    default_timeout: Option<Duration>,
}

impl Router {
    #[must_use]
    pub fn new(
        registry: Arc<HandlerRegistry>,
        lifecycle: Arc<Lifecycle>,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            default_timeout,
        }
    }

    /// Dispatch one request to its handler and produce the response.
    ///
    /// This is the only place handler elapsed time is measured.
    pub async fn dispatch(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let id = request.id;
        let message_type = request.message_type.clone();
        let started = Instant::now();

        let response = self.dispatch_inner(request).await;

        let elapsed_ms = started.elapsed().as_millis();
        if response.success {
            debug!(
                correlation_id = %id,
                message_type = %message_type,
                elapsed_ms,
                "Dispatch completed"
            );
        } else {
            let code = response.error.as_ref().map(|e| e.code.as_str()).unwrap_or("?");
            warn!(
                correlation_id = %id,
                message_type = %message_type,
                elapsed_ms,
                code,
                "Dispatch failed"
            );
        }
        response
    }

    async fn dispatch_inner(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let RequestEnvelope {
            id,
            message_type,
            payload,
            transferables,
            ..
        } = request;

        // (a) readiness gate. Bootstrap and status requests pass in
        // every phase; everything else waits for `ready`.
        if !self.lifecycle.is_ready() && !message_type.is_gate_exempt() {
            return ResponseEnvelope::fail(
                id,
                ErrorValue::new(
                    ErrorCode::WorkerNotInitialized,
                    format!(
                        "worker is not ready (phase: {})",
                        self.lifecycle.phase()
                    ),
                ),
            );
        }

        // (b) handler lookup.
        let Some(registration) = self.registry.lookup(&message_type) else {
            return ResponseEnvelope::fail(
                id,
                ErrorValue::new(
                    ErrorCode::HandlerNotFound,
                    format!("no handler registered for {message_type}"),
                ),
            );
        };

        // (c) payload validation.
        if let Some(validator) = &registration.validator {
            if let Err(reason) = validator(&payload) {
                return ResponseEnvelope::fail(
                    id,
                    ErrorValue::new(ErrorCode::InvalidPayload, reason),
                );
            }
        }

        // (d)/(e) invocation. The handler runs in its own task so a
        // panic is contained as a join error instead of tearing down the
        // worker loop; the guard ties its lifetime to this dispatch.
        let handler = Arc::clone(&registration.handler);
        let join = tokio::spawn(async move { handler.handle(payload, transferables).await });
        let _guard = HandlerGuard(join.abort_handle());

        let window = registration.timeout.or(self.default_timeout);
        let joined = match window {
            Some(window) => match tokio::time::timeout(window, join).await {
                Ok(joined) => joined,
                Err(_) => {
                    // Returning drops the guard, which aborts the
                    // over-budget handler.
                    return ResponseEnvelope::fail(
                        id,
                        ErrorValue::new(
                            ErrorCode::HandlerTimeout,
                            format!(
                                "handler for {message_type} exceeded {} ms",
                                window.as_millis()
                            ),
                        ),
                    );
                }
            },
            None => join.await,
        };

        match joined {
            Ok(Ok(data)) => ResponseEnvelope::ok(id, data),
            Ok(Err(handler_error)) => ResponseEnvelope::fail(id, handler_error.into()),
            Err(join_error) => ResponseEnvelope::fail(
                id,
                ErrorValue::new(
                    ErrorCode::OperationFailed,
                    format!("handler for {message_type} panicked: {join_error}"),
                ),
            ),
        }
    }
}
