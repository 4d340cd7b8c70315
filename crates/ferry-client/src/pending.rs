//! Pending-call table: correlation id → waiting caller.
//!
//! An entry is created when a request is sent. It settles exactly once,
//! by matching response, timeout, or drain on termination or transport
//! loss, and is removed.

use crate::error::ClientError;
use dashmap::DashMap;
use ferry_protocol::{CorrelationId, MessageType, ResponseEnvelope};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// What a settled call yields.
pub type CallResult = Result<serde_json::Value, ClientError>;

struct PendingCall {
    settle: oneshot::Sender<CallResult>,
    created_at: Instant,
    message_type: MessageType,
}

/// Counters for observability.
#[derive(Debug, Default)]
pub struct PendingStats {
    pub registered: AtomicU64,
    pub completed: AtomicU64,
    pub timed_out: AtomicU64,
    pub drained: AtomicU64,
}

/// Table of calls awaiting their response.
#[derive(Default)]
pub struct PendingCallStore {
    calls: DashMap<CorrelationId, PendingCall>,
    stats: PendingStats,
}

impl PendingCallStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending call under a fresh correlation id.
    pub fn register(&self, message_type: MessageType) -> (CorrelationId, oneshot::Receiver<CallResult>) {
        let id = CorrelationId::new();
        let (settle, rx) = oneshot::channel();
        self.calls.insert(
            id,
            PendingCall {
                settle,
                created_at: Instant::now(),
                message_type,
            },
        );
        self.stats.registered.fetch_add(1, Ordering::Relaxed);
        (id, rx)
    }

    /// Settle the call matching a response envelope.
    ///
    /// Unknown or stale ids (already timed out, duplicate response) are
    /// logged and dropped. A late handler result lands here.
    pub fn complete(&self, response: ResponseEnvelope) -> bool {
        let Some((id, call)) = self.calls.remove(&response.id) else {
            debug!(
                correlation_id = %response.id,
                "Dropping response for unknown or expired correlation id"
            );
            return false;
        };

        let elapsed_ms = call.created_at.elapsed().as_millis();
        let result = response.into_result().map_err(ClientError::Rejected);
        match call.settle.send(result) {
            Ok(()) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %id,
                    message_type = %call.message_type,
                    elapsed_ms,
                    "Settled pending call"
                );
                true
            }
            Err(_) => {
                // Caller stopped waiting between channel close and now.
                debug!(correlation_id = %id, "Pending call receiver dropped");
                false
            }
        }
    }

    /// Remove a call whose wait window elapsed. Its eventual response,
    /// if any, will be dropped by `complete`.
    pub fn expire(&self, id: &CorrelationId) -> bool {
        if self.calls.remove(id).is_some() {
            self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Reject every outstanding call with the given reason.
    ///
    /// Used by `terminate()` and on transport loss so no caller is ever
    /// left pending forever. Returns how many calls were rejected.
    pub fn drain(&self, reason: &ClientError) -> usize {
        let ids: Vec<CorrelationId> = self.calls.iter().map(|entry| *entry.key()).collect();
        let mut rejected = 0;
        for id in ids {
            if let Some((_, call)) = self.calls.remove(&id) {
                let _ = call.settle.send(Err(reason.clone()));
                rejected += 1;
            }
        }
        if rejected > 0 {
            self.stats
                .drained
                .fetch_add(rejected as u64, Ordering::Relaxed);
            warn!(rejected, reason = %reason, "Drained pending calls");
        }
        rejected
    }

    /// Number of calls currently pending.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Counters for observability.
    #[must_use]
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}
