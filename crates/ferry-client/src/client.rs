//! The client correlator.

use crate::error::ClientError;
use crate::pending::PendingCallStore;
use bytes::Bytes;
use ferry_protocol::{MessageType, QuotaWarning, RequestEnvelope, ResponseEnvelope};
use ferry_worker::{StorageEstimator, Worker, WorkerConfig, WorkerError, WorkerSetup};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default wait window for a call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

struct Connection {
    request_tx: mpsc::Sender<RequestEnvelope>,
    warnings: broadcast::Sender<QuotaWarning>,
    worker: JoinHandle<()>,
    listener: JoinHandle<()>,
}

/// Issues requests into the worker context and correlates responses.
///
/// All operations are non-blocking at the call site; `send` suspends the
/// caller until its own response arrives or its window elapses, while
/// other calls proceed independently.
pub struct WorkerClient {
    connection: RwLock<Option<Connection>>,
    pending: Arc<PendingCallStore>,
    terminated: Arc<AtomicBool>,
    default_timeout: Duration,
}

impl Default for WorkerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with a non-default wait window.
    #[must_use]
    pub fn with_timeout(default_timeout: Duration) -> Self {
        Self {
            connection: RwLock::new(None),
            pending: Arc::new(PendingCallStore::new()),
            terminated: Arc::new(AtomicBool::new(false)),
            default_timeout,
        }
    }

    /// Create the worker context. Exactly once: a second call is a
    /// no-op with a logged warning.
    pub fn initialize(
        &self,
        config: WorkerConfig,
        estimator: Arc<dyn StorageEstimator>,
        setup: Box<dyn WorkerSetup>,
    ) -> Result<(), WorkerError> {
        let mut guard = self.connection.write();
        if guard.is_some() {
            warn!("initialize() called on an already-initialized client; ignoring");
            return Ok(());
        }

        let handle = Worker::spawn(config, estimator, setup)?;
        self.terminated.store(false, Ordering::SeqCst);

        let listener = tokio::spawn(listen(
            handle.response_rx,
            Arc::clone(&self.pending),
            Arc::clone(&self.terminated),
        ));

        *guard = Some(Connection {
            request_tx: handle.request_tx,
            warnings: handle.warnings,
            worker: handle.join,
            listener,
        });
        info!("Worker context created");
        Ok(())
    }

    /// Send a request and await its response, with the default window.
    pub async fn send(
        &self,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        self.send_inner(message_type, payload, Vec::new(), self.default_timeout)
            .await
    }

    /// Send with a per-call wait window.
    pub async fn send_with_timeout(
        &self,
        message_type: MessageType,
        payload: serde_json::Value,
        window: Duration,
    ) -> Result<serde_json::Value, ClientError> {
        self.send_inner(message_type, payload, Vec::new(), window)
            .await
    }

    /// Send with transferable buffers, moved (not copied) into the
    /// worker context.
    pub async fn send_transfer(
        &self,
        message_type: MessageType,
        payload: serde_json::Value,
        transferables: Vec<Bytes>,
    ) -> Result<serde_json::Value, ClientError> {
        self.send_inner(message_type, payload, transferables, self.default_timeout)
            .await
    }

    async fn send_inner(
        &self,
        message_type: MessageType,
        payload: serde_json::Value,
        transferables: Vec<Bytes>,
        window: Duration,
    ) -> Result<serde_json::Value, ClientError> {
        let request_tx = {
            let guard = self.connection.read();
            match guard.as_ref() {
                Some(connection) => connection.request_tx.clone(),
                None if self.terminated.load(Ordering::SeqCst) => {
                    return Err(ClientError::Terminated)
                }
                None => return Err(ClientError::NotInitialized),
            }
        };

        let (id, settled) = self.pending.register(message_type.clone());
        let envelope = RequestEnvelope::with_id(id, message_type.clone(), payload)
            .with_transferables(transferables);

        if request_tx.send(envelope).await.is_err() {
            self.pending.expire(&id);
            return Err(self.transport_error());
        }
        debug!(correlation_id = %id, message_type = %message_type, "Posted request");

        match tokio::time::timeout(window, settled).await {
            Ok(Ok(result)) => result,
            // Settle channel dropped without a verdict: the store was
            // torn down around us.
            Ok(Err(_)) => Err(self.transport_error()),
            Err(_) => {
                self.pending.expire(&id);
                debug!(
                    correlation_id = %id,
                    message_type = %message_type,
                    window_ms = window.as_millis(),
                    "Call timed out; any late response will be discarded"
                );
                Err(ClientError::Timeout { window })
            }
        }
    }

    /// Subscribe to unsolicited quota warnings from the worker.
    pub fn quota_warnings(&self) -> Result<broadcast::Receiver<QuotaWarning>, ClientError> {
        let guard = self.connection.read();
        guard
            .as_ref()
            .map(|connection| connection.warnings.subscribe())
            .ok_or(ClientError::NotInitialized)
    }

    /// Destroy the worker context and reject every outstanding call.
    /// Idempotent.
    pub fn terminate(&self) {
        let connection = self.connection.write().take();
        let Some(connection) = connection else {
            debug!("terminate() on a client with no worker; nothing to do");
            return;
        };

        self.terminated.store(true, Ordering::SeqCst);
        connection.worker.abort();
        connection.listener.abort();
        let rejected = self.pending.drain(&ClientError::Terminated);
        info!(rejected, "Worker terminated");
    }

    /// Number of calls currently awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn transport_error(&self) -> ClientError {
        if self.terminated.load(Ordering::SeqCst) {
            ClientError::Terminated
        } else {
            ClientError::ConnectionLost
        }
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Response listener: matches envelopes against the pending table.
///
/// When the channel closes without `terminate()` having run, meaning the
/// worker context crashed or ended, every pending call is rejected
/// rather than left hanging.
async fn listen(
    mut response_rx: mpsc::Receiver<ResponseEnvelope>,
    pending: Arc<PendingCallStore>,
    terminated: Arc<AtomicBool>,
) {
    while let Some(response) = response_rx.recv().await {
        pending.complete(response);
    }

    let reason = if terminated.load(Ordering::SeqCst) {
        ClientError::Terminated
    } else {
        ClientError::ConnectionLost
    };
    let rejected = pending.drain(&reason);
    if rejected > 0 {
        warn!(rejected, "Response channel closed with calls outstanding");
    } else {
        debug!("Response channel closed");
    }
}
