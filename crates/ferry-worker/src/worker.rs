//! Worker entry point: owns every stateful component and serves the
//! request loop.
//!
//! The main context talks to the worker only through the channel pair in
//! [`WorkerHandle`]. Requests are dispatched one task each, so a slow
//! handler never blocks the ones behind it; responses therefore arrive
//! in completion order, not send order, and the client's correlation ids
//! are what keep that safe.

use crate::config::{ConfigError, WorkerConfig};
use crate::lifecycle::Lifecycle;
use crate::quota::{QuotaMonitor, StorageEstimator};
use crate::registry::{handler_fn, HandlerRegistry, RegisterOptions, RegistryError, RequestHandler};
use crate::router::Router;
use async_trait::async_trait;
use ferry_protocol::{
    ErrorCode, ErrorValue, HandlerError, MessageType, PersistenceGrant, QuotaWarning,
    RequestEnvelope, ResponseEnvelope,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Errors from worker construction.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Channel endpoints and task handle for a spawned worker.
pub struct WorkerHandle {
    /// Post request envelopes here.
    pub request_tx: mpsc::Sender<RequestEnvelope>,
    /// Response envelopes arrive here, in completion order.
    pub response_rx: mpsc::Receiver<ResponseEnvelope>,
    /// Unsolicited quota warnings; subscribe as often as needed.
    pub warnings: broadcast::Sender<QuotaWarning>,
    /// The worker task itself. Aborting it destroys the context.
    pub join: JoinHandle<()>,
}

/// Domain setup run while the lifecycle is `initializing`.
///
/// This is where business handlers register and the storage engine
/// opens. Failures flip the lifecycle to `error` and the bootstrap
/// request is answered with the failure.
#[async_trait]
pub trait WorkerSetup: Send + 'static {
    async fn initialize(&mut self, ctx: &SetupContext) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F> WorkerSetup for F
where
    F: FnMut(&SetupContext) -> Result<(), HandlerError> + Send + 'static,
{
    async fn initialize(&mut self, ctx: &SetupContext) -> Result<(), HandlerError> {
        (self)(ctx)
    }
}

/// Registration and progress surface handed to [`WorkerSetup`].
pub struct SetupContext {
    registry: Arc<HandlerRegistry>,
    lifecycle: Arc<Lifecycle>,
}

impl SetupContext {
    /// Register a business handler.
    pub fn register(
        &self,
        message_type: MessageType,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), RegistryError> {
        self.registry.register(message_type, handler)
    }

    /// Register a business handler with options.
    pub fn register_with(
        &self,
        message_type: MessageType,
        handler: Arc<dyn RequestHandler>,
        options: RegisterOptions,
    ) -> Result<(), RegistryError> {
        self.registry.register_with(message_type, handler, options)
    }

    /// Report setup progress (0-100).
    pub fn report_progress(&self, progress: u8, message: impl Into<String>) {
        if let Err(err) = self.lifecycle.set_progress(progress, message) {
            warn!(error = %err, "Ignoring out-of-phase progress report");
        }
    }
}

/// The background execution context.
pub struct Worker {
    registry: Arc<HandlerRegistry>,
    lifecycle: Arc<Lifecycle>,
    monitor: Arc<QuotaMonitor>,
    router: Router,
    setup: Option<Box<dyn WorkerSetup>>,
    request_rx: mpsc::Receiver<RequestEnvelope>,
    response_tx: mpsc::Sender<ResponseEnvelope>,
}

impl Worker {
    /// Build the worker's component graph and spawn its task.
    ///
    /// All stateful components (registry, lifecycle, quota monitor) are
    /// constructed here as explicit instances and shared by `Arc`;
    /// nothing is registered through global state.
    pub fn spawn(
        config: WorkerConfig,
        estimator: Arc<dyn StorageEstimator>,
        setup: Box<dyn WorkerSetup>,
    ) -> Result<WorkerHandle, WorkerError> {
        config.validate()?;

        let (request_tx, request_rx) = mpsc::channel(config.channel_capacity);
        let (response_tx, response_rx) = mpsc::channel(config.channel_capacity);

        let registry = Arc::new(HandlerRegistry::new());
        let lifecycle = Arc::new(Lifecycle::new());
        let monitor = Arc::new(QuotaMonitor::new(
            Arc::clone(&estimator),
            config.quota.clone(),
        ));
        let warnings = monitor.events();

        register_builtins(&registry, &lifecycle, &monitor, &estimator)?;

        let router = Router::new(
            Arc::clone(&registry),
            Arc::clone(&lifecycle),
            config.dispatch_timeout,
        );

        let worker = Worker {
            registry,
            lifecycle,
            monitor,
            router,
            setup: Some(setup),
            request_rx,
            response_tx,
        };
        let join = tokio::spawn(worker.run());

        Ok(WorkerHandle {
            request_tx,
            response_rx,
            warnings,
            join,
        })
    }

    async fn run(mut self) {
        if let Err(err) = self.lifecycle.begin_loading() {
            warn!(error = %err, "Worker started with unexpected lifecycle state");
        }
        info!("Worker context up, awaiting bootstrap");

        // Dispatch tasks live in this set so destroying the worker task
        // also aborts every in-flight dispatch. A detached spawn would
        // keep running, and keep producing side effects, after
        // termination.
        let mut dispatches = tokio::task::JoinSet::new();
        loop {
            tokio::select! {
                request = self.request_rx.recv() => {
                    let Some(request) = request else { break };

                    if request.message_type == MessageType::CoreInitialize {
                        // Bootstrap mutates the lifecycle that gates
                        // everything else, so it runs inline rather than
                        // concurrently.
                        let response = self.handle_initialize(request).await;
                        if self.response_tx.send(response).await.is_err() {
                            debug!("Main context gone, dropping bootstrap response");
                        }
                        continue;
                    }

                    let router = self.router.clone();
                    let response_tx = self.response_tx.clone();
                    dispatches.spawn(async move {
                        let response = router.dispatch(request).await;
                        if response_tx.send(response).await.is_err() {
                            debug!("Main context gone, dropping response");
                        }
                    });
                }
                // Reap finished dispatches so the set stays bounded.
                Some(_) = dispatches.join_next() => {}
            }
        }
        debug!("Request channel closed, worker loop ending");
    }

    async fn handle_initialize(&mut self, request: RequestEnvelope) -> ResponseEnvelope {
        let id = request.id;

        if self.lifecycle.is_ready() {
            warn!("core:initialize received after ready; treating as no-op");
            return self.status_response(id);
        }

        if let Err(err) = self.lifecycle.begin_initializing() {
            return ResponseEnvelope::fail(
                id,
                ErrorValue::new(
                    ErrorCode::OperationFailed,
                    format!("cannot initialize: {err}"),
                ),
            );
        }

        // The setup is consumed on first use; reaching here twice means
        // a previous attempt failed and the lifecycle is already in a
        // terminal phase, which the transition above rejects.
        let Some(mut setup) = self.setup.take() else {
            return ResponseEnvelope::fail(
                id,
                ErrorValue::new(ErrorCode::OperationFailed, "worker setup already consumed"),
            );
        };

        let ctx = SetupContext {
            registry: Arc::clone(&self.registry),
            lifecycle: Arc::clone(&self.lifecycle),
        };
        match setup.initialize(&ctx).await {
            Ok(()) => {
                if let Err(err) = self.lifecycle.mark_ready() {
                    return ResponseEnvelope::fail(
                        id,
                        ErrorValue::new(ErrorCode::OperationFailed, err.to_string()),
                    );
                }
                self.spawn_quota_loop();
                info!(handlers = self.registry.len(), "Worker initialized");
                self.status_response(id)
            }
            Err(handler_error) => {
                let cause: ErrorValue = handler_error.into();
                if let Err(err) = self.lifecycle.fail(cause.clone()) {
                    warn!(error = %err, "Could not record setup failure in lifecycle");
                }
                ResponseEnvelope::fail(id, cause)
            }
        }
    }

    fn status_response(&self, id: ferry_protocol::CorrelationId) -> ResponseEnvelope {
        match serde_json::to_value(self.lifecycle.snapshot()) {
            Ok(status) => ResponseEnvelope::ok(id, status),
            Err(err) => ResponseEnvelope::fail(
                id,
                ErrorValue::new(ErrorCode::OperationFailed, err.to_string()),
            ),
        }
    }

    /// Start the periodic quota poll once storage is open. The loop
    /// stops when the main context drops its response receiver.
    fn spawn_quota_loop(&self) {
        let monitor = Arc::clone(&self.monitor);
        let response_tx = self.response_tx.clone();
        tokio::spawn(async move {
            monitor.run(response_tx.closed()).await;
        });
    }
}

/// Built-in handlers every worker carries: status polling and the
/// storage operations.
fn register_builtins(
    registry: &Arc<HandlerRegistry>,
    lifecycle: &Arc<Lifecycle>,
    monitor: &Arc<QuotaMonitor>,
    estimator: &Arc<dyn StorageEstimator>,
) -> Result<(), RegistryError> {
    let status_lifecycle = Arc::clone(lifecycle);
    registry.register(
        MessageType::CoreGetStatus,
        handler_fn(move |_| {
            let lifecycle = Arc::clone(&status_lifecycle);
            async move { serde_json::to_value(lifecycle.snapshot()).map_err(HandlerError::from) }
        }),
    )?;

    let quota_monitor = Arc::clone(monitor);
    registry.register(
        MessageType::StorageGetQuota,
        handler_fn(move |_| {
            let monitor = Arc::clone(&quota_monitor);
            async move { serde_json::to_value(monitor.state().await).map_err(HandlerError::from) }
        }),
    )?;

    let persist_monitor = Arc::clone(monitor);
    registry.register(
        MessageType::StorageRequestPersistent,
        handler_fn(move |_| {
            let monitor = Arc::clone(&persist_monitor);
            async move {
                let granted = monitor.request_persistent().await?;
                serde_json::to_value(PersistenceGrant { granted }).map_err(HandlerError::from)
            }
        }),
    )?;

    let cleanup_estimator = Arc::clone(estimator);
    registry.register(
        MessageType::StorageCleanup,
        handler_fn(move |_| {
            let estimator = Arc::clone(&cleanup_estimator);
            async move {
                let report = estimator.cleanup().await?;
                serde_json::to_value(report).map_err(HandlerError::from)
            }
        }),
    )?;

    Ok(())
}
