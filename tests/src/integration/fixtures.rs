//! Shared stubs for integration scenarios: a controllable storage
//! estimator and a handful of canned handlers.

use async_trait::async_trait;
use ferry_client::WorkerClient;
use ferry_protocol::{CleanupReport, HandlerError, MessageType};
use ferry_worker::{
    handler_fn, RequestHandler, SetupContext, StorageError, StorageEstimate, StorageEstimator,
    WorkerConfig,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

/// Route crate logs to the test output. Opt in with RUST_LOG, e.g.
/// `RUST_LOG=ferry_worker=debug cargo test -p ferry-tests`.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Storage estimator whose usage reading can be changed mid-test.
pub struct StubEstimator {
    quota: u64,
    usage: AtomicU64,
    persistent: AtomicBool,
    grant_persistence: bool,
}

impl StubEstimator {
    pub fn new(quota: u64, usage: u64) -> Arc<Self> {
        Arc::new(Self {
            quota,
            usage: AtomicU64::new(usage),
            persistent: AtomicBool::new(false),
            grant_persistence: true,
        })
    }

    pub fn denying_persistence(quota: u64, usage: u64) -> Arc<Self> {
        Arc::new(Self {
            quota,
            usage: AtomicU64::new(usage),
            persistent: AtomicBool::new(false),
            grant_persistence: false,
        })
    }

    pub fn set_usage(&self, usage: u64) {
        self.usage.store(usage, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageEstimator for StubEstimator {
    async fn estimate(&self) -> Result<StorageEstimate, StorageError> {
        Ok(StorageEstimate {
            quota: self.quota,
            usage: self.usage.load(Ordering::SeqCst),
            persistent: self.persistent.load(Ordering::SeqCst),
        })
    }

    async fn request_persistent(&self) -> Result<bool, StorageError> {
        if self.grant_persistence {
            self.persistent.store(true, Ordering::SeqCst);
        }
        Ok(self.grant_persistence)
    }

    async fn cleanup(&self) -> Result<CleanupReport, StorageError> {
        let before = self.usage.load(Ordering::SeqCst);
        let freed = before / 2;
        self.usage.store(before - freed, Ordering::SeqCst);
        Ok(CleanupReport {
            bytes_freed: freed,
            items_removed: freed / 10,
        })
    }
}

/// Estimator standing in for a platform without the estimation primitive.
pub struct UnsupportedEstimator;

#[async_trait]
impl StorageEstimator for UnsupportedEstimator {
    async fn estimate(&self) -> Result<StorageEstimate, StorageError> {
        Err(StorageError::Unsupported)
    }

    async fn request_persistent(&self) -> Result<bool, StorageError> {
        Ok(false)
    }

    async fn cleanup(&self) -> Result<CleanupReport, StorageError> {
        Err(StorageError::Unsupported)
    }
}

/// Handler that echoes its payload back.
pub fn echo_handler() -> Arc<dyn RequestHandler> {
    handler_fn(|payload| async move { Ok(payload) })
}

/// Handler that sleeps before answering with the given tag.
pub fn sleepy_handler(delay: Duration, tag: &'static str) -> Arc<dyn RequestHandler> {
    handler_fn(move |_| async move {
        tokio::time::sleep(delay).await;
        Ok(serde_json::json!(tag))
    })
}

/// Handler that never resolves within any test's lifetime.
pub fn never_handler() -> Arc<dyn RequestHandler> {
    sleepy_handler(Duration::from_secs(3600), "never")
}

/// Handler that counts invocations before echoing.
pub fn spy_handler(calls: Arc<AtomicUsize>) -> Arc<dyn RequestHandler> {
    handler_fn(move |payload| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(payload)
        }
    })
}

/// Handler that always fails with a generic error.
pub fn failing_handler(message: &'static str) -> Arc<dyn RequestHandler> {
    handler_fn(move |_| async move { Err(HandlerError::new(message)) })
}

/// Spawn the worker with the given setup, without bootstrapping it.
pub fn spawned_client<F>(
    estimator: Arc<dyn StorageEstimator>,
    config: WorkerConfig,
    setup: F,
) -> WorkerClient
where
    F: FnMut(&SetupContext) -> Result<(), HandlerError> + Send + 'static,
{
    init_tracing();
    let client = WorkerClient::new();
    client
        .initialize(config, estimator, Box::new(setup))
        .expect("worker spawn failed");
    client
}

/// Spawn and bootstrap: the worker is `ready` when this returns.
pub async fn connected_client<F>(
    estimator: Arc<dyn StorageEstimator>,
    config: WorkerConfig,
    setup: F,
) -> WorkerClient
where
    F: FnMut(&SetupContext) -> Result<(), HandlerError> + Send + 'static,
{
    let client = spawned_client(estimator, config, setup);
    client
        .send(MessageType::CoreInitialize, serde_json::json!({}))
        .await
        .expect("bootstrap failed");
    client
}

/// Setup registering the standard chat/ai echo handlers.
pub fn chat_setup(ctx: &SetupContext) -> Result<(), HandlerError> {
    ctx.register(MessageType::ChatGetMessages, echo_handler())?;
    ctx.register(MessageType::ChatSendMessage, echo_handler())?;
    ctx.register(MessageType::AiChat, echo_handler())?;
    Ok(())
}
