//! Storage-quota monitor.
//!
//! Rides on top of the storage estimator port: measures usage, classifies
//! it against the warning thresholds and emits de-duplicated warnings on
//! a broadcast side channel. The monitor never deletes data; destructive
//! reclamation belongs to the storage engine behind the port.

use crate::config::QuotaConfig;
use async_trait::async_trait;
use chrono::Utc;
use ferry_protocol::{CleanupReport, ErrorCode, HandlerError, QuotaWarning, StorageState, WarningLevel};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// A live storage measurement from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageEstimate {
    /// Capacity ceiling in bytes.
    pub quota: u64,
    /// Bytes currently used.
    pub usage: u64,
    /// Whether the storage is already non-evictable.
    pub persistent: bool,
}

/// Errors from the storage boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The platform offers no estimation primitive.
    #[error("storage estimation is not supported on this platform")]
    Unsupported,
    /// The platform refused the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Any other failure inside the storage engine.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for HandlerError {
    fn from(err: StorageError) -> Self {
        let code = match &err {
            StorageError::Unsupported => ErrorCode::UnsupportedBrowser,
            StorageError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            StorageError::Backend(_) => ErrorCode::OperationFailed,
        };
        HandlerError::with_code(code, err.to_string())
    }
}

/// Boundary to the external storage engine.
///
/// The bridge requires only these three operations; everything else the
/// engine does is out of scope here.
#[async_trait]
pub trait StorageEstimator: Send + Sync {
    /// Measure quota and usage.
    async fn estimate(&self) -> Result<StorageEstimate, StorageError>;

    /// Ask the platform for non-evictable storage. Returns whether the
    /// upgrade was granted.
    async fn request_persistent(&self) -> Result<bool, StorageError>;

    /// Destructive reclamation. Returns what was freed.
    async fn cleanup(&self) -> Result<CleanupReport, StorageError>;
}

/// Polls storage usage and raises warnings.
///
/// Warnings are de-duplicated per level within the cool-down window, so
/// a reading that stays above a threshold across several polls produces
/// one event, not a storm.
pub struct QuotaMonitor {
    estimator: Arc<dyn StorageEstimator>,
    config: QuotaConfig,
    /// Session warning history, oldest first.
    warnings: RwLock<Vec<QuotaWarning>>,
    /// Last emission instant per level, for the cool-down window.
    last_emitted: Mutex<HashMap<WarningLevel, Instant>>,
    events: broadcast::Sender<QuotaWarning>,
}

impl QuotaMonitor {
    #[must_use]
    pub fn new(estimator: Arc<dyn StorageEstimator>, config: QuotaConfig) -> Self {
        let (events, _) = broadcast::channel(config.warning_capacity.max(1));
        Self {
            estimator,
            config,
            warnings: RwLock::new(Vec::new()),
            last_emitted: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to unsolicited quota warnings.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QuotaWarning> {
        self.events.subscribe()
    }

    /// The warning broadcast handle, for wiring further subscribers.
    #[must_use]
    pub fn events(&self) -> broadcast::Sender<QuotaWarning> {
        self.events.clone()
    }

    /// Measure the current storage state.
    ///
    /// Always recomputed from a live measurement. If the platform's
    /// estimation primitive is unavailable the state is well-formed with
    /// `quota == 0` rather than an error, so callers detect
    /// "unsupported" without a failure path.
    pub async fn state(&self) -> StorageState {
        let mut state = match self.estimator.estimate().await {
            Ok(estimate) => {
                StorageState::from_measurement(estimate.quota, estimate.usage, estimate.persistent)
            }
            Err(err) => {
                debug!(error = %err, "Storage estimation unavailable");
                StorageState::unavailable()
            }
        };
        state.warnings = self.warnings.read().clone();
        state
    }

    /// Ask the platform to upgrade to non-evictable storage.
    pub async fn request_persistent(&self) -> Result<bool, StorageError> {
        let granted = self.estimator.request_persistent().await?;
        info!(granted, "Requested persistent storage");
        Ok(granted)
    }

    /// Classify a usage percentage against the thresholds.
    #[must_use]
    pub fn classify(&self, percentage: f64) -> Option<WarningLevel> {
        if percentage > self.config.critical_percent {
            Some(WarningLevel::Critical)
        } else if percentage >= self.config.warn_percent {
            Some(WarningLevel::Warning)
        } else {
            None
        }
    }

    /// One poll step: measure, classify, maybe emit.
    ///
    /// Returns the warning if one was emitted.
    pub async fn observe(&self) -> Option<QuotaWarning> {
        let state = self.state().await;
        let level = self.classify(state.percentage)?;
        self.emit(level, state.percentage)
    }

    fn emit(&self, level: WarningLevel, percentage: f64) -> Option<QuotaWarning> {
        let now = Instant::now();
        {
            let mut last = self.last_emitted.lock();
            if let Some(previous) = last.get(&level) {
                if now.duration_since(*previous) < self.config.cooldown {
                    debug!(level = %level, percentage, "Quota warning suppressed by cool-down");
                    return None;
                }
            }
            last.insert(level, now);
        }

        let threshold_percent = match level {
            WarningLevel::Critical => self.config.critical_percent,
            _ => self.config.warn_percent,
        };
        let warning = QuotaWarning {
            level,
            message: format!("storage usage at {percentage:.1}% of quota"),
            threshold_percent,
            timestamp: Utc::now(),
        };

        self.warnings.write().push(warning.clone());
        // No receivers is fine; the history still records the warning.
        let _ = self.events.send(warning.clone());
        warn!(level = %level, percentage, "Quota warning emitted");
        Some(warning)
    }

    /// Periodic poll loop. Runs until `shutdown` completes.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    debug!("Quota monitor stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.observe().await;
                }
            }
        }
    }
}
