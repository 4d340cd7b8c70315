//! Initialization lifecycle for the worker context.
//!
//! Phases move monotonically forward, `not-started → loading →
//! initializing → ready`, except the transition into `error`, which is
//! reachable from any non-terminal phase. `ready` and `error` are
//! terminal. The router consults only "is the phase `ready`" to gate
//! dispatch; progress is informational.

use chrono::{DateTime, Utc};
use ferry_protocol::ErrorValue;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info};

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitPhase {
    #[serde(rename = "not-started")]
    NotStarted,
    #[serde(rename = "loading")]
    Loading,
    #[serde(rename = "initializing")]
    Initializing,
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "error")]
    Error,
}

impl InitPhase {
    /// Terminal phases admit no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }
}

impl fmt::Display for InitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not-started",
            Self::Loading => "loading",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Errors from lifecycle transitions.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LifecycleError {
    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: InitPhase, to: InitPhase },
    #[error("progress {value} out of range 0-100")]
    ProgressOutOfRange { value: u8 },
}

/// Snapshot of the initialization state, served by `core:getStatus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitState {
    pub phase: InitPhase,
    /// 0-100, only meaningful while `initializing`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Human-readable status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Present iff phase is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
}

/// The initialization state machine.
pub struct Lifecycle {
    state: RwLock<InitState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(InitState {
                phase: InitPhase::NotStarted,
                progress: None,
                message: None,
                error: None,
                started_at: None,
                ready_at: None,
            }),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> InitPhase {
        self.state.read().phase
    }

    /// Whether dispatch may proceed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase() == InitPhase::Ready
    }

    /// Snapshot the full state.
    #[must_use]
    pub fn snapshot(&self) -> InitState {
        self.state.read().clone()
    }

    /// The worker has begun bootstrapping its runtime dependencies.
    pub fn begin_loading(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.write();
        if state.phase != InitPhase::NotStarted {
            return Err(LifecycleError::InvalidTransition {
                from: state.phase,
                to: InitPhase::Loading,
            });
        }
        state.phase = InitPhase::Loading;
        state.started_at = Some(Utc::now());
        state.message = Some("loading runtime".to_string());
        debug!("Lifecycle: not-started -> loading");
        Ok(())
    }

    /// Runtime is loaded; domain-specific setup starts.
    pub fn begin_initializing(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.write();
        if state.phase != InitPhase::Loading {
            return Err(LifecycleError::InvalidTransition {
                from: state.phase,
                to: InitPhase::Initializing,
            });
        }
        state.phase = InitPhase::Initializing;
        state.progress = Some(0);
        state.message = Some("initializing".to_string());
        debug!("Lifecycle: loading -> initializing");
        Ok(())
    }

    /// Report setup progress. Only meaningful while `initializing`.
    pub fn set_progress(
        &self,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<(), LifecycleError> {
        if progress > 100 {
            return Err(LifecycleError::ProgressOutOfRange { value: progress });
        }
        let mut state = self.state.write();
        if state.phase != InitPhase::Initializing {
            return Err(LifecycleError::InvalidTransition {
                from: state.phase,
                to: InitPhase::Initializing,
            });
        }
        state.progress = Some(progress);
        state.message = Some(message.into());
        Ok(())
    }

    /// All domain setup completed without error.
    pub fn mark_ready(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.write();
        if state.phase != InitPhase::Initializing {
            return Err(LifecycleError::InvalidTransition {
                from: state.phase,
                to: InitPhase::Ready,
            });
        }
        state.phase = InitPhase::Ready;
        state.progress = Some(100);
        state.message = Some("ready".to_string());
        state.ready_at = Some(Utc::now());
        info!("Lifecycle: initializing -> ready");
        Ok(())
    }

    /// Capture a failure and halt further progress. Reachable from any
    /// non-terminal phase.
    pub fn fail(&self, cause: ErrorValue) -> Result<(), LifecycleError> {
        let mut state = self.state.write();
        if state.phase.is_terminal() {
            return Err(LifecycleError::InvalidTransition {
                from: state.phase,
                to: InitPhase::Error,
            });
        }
        error!(code = %cause.code, message = %cause.message, "Lifecycle: {} -> error", state.phase);
        state.phase = InitPhase::Error;
        state.message = Some(cause.message.clone());
        state.error = Some(cause);
        state.progress = None;
        Ok(())
    }
}
