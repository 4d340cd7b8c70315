//! Typed payloads for the `storage:*` operations and quota warnings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a quota warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for WarningLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A single quota warning emitted by the monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotaWarning {
    /// Severity level.
    pub level: WarningLevel,
    /// Human-readable message.
    pub message: String,
    /// The threshold (percent of quota) that was crossed.
    pub threshold_percent: f64,
    /// When the warning was raised.
    pub timestamp: DateTime<Utc>,
}

/// Live storage measurement plus the session's warning history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageState {
    /// Capacity ceiling granted by the platform, in bytes.
    pub quota: u64,
    /// Bytes currently used.
    pub usage: u64,
    /// `usage / quota`, as a percentage. Zero when quota is unknown.
    pub percentage: f64,
    /// `quota - usage`, saturating.
    pub available: u64,
    /// Whether the storage has been upgraded to non-evictable mode.
    pub persistent: bool,
    /// Warnings raised this session, oldest first.
    pub warnings: Vec<QuotaWarning>,
}

impl StorageState {
    /// Compute a state from a live measurement.
    #[must_use]
    pub fn from_measurement(quota: u64, usage: u64, persistent: bool) -> Self {
        let percentage = if quota == 0 {
            0.0
        } else {
            (usage as f64 / quota as f64) * 100.0
        };
        Self {
            quota,
            usage,
            percentage,
            available: quota.saturating_sub(usage),
            persistent,
            warnings: Vec::new(),
        }
    }

    /// The well-formed state returned when the platform's estimation
    /// primitive is unavailable. Callers detect "unsupported" by
    /// checking `quota == 0` rather than catching an error.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::from_measurement(0, 0, false)
    }
}

/// Result of asking the platform for non-evictable storage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistenceGrant {
    /// Whether the upgrade was granted.
    pub granted: bool,
}

/// Result of a destructive storage reclamation pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupReport {
    /// Bytes reclaimed.
    pub bytes_freed: u64,
    /// Items deleted.
    pub items_removed: u64,
}
