//! Worker configuration with validation.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("channel capacity must be non-zero")]
    ZeroChannelCapacity,
    #[error("quota poll interval must be non-zero")]
    ZeroPollInterval,
    #[error("quota threshold {value} out of range (0, 100]")]
    ThresholdOutOfRange { value: f64 },
    #[error("warn threshold {warn} must be below critical threshold {critical}")]
    ThresholdOrder { warn: f64, critical: f64 },
}

/// Main worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Capacity of the request and response channels.
    pub channel_capacity: usize,
    /// Worker-side bound on handler execution. `None` leaves handlers
    /// unbounded unless their registration carries an override; the
    /// client keeps its own wait window either way.
    pub dispatch_timeout: Option<Duration>,
    /// Quota monitor policy.
    pub quota: QuotaConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            dispatch_timeout: None,
            quota: QuotaConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroChannelCapacity);
        }
        self.quota.validate()
    }
}

/// Quota monitor policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// How often the monitor polls the storage estimator.
    pub poll_interval: Duration,
    /// Usage percentage at which a `warning`-level event is raised.
    pub warn_percent: f64,
    /// Usage percentage above which a `critical`-level event is raised.
    pub critical_percent: f64,
    /// Minimum gap between two warnings of the same level.
    pub cooldown: Duration,
    /// Capacity of the warning broadcast channel.
    pub warning_capacity: usize,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5 * 60),
            warn_percent: 80.0,
            critical_percent: 95.0,
            cooldown: Duration::from_secs(5 * 60),
            warning_capacity: 16,
        }
    }
}

impl QuotaConfig {
    /// Validate quota policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        for value in [self.warn_percent, self.critical_percent] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(ConfigError::ThresholdOutOfRange { value });
            }
        }
        if self.warn_percent >= self.critical_percent {
            return Err(ConfigError::ThresholdOrder {
                warn: self.warn_percent,
                critical: self.critical_percent,
            });
        }
        Ok(())
    }
}
