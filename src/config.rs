//! Guard configuration with builder-style construction and validation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::duration_millis;

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field failed validation.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// What was wrong with the configuration.
        message: String,
    },
}

/// Result type for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// What happens when a new label combination is denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitAction {
    /// Emit a warning but let the recording proceed. Never blocks a metric.
    Log,
    /// Silently block the recording. No circuit-breaker escalation.
    Drop,
    /// Block the recording and count the denial toward tripping the
    /// metric's circuit breaker.
    CircuitBreak,
}

/// Limits and behavior of a [`crate::CardinalityGuard`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Maximum number of distinct label combinations tracked per metric.
    pub max_labels_per_metric: usize,
    /// Maximum number of distinct values tracked per individual label key.
    pub max_values_per_label: usize,
    /// Fraction of `max_labels_per_metric` at which new combinations start
    /// producing [`crate::Verdict::Warn`]. Must be in `(0, 1]`.
    pub warn_threshold_ratio: f64,
    /// Side effect applied to denied combinations.
    pub action: LimitAction,
    /// Denials accumulated while CLOSED before the breaker opens. Only
    /// meaningful with [`LimitAction::CircuitBreak`].
    pub failure_threshold: u32,
    /// How long an OPEN breaker suspends a metric before probing recovery.
    #[serde(with = "duration_millis")]
    pub open_duration: Duration,
    /// Violation-free time in HALF_OPEN required to close the breaker again.
    #[serde(with = "duration_millis")]
    pub half_open_duration: Duration,
    /// When `false`, every recording attempt is allowed and nothing is
    /// tracked.
    pub enforcement_enabled: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_labels_per_metric: 1000,
            max_values_per_label: 100,
            warn_threshold_ratio: 0.8,
            action: LimitAction::Log,
            failure_threshold: 5,
            open_duration: Duration::from_secs(5 * 60),
            half_open_duration: Duration::from_secs(60),
            enforcement_enabled: true,
        }
    }
}

impl GuardConfig {
    /// Create a configuration builder.
    pub fn builder() -> GuardConfigBuilder {
        GuardConfigBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_labels_per_metric == 0 {
            return Err(ConfigError::Invalid {
                message: "max_labels_per_metric must be greater than 0".to_string(),
            });
        }

        if self.max_values_per_label == 0 {
            return Err(ConfigError::Invalid {
                message: "max_values_per_label must be greater than 0".to_string(),
            });
        }

        if !(self.warn_threshold_ratio > 0.0 && self.warn_threshold_ratio <= 1.0) {
            return Err(ConfigError::Invalid {
                message: "warn_threshold_ratio must be in (0, 1]".to_string(),
            });
        }

        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Combination count at which new combinations start to warn.
    pub(crate) fn warn_limit(&self) -> usize {
        ((self.max_labels_per_metric as f64) * self.warn_threshold_ratio).ceil() as usize
    }
}

/// Builder for [`GuardConfig`].
#[derive(Debug, Default)]
pub struct GuardConfigBuilder {
    config: GuardConfig,
}

impl GuardConfigBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self { config: GuardConfig::default() }
    }

    /// Set the per-metric combination limit.
    pub fn max_labels_per_metric(mut self, limit: usize) -> Self {
        self.config.max_labels_per_metric = limit;
        self
    }

    /// Set the per-label distinct-value limit.
    pub fn max_values_per_label(mut self, limit: usize) -> Self {
        self.config.max_values_per_label = limit;
        self
    }

    /// Set the warn-threshold ratio.
    pub fn warn_threshold_ratio(mut self, ratio: f64) -> Self {
        self.config.warn_threshold_ratio = ratio;
        self
    }

    /// Set the denial side effect.
    pub fn action(mut self, action: LimitAction) -> Self {
        self.config.action = action;
        self
    }

    /// Set the breaker failure threshold.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set the OPEN suspension window.
    pub fn open_duration(mut self, duration: Duration) -> Self {
        self.config.open_duration = duration;
        self
    }

    /// Set the HALF_OPEN probation window.
    pub fn half_open_duration(mut self, duration: Duration) -> Self {
        self.config.half_open_duration = duration;
        self
    }

    /// Enable or disable enforcement entirely.
    pub fn enforcement_enabled(mut self, enabled: bool) -> Self {
        self.config.enforcement_enabled = enabled;
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> ConfigResult<GuardConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
