//! Sync controller configuration.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest accepted polling interval or fetch timeout.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for the sync controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Time between background polls
    pub interval: Duration,
    /// Upper bound on any single source call
    pub fetch_timeout: Duration,
    /// The view is stale once `now - last_updated > stale_factor * interval`
    pub stale_factor: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(crate::DEFAULT_INTERVAL_MS),
            fetch_timeout: Duration::from_millis(crate::DEFAULT_FETCH_TIMEOUT_MS),
            stale_factor: crate::DEFAULT_STALE_FACTOR,
        }
    }
}

impl SyncConfig {
    /// Create a configuration polling every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Set the polling interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the per-fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the staleness multiplier.
    pub fn with_stale_factor(mut self, factor: u32) -> Self {
        self.stale_factor = factor;
        self
    }

    /// Age beyond which the snapshot is considered stale.
    pub fn stale_after(&self) -> Duration {
        self.interval.saturating_mul(self.stale_factor)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(SyncError::config_error("interval must be greater than zero"));
        }
        if self.interval > MAX_DURATION {
            return Err(SyncError::config_error(format!(
                "interval must be at most {:?}",
                MAX_DURATION
            )));
        }
        if self.fetch_timeout.is_zero() {
            return Err(SyncError::config_error(
                "fetch_timeout must be greater than zero",
            ));
        }
        if self.fetch_timeout > MAX_DURATION {
            return Err(SyncError::config_error(format!(
                "fetch_timeout must be at most {:?}",
                MAX_DURATION
            )));
        }
        if self.stale_factor < 1 {
            return Err(SyncError::config_error("stale_factor must be >= 1"));
        }
        Ok(())
    }
}
