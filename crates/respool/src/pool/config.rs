//! Pool configuration types

use std::path::Path;
use std::time::Duration;

use respool_core::{ConfigValidationError, PoolError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a connection pool
///
/// Controls pool sizing, acquisition bounds and background maintenance.
/// Durations are stored in milliseconds; `max_wait_time_ms` and
/// `max_retry_count` accept `-1` for "unbounded".
///
/// A config is checked once, by [`PoolConfig::validate`], when a pool is
/// built from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Hard ceiling on free + checked-out connections
    max_connections: usize,
    /// Connections opened eagerly and kept as the replenishment target
    init_connections: usize,
    /// Ceiling for idle connections kept after trimming
    max_idle_connections: usize,
    /// Interval after which excess idle connections are trimmed
    max_idle_time_ms: i64,
    /// How long a blocked acquisition may wait, -1 for unbounded
    max_wait_time_ms: i64,
    /// Retries a blocked acquisition may make after its first attempt, -1
    /// for unbounded
    max_retry_count: i64,
    /// Interval between keep-alive sweeps of idle connections
    keep_alive_interval_ms: i64,
    /// Tick of the background maintenance loop
    maintenance_interval_ms: i64,
}

impl PoolConfig {
    /// Create a pool configuration with the given capacity and defaults for
    /// everything else
    ///
    /// `init_connections` and `max_idle_connections` are clamped to
    /// `max_connections`.
    pub fn new(max_connections: usize) -> Self {
        let defaults = Self::default();
        Self {
            max_connections,
            init_connections: defaults.init_connections.min(max_connections),
            max_idle_connections: defaults.max_idle_connections.min(max_connections),
            ..defaults
        }
    }

    /// Parse a configuration from TOML
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| PoolError::Settings(e.to_string()))
    }

    /// Load a configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = ?path, "pool configuration loaded");
        Ok(config)
    }

    /// Serialize the configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PoolError::Settings(e.to_string()))
    }

    /// Check every invariant, returning the first one violated
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.max_connections == 0 {
            return Err(ConfigValidationError::ZeroMaxConnections);
        }
        if self.init_connections > self.max_connections {
            return Err(ConfigValidationError::InitExceedsMax {
                init: self.init_connections,
                max: self.max_connections,
            });
        }
        if self.max_idle_connections > self.max_connections {
            return Err(ConfigValidationError::IdleExceedsMax {
                idle: self.max_idle_connections,
                max: self.max_connections,
            });
        }
        if self.max_idle_time_ms <= 0 {
            return Err(ConfigValidationError::NonPositiveIdleTime(
                self.max_idle_time_ms,
            ));
        }
        if self.max_wait_time_ms < -1 {
            return Err(ConfigValidationError::InvalidWaitTime(self.max_wait_time_ms));
        }
        if self.max_retry_count < -1 {
            return Err(ConfigValidationError::InvalidRetryCount(self.max_retry_count));
        }
        if self.keep_alive_interval_ms <= 0 {
            return Err(ConfigValidationError::NonPositiveKeepAlive(
                self.keep_alive_interval_ms,
            ));
        }
        if self.maintenance_interval_ms <= 0 {
            return Err(ConfigValidationError::NonPositiveMaintenanceInterval(
                self.maintenance_interval_ms,
            ));
        }
        Ok(())
    }

    /// Set the capacity
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the number of eagerly created connections
    pub fn with_init_connections(mut self, init: usize) -> Self {
        self.init_connections = init;
        self
    }

    /// Set the idle ceiling
    pub fn with_max_idle_connections(mut self, idle: usize) -> Self {
        self.max_idle_connections = idle;
        self
    }

    /// Set the idle trimming interval in milliseconds
    pub fn with_max_idle_time_ms(mut self, idle_ms: i64) -> Self {
        self.max_idle_time_ms = idle_ms;
        self
    }

    /// Set the acquisition wait bound in milliseconds (-1 for unbounded)
    pub fn with_max_wait_time_ms(mut self, wait_ms: i64) -> Self {
        self.max_wait_time_ms = wait_ms;
        self
    }

    /// Set the acquisition retry bound (-1 for unbounded)
    pub fn with_max_retry_count(mut self, retries: i64) -> Self {
        self.max_retry_count = retries;
        self
    }

    /// Set the keep-alive interval in milliseconds
    pub fn with_keep_alive_interval_ms(mut self, interval_ms: i64) -> Self {
        self.keep_alive_interval_ms = interval_ms;
        self
    }

    /// Set the maintenance tick in milliseconds
    pub fn with_maintenance_interval_ms(mut self, interval_ms: i64) -> Self {
        self.maintenance_interval_ms = interval_ms;
        self
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn init_connections(&self) -> usize {
        self.init_connections
    }

    pub fn max_idle_connections(&self) -> usize {
        self.max_idle_connections
    }

    pub fn max_idle_time(&self) -> Duration {
        millis(self.max_idle_time_ms)
    }

    /// Acquisition wait bound, `None` when unbounded
    pub fn max_wait_time(&self) -> Option<Duration> {
        (self.max_wait_time_ms >= 0).then(|| millis(self.max_wait_time_ms))
    }

    /// Acquisition retry bound, `None` when unbounded
    pub fn max_retry_count(&self) -> Option<u64> {
        u64::try_from(self.max_retry_count).ok()
    }

    pub fn keep_alive_interval(&self) -> Duration {
        millis(self.keep_alive_interval_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        millis(self.maintenance_interval_ms)
    }
}

impl Default for PoolConfig {
    /// Defaults:
    /// - max_connections: 10
    /// - init_connections: 1
    /// - max_idle_connections: 5
    /// - max_idle_time: 10 minutes
    /// - max_wait_time: 30 seconds
    /// - max_retry_count: unbounded
    /// - keep_alive_interval: 30 seconds
    /// - maintenance_interval: 1 second
    fn default() -> Self {
        Self {
            max_connections: 10,
            init_connections: 1,
            max_idle_connections: 5,
            max_idle_time_ms: 600_000,
            max_wait_time_ms: 30_000,
            max_retry_count: -1,
            keep_alive_interval_ms: 30_000,
            maintenance_interval_ms: 1_000,
        }
    }
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}
