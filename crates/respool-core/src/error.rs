//! Error types for respool

use std::fmt;

use thiserror::Error;

/// A violated pool configuration invariant
///
/// Returned by `PoolConfig::validate` and fatal for pool construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("max_connections must be greater than 0")]
    ZeroMaxConnections,

    #[error("init_connections ({init}) cannot exceed max_connections ({max})")]
    InitExceedsMax { init: usize, max: usize },

    #[error("max_idle_connections ({idle}) cannot exceed max_connections ({max})")]
    IdleExceedsMax { idle: usize, max: usize },

    #[error("max_idle_time must be greater than 0, got {0}ms")]
    NonPositiveIdleTime(i64),

    #[error("keep_alive_interval must be greater than 0, got {0}ms")]
    NonPositiveKeepAlive(i64),

    #[error("maintenance_interval must be greater than 0, got {0}ms")]
    NonPositiveMaintenanceInterval(i64),

    #[error("max_wait_time must be -1 (unbounded) or at least 0, got {0}ms")]
    InvalidWaitTime(i64),

    #[error("max_retry_count must be -1 (unbounded) or at least 0, got {0}")]
    InvalidRetryCount(i64),
}

/// Core error type for pool operations
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    Config(#[from] ConfigValidationError),

    #[error("Pool exhausted: {in_use} of {max} connections in use")]
    Exhausted { in_use: usize, max: usize },

    #[error("Pool closed")]
    Closed,

    #[error("Connection failed validation")]
    ConnectionInvalid,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Global pool is not initialized")]
    NotInitialized,

    #[error("Global pool is already initialized")]
    AlreadyInitialized,

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl PoolError {
    /// Whether a later attempt may succeed without any change to the pool.
    ///
    /// Only exhaustion is retryable. A closed pool stays closed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::Exhausted { .. })
    }

    /// Whether the pool this error came from has been closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, PoolError::Closed)
    }
}

/// Every individual failure of a batch operation
///
/// Bulk `supply`, `release` and keep-alive sweeps keep going after a failed
/// item and report all of them at the end through this type.
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<PoolError>,
}

impl AggregateError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure. Nested aggregates are flattened.
    pub fn push(&mut self, error: PoolError) {
        match error {
            PoolError::Aggregate(nested) => self.errors.extend(nested.errors),
            other => self.errors.push(other),
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[PoolError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<PoolError> {
        self.errors
    }

    /// `Ok(())` when nothing failed, otherwise `PoolError::Aggregate`.
    pub fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(PoolError::Aggregate(self))
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred", self.errors.len())?;
        for (i, error) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

impl Extend<PoolError> for AggregateError {
    fn extend<I: IntoIterator<Item = PoolError>>(&mut self, iter: I) {
        for error in iter {
            self.push(error);
        }
    }
}

/// Result type alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_empty_is_ok() {
        assert!(AggregateError::new().into_result().is_ok());
    }

    #[test]
    fn test_aggregate_flattens_nested() {
        let mut inner = AggregateError::new();
        inner.push(PoolError::Connection("a".into()));
        inner.push(PoolError::Connection("b".into()));

        let mut outer = AggregateError::new();
        outer.push(PoolError::Closed);
        outer.push(PoolError::Aggregate(inner));

        assert_eq!(outer.len(), 3);
        assert_eq!(
            outer.to_string(),
            "3 error(s) occurred: Pool closed; Connection error: a; Connection error: b"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(PoolError::Exhausted { in_use: 5, max: 5 }.is_retryable());
        assert!(!PoolError::Closed.is_retryable());
        assert!(PoolError::Closed.is_closed());
        assert!(!PoolError::Cancelled.is_retryable());
    }

    #[test]
    fn test_config_error_message() {
        let err = PoolError::from(ConfigValidationError::InitExceedsMax { init: 10, max: 5 });
        assert_eq!(
            err.to_string(),
            "Invalid pool configuration: init_connections (10) cannot exceed max_connections (5)"
        );
    }
}
