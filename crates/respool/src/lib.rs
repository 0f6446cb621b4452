//! respool - a generic, bounded connection pool
//!
//! This crate provides:
//! - `Pool` - a bounded pool of reusable connections with blocking acquisition
//! - `PooledConnection` - a checked-out connection that returns itself on drop
//! - `PoolConfig` - sizing, wait bounds and maintenance intervals, loadable
//!   from TOML
//! - `GlobalPool` - a process-wide, replaceable pool slot
//!
//! Backends plug in by implementing `Connection` and `ConnectionFactory`
//! from `respool-core`, which are re-exported here.

pub mod pool;
pub mod registry;

pub use pool::{
    Pool, PoolConfig, PoolMetrics, PoolMetricsSnapshot, PoolStats, PooledConnection,
};
pub use registry::GlobalPool;
pub use respool_core::{
    AggregateError, ConfigValidationError, ConnectParams, Connection, ConnectionFactory,
    PoolError, Result,
};
