//! Generic connection pooling
//!
//! This module provides a bounded pool of reusable connections with blocking
//! acquisition, keep-alive validation, replenishment and idle trimming. The
//! pool is generic over a [`ConnectionFactory`](respool_core::ConnectionFactory)
//! and never looks inside the connections it manages.
//!
//! # Example
//!
//! ```ignore
//! use respool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new(5)
//!     .with_init_connections(2)
//!     .with_max_idle_connections(3)
//!     .with_max_wait_time_ms(1000);
//!
//! let pool = Pool::new(config, factory).await?;
//! let conn = pool.get().await?;
//! // Use connection...
//! conn.close().await?;
//! pool.close().await?;
//! ```

mod config;
mod free_set;
mod maintenance;
mod pool;
mod pooled;
mod stats;


pub use config::PoolConfig;
pub use pool::Pool;
pub use pooled::PooledConnection;
pub use stats::{PoolMetrics, PoolMetricsSnapshot, PoolStats};
