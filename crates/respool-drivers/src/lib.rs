//! respool drivers - concrete connection factories
//!
//! This crate provides implementations of the `Connection` and
//! `ConnectionFactory` traits defined in `respool-core`.

mod tcp;

pub use tcp::{TcpConnection, TcpFactory};

/// Re-export commonly used types from respool-core
pub use respool_core::{ConnectParams, Connection, ConnectionFactory, PoolError, Result};
