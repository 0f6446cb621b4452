//! respool core - traits and error types shared by the pool and its backends
//!
//! This crate defines the narrow interface between the generic pool and the
//! backend-specific collaborators that plug into it:
//!
//! - `ConnectionFactory` - opens new connections
//! - `Connection` - validates and disconnects a live connection
//! - `ConnectParams` - address, credentials and options for a factory
//! - `PoolError` / `AggregateError` - the error taxonomy

mod connection;
mod error;

pub use connection::*;
pub use error::*;
