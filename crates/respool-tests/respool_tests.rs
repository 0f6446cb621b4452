//! respool integration test suite
//!
//! Exercises the pool through its public API against a scriptable mock
//! factory and a real TCP listener.
//!
//! # Test Categories
//!
//! - Configuration loading and validation
//! - Acquisition, exhaustion and return
//! - Close semantics
//! - Background maintenance (keep-alive, replenishment, trimming)
//! - Concurrent access under random load
//! - Process-wide registry
//! - TCP driver
//!
//! # Usage
//!
//! ```bash
//! cargo test -p respool-tests
//!
//! # Run specific test module with logs
//! RUST_LOG=respool=debug cargo test -p respool-tests maintenance_tests
//! ```

pub mod fixtures;

#[cfg(test)]
pub mod close_tests;
#[cfg(test)]
pub mod concurrency_tests;
#[cfg(test)]
pub mod config_tests;
#[cfg(test)]
pub mod maintenance_tests;
#[cfg(test)]
pub mod pool_tests;
#[cfg(test)]
pub mod registry_tests;
#[cfg(test)]
pub mod tcp_tests;
