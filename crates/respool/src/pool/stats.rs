//! Pool statistics types

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time view of a pool's capacity
///
/// `in_flight` counts slots reserved by maintenance, `supply` or `release`
/// while their I/O runs. Those slots hold capacity without being usable by
/// callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Configured `max_connections`
    max: usize,
    /// Number of idle connections available in the pool
    idle: usize,
    /// Number of connections currently in use
    active: usize,
    /// Slots reserved for background I/O
    in_flight: usize,
    /// Number of requests waiting for a connection
    waiting: usize,
}

impl PoolStats {
    pub fn new(max: usize, idle: usize, active: usize, in_flight: usize, waiting: usize) -> Self {
        Self {
            max,
            idle,
            active,
            in_flight,
            waiting,
        }
    }

    /// Configured capacity
    pub fn max(&self) -> usize {
        self.max
    }

    /// Occupied slots: idle, active and in flight
    pub fn total(&self) -> usize {
        self.idle + self.active + self.in_flight
    }

    pub fn idle(&self) -> usize {
        self.idle
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn waiting(&self) -> usize {
        self.waiting
    }

    /// Share of capacity checked out by callers (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            0.0
        } else {
            self.active as f64 / self.max as f64
        }
    }

    /// No idle connection and no room to open one
    pub fn is_full(&self) -> bool {
        self.max > 0 && self.idle == 0 && self.active + self.in_flight >= self.max
    }
}

impl Default for PoolStats {
    fn default() -> Self {
        Self::new(0, 0, 0, 0, 0)
    }
}

/// Lifetime counters of a pool
///
/// Maintenance failures never surface to callers; these counters are how
/// they stay observable.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    connections_created: AtomicU64,
    connections_disconnected: AtomicU64,
    acquisitions: AtomicU64,
    exhausted: AtomicU64,
    validation_failures: AtomicU64,
    keep_alive_failures: AtomicU64,
    maintenance_runs: AtomicU64,
    maintenance_errors: AtomicU64,
}

impl PoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disconnected(&self) {
        self.connections_disconnected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acquisition(&self) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_keep_alive_failure(&self) {
        self.keep_alive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_maintenance_run(&self) {
        self.maintenance_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_maintenance_errors(&self, count: usize) {
        self.maintenance_errors
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Snapshot current counters
    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_disconnected: self.connections_disconnected.load(Ordering::Relaxed),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            keep_alive_failures: self.keep_alive_failures.load(Ordering::Relaxed),
            maintenance_runs: self.maintenance_runs.load(Ordering::Relaxed),
            maintenance_errors: self.maintenance_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PoolMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMetricsSnapshot {
    /// Connections opened by the factory
    pub connections_created: u64,
    /// Connections torn down by the pool or their holder
    pub connections_disconnected: u64,
    /// Successful acquisitions
    pub acquisitions: u64,
    /// Acquisition attempts that found the pool exhausted
    pub exhausted: u64,
    /// Candidates that failed validation during acquisition
    pub validation_failures: u64,
    /// Idle connections that failed a keep-alive sweep
    pub keep_alive_failures: u64,
    /// Completed maintenance passes
    pub maintenance_runs: u64,
    /// Individual failures reported by maintenance passes
    pub maintenance_errors: u64,
}
