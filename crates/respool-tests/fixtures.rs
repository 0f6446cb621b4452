//! Test fixtures: a scriptable mock backend and shared helpers
//!
//! `MockFactory` hands out `MockConnection`s and records what the pool does
//! with them. Knobs on the factory make opens fail or slow, make every
//! connection fail validation, or make disconnects fail. The `live` counter
//! tracks connections opened and not yet disconnected, and `peak_live` its
//! high-water mark, so tests can check capacity against what a real backend
//! would see.
//!
//! # Usage
//!
//! ```rust,ignore
//! use respool_tests::fixtures::{MockFactory, scenario_config};
//!
//! let factory = MockFactory::new();
//! let pool = respool::Pool::new(scenario_config(), factory.clone()).await?;
//! assert_eq!(factory.created(), 2);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use respool::PoolConfig;
use respool_core::{Connection, ConnectionFactory, PoolError, Result};

#[derive(Debug, Default)]
struct MockState {
    created: AtomicUsize,
    disconnected: AtomicUsize,
    live: AtomicUsize,
    peak_live: AtomicUsize,
    validations: AtomicUsize,
    fail_open: AtomicBool,
    fail_disconnect: AtomicBool,
    invalid: AtomicBool,
    open_delay_ms: AtomicU64,
}

/// Connection handed out by [`MockFactory`]
#[derive(Debug)]
pub struct MockConnection {
    /// Sequence number assigned at open time, starting at 0
    pub id: usize,
    broken: bool,
    state: Arc<MockState>,
}

impl MockConnection {
    /// Make this connection fail every later validation
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn validate(&mut self) -> bool {
        self.state.validations.fetch_add(1, Ordering::SeqCst);
        !self.broken && !self.state.invalid.load(Ordering::SeqCst)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.state.disconnected.fetch_add(1, Ordering::SeqCst);
        self.state.live.fetch_sub(1, Ordering::SeqCst);
        if self.state.fail_disconnect.load(Ordering::SeqCst) {
            return Err(PoolError::Connection(format!(
                "mock connection {} refused to disconnect",
                self.id
            )));
        }
        Ok(())
    }
}

/// Scriptable connection factory
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    state: Arc<MockState>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections opened so far
    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    /// Connections disconnected so far
    pub fn disconnected(&self) -> usize {
        self.state.disconnected.load(Ordering::SeqCst)
    }

    /// Connections opened and not yet disconnected
    pub fn live(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    /// Highest value `live` has reached
    pub fn peak_live(&self) -> usize {
        self.state.peak_live.load(Ordering::SeqCst)
    }

    /// Validation calls so far
    pub fn validations(&self) -> usize {
        self.state.validations.load(Ordering::SeqCst)
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_disconnect(&self, fail: bool) {
        self.state.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    /// Make every connection fail validation
    pub fn set_invalid(&self, invalid: bool) {
        self.state.invalid.store(invalid, Ordering::SeqCst);
    }

    /// Delay every open by `delay`
    pub fn set_open_delay(&self, delay: Duration) {
        self.state
            .open_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    type Connection = MockConnection;

    async fn open(&self) -> Result<MockConnection> {
        let delay = self.state.open_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(PoolError::Connection("mock backend unavailable".into()));
        }

        let id = self.state.created.fetch_add(1, Ordering::SeqCst);
        let live = self.state.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_live.fetch_max(live, Ordering::SeqCst);

        Ok(MockConnection {
            id,
            broken: false,
            state: Arc::clone(&self.state),
        })
    }
}

/// Max 5, Init 2, MaxIdle 3, 1s wait bound, unbounded retries
pub fn scenario_config() -> PoolConfig {
    PoolConfig::new(5)
        .with_init_connections(2)
        .with_max_idle_connections(3)
        .with_max_wait_time_ms(1_000)
        .with_max_retry_count(-1)
}

/// Short intervals for maintenance tests running on a paused clock
pub fn fast_maintenance_config() -> PoolConfig {
    scenario_config()
        .with_maintenance_interval_ms(100)
        .with_keep_alive_interval_ms(200)
        .with_max_idle_time_ms(300)
}

/// Install a test-friendly tracing subscriber, honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
