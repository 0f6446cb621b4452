//! Connection pool implementation

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use respool_core::{AggregateError, Connection, ConnectionFactory, PoolError, Result};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::config::PoolConfig;
use super::free_set::{FreeSet, IdleConnection};
use super::maintenance;
use super::pooled::PooledConnection;
use super::stats::{PoolMetrics, PoolMetricsSnapshot, PoolStats};

/// Deadline used when the wait is unbounded (roughly thirty years)
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Longest a waiter with a retry budget sleeps between attempts
const RETRY_DELAY: Duration = Duration::from_millis(5);

pub(crate) type Conn<F> = <F as ConnectionFactory>::Connection;

/// Bookkeeping guarded by the pool mutex
///
/// `in_flight` counts capacity reserved for I/O in progress: dials for
/// `supply`, keep-alive validation and disconnects during `release`. The pool
/// never holds the mutex across that I/O, so the reservation is what keeps
/// `free + used + in_flight <= max_connections` true at every instant.
pub(crate) struct State<C> {
    pub(crate) free: FreeSet<C>,
    pub(crate) used: usize,
    pub(crate) in_flight: usize,
    pub(crate) keep_alive_at: Instant,
    pub(crate) expire_at: Instant,
    pub(crate) closed: bool,
}

impl<C> State<C> {
    pub(crate) fn total(&self) -> usize {
        self.free.len() + self.used + self.in_flight
    }
}

pub(crate) struct PoolInner<F: ConnectionFactory> {
    pub(crate) id: Uuid,
    pub(crate) config: PoolConfig,
    factory: F,
    pub(crate) state: Mutex<State<Conn<F>>>,
    /// Signalled whenever capacity or an idle connection may have become
    /// available, and on close
    available: Notify,
    waiting: AtomicUsize,
    pub(crate) metrics: PoolMetrics,
    shutdown: CancellationToken,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl<F: ConnectionFactory> PoolInner<F> {
    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn notify_available(&self) {
        self.available.notify_waiters();
    }

    fn exhausted(&self, state: &State<Conn<F>>) -> PoolError {
        self.metrics.record_exhausted();
        PoolError::Exhausted {
            in_use: state.used,
            max: self.config.max_connections(),
        }
    }

    /// Give back a slot counted in `used`
    pub(crate) fn forget_used(&self) {
        {
            let mut state = self.state.lock();
            debug_assert!(state.used > 0, "used counter underflow");
            state.used = state.used.saturating_sub(1);
        }
        self.notify_available();
    }

    /// Give back a slot counted in `in_flight`
    pub(crate) fn forget_in_flight(&self) {
        {
            let mut state = self.state.lock();
            debug_assert!(state.in_flight > 0, "in-flight counter underflow");
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.notify_available();
    }

    /// Disconnect a connection owned by this pool, logging failures
    pub(crate) async fn disconnect(&self, connection: &mut Conn<F>) -> Result<()> {
        let result = connection.disconnect().await;
        self.metrics.record_disconnected();
        if let Err(e) = &result {
            tracing::warn!(pool_id = %self.id, error = %e, "failed to disconnect connection");
        }
        result
    }

    /// Return a checked-out connection to the free set
    ///
    /// Hands the connection back when it must be disconnected instead, which
    /// happens once the pool is closed.
    pub(crate) fn put_back(&self, connection: Conn<F>) -> Option<Conn<F>> {
        let rejected = {
            let mut state = self.state.lock();
            debug_assert!(state.used > 0, "used counter underflow");
            state.used = state.used.saturating_sub(1);
            if state.closed {
                Some(connection)
            } else {
                state
                    .free
                    .try_push(IdleConnection::new(connection))
                    .err()
                    .map(|idle| idle.connection)
            }
        };
        self.notify_available();
        rejected
    }

    /// One acquisition attempt
    async fn try_get(self: &Arc<Self>) -> Result<PooledConnection<F>> {
        let candidates = {
            let state = self.state.lock();
            if state.closed {
                return Err(PoolError::Closed);
            }
            if state.used >= self.config.max_connections() {
                return Err(self.exhausted(&state));
            }
            state.free.len()
        };

        for _ in 0..candidates {
            let idle = {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(PoolError::Closed);
                }
                match state.free.try_pop() {
                    Some(idle) => {
                        state.used += 1;
                        idle
                    }
                    // Drained by a concurrent caller, fall through to creation
                    None => break,
                }
            };

            let mut connection = idle.connection;
            if connection.validate().await {
                self.metrics.record_acquisition();
                return Ok(PooledConnection::new(connection, self));
            }

            self.metrics.record_validation_failure();
            tracing::debug!(pool_id = %self.id, "discarding idle connection that failed validation");
            // Failures are logged by `disconnect`; the caller gets a replacement
            let _ = self.disconnect(&mut connection).await;
            self.forget_used();
        }

        self.open_for_caller().await
    }

    /// Reserve a slot, dial outside the lock, then commit or roll back
    async fn open_for_caller(self: &Arc<Self>) -> Result<PooledConnection<F>> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(PoolError::Closed);
            }
            if state.total() >= self.config.max_connections() {
                return Err(self.exhausted(&state));
            }
            state.used += 1;
        }

        match self.factory.open().await {
            Ok(mut connection) => {
                self.metrics.record_created();
                if self.is_closed() {
                    let _ = self.disconnect(&mut connection).await;
                    self.forget_used();
                    return Err(PoolError::Closed);
                }
                tracing::debug!(pool_id = %self.id, "opened connection on demand");
                self.metrics.record_acquisition();
                Ok(PooledConnection::new(connection, self))
            }
            Err(e) => {
                tracing::debug!(pool_id = %self.id, error = %e, "failed to open connection on demand");
                self.forget_used();
                Err(e)
            }
        }
    }

    /// Bounded blocking acquisition
    ///
    /// Retries while the pool is exhausted, waking as soon as a connection is
    /// returned or capacity frees up. With a retry budget, each attempt also
    /// runs after at most [`RETRY_DELAY`] without any wake-up. Ends with the
    /// last exhaustion error when the deadline passes or the retry budget is
    /// spent.
    async fn acquire(
        self: &Arc<Self>,
        deadline: Option<Instant>,
        cancel: Option<&CancellationToken>,
    ) -> Result<PooledConnection<F>> {
        let deadline = deadline.unwrap_or_else(|| Instant::now() + FAR_FUTURE);
        let max_retries = self.config.max_retry_count();
        let mut retries: u64 = 0;

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(PoolError::Cancelled);
            }

            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let err = match self.try_get().await {
                Err(err) if err.is_retryable() => err,
                other => return other,
            };

            if max_retries.is_some_and(|max| retries >= max) || Instant::now() >= deadline {
                return Err(err);
            }
            retries += 1;

            let _waiting = WaitingGuard::new(&self.waiting);
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(RETRY_DELAY), if max_retries.is_some() => {}
                _ = tokio::time::sleep_until(deadline) => return Err(err),
                _ = cancelled(cancel) => return Err(PoolError::Cancelled),
            }
        }
    }

    pub(crate) async fn supply(&self, n: usize) -> Result<()> {
        let mut errors = AggregateError::new();
        let mut opened = 0usize;

        for _ in 0..n {
            {
                let mut state = self.state.lock();
                if state.closed || state.total() >= self.config.max_connections() {
                    break;
                }
                state.in_flight += 1;
            }

            match self.factory.open().await {
                Ok(connection) => {
                    self.metrics.record_created();
                    let rejected = {
                        let mut state = self.state.lock();
                        state.in_flight = state.in_flight.saturating_sub(1);
                        if state.closed {
                            Some(connection)
                        } else {
                            state
                                .free
                                .try_push(IdleConnection::new(connection))
                                .err()
                                .map(|idle| idle.connection)
                        }
                    };
                    self.notify_available();

                    match rejected {
                        Some(mut connection) => {
                            let _ = self.disconnect(&mut connection).await;
                        }
                        None => opened += 1,
                    }
                }
                Err(e) => {
                    tracing::warn!(pool_id = %self.id, error = %e, "failed to supply connection");
                    self.forget_in_flight();
                    errors.push(e);
                }
            }
        }

        tracing::debug!(pool_id = %self.id, requested = n, opened, failed = errors.len(), "supply finished");
        errors.into_result()
    }

    pub(crate) async fn release(&self, n: usize) -> Result<()> {
        let mut errors = AggregateError::new();
        let mut released = 0usize;

        for _ in 0..n {
            let idle = {
                let mut state = self.state.lock();
                let idle = state.free.try_pop();
                if idle.is_some() {
                    state.in_flight += 1;
                }
                idle
            };
            let Some(mut idle) = idle else {
                break;
            };

            tracing::trace!(pool_id = %self.id, idle_for = ?idle.idle_since.elapsed(), "releasing idle connection");
            if let Err(e) = self.disconnect(&mut idle.connection).await {
                errors.push(e);
            }
            self.forget_in_flight();
            released += 1;
        }

        tracing::debug!(pool_id = %self.id, requested = n, released, failed = errors.len(), "release finished");
        errors.into_result()
    }
}

impl<F: ConnectionFactory> Drop for PoolInner<F> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A bounded pool of reusable connections
///
/// `Pool` is a cheap handle; clones share the same connections. Connections
/// are checked out with [`Pool::get`] and go back to the pool when the
/// returned [`PooledConnection`] is closed or dropped. A background task keeps
/// idle connections validated, replenishes the pool up to
/// `init_connections` and trims idle connections above
/// `max_idle_connections`.
pub struct Pool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ConnectionFactory> Pool<F> {
    /// Create a new pool
    ///
    /// Validates the configuration, opens `init_connections` connections and
    /// starts the maintenance loop. Must be called within a Tokio runtime.
    #[tracing::instrument(skip_all, fields(
        max_connections = config.max_connections(),
        init_connections = config.init_connections(),
    ))]
    pub async fn new(config: PoolConfig, factory: F) -> Result<Self> {
        config.validate()?;

        let now = Instant::now();
        let inner = Arc::new(PoolInner {
            id: Uuid::new_v4(),
            state: Mutex::new(State {
                free: FreeSet::with_capacity(config.max_connections()),
                used: 0,
                in_flight: 0,
                keep_alive_at: now + config.keep_alive_interval(),
                expire_at: now + config.max_idle_time(),
                closed: false,
            }),
            config,
            factory,
            available: Notify::new(),
            waiting: AtomicUsize::new(0),
            metrics: PoolMetrics::new(),
            shutdown: CancellationToken::new(),
            maintenance: Mutex::new(None),
        });
        let pool = Self { inner };

        if let Err(e) = pool.inner.supply(pool.inner.config.init_connections()).await {
            tracing::error!(pool_id = %pool.id(), error = %e, "failed to open initial connections");
            if let Err(close_err) = pool.close().await {
                tracing::warn!(pool_id = %pool.id(), error = %close_err, "failed to clean up partially created pool");
            }
            return Err(e);
        }

        let handle = maintenance::spawn(
            Arc::downgrade(&pool.inner),
            pool.inner.config.maintenance_interval(),
            pool.inner.shutdown.clone(),
        );
        *pool.inner.maintenance.lock() = Some(handle);

        tracing::info!(pool_id = %pool.id(), idle = pool.idle_connections(), "pool created");
        Ok(pool)
    }

    /// Unique identifier of this pool, used in log fields
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get a connection from the pool
    ///
    /// This will:
    /// 1. Try idle connections, validating each and discarding broken ones
    /// 2. If none is usable and the pool has room, open a new connection
    /// 3. If the pool is exhausted, wait for a connection to come back,
    ///    bounded by `max_wait_time` and `max_retry_count`
    ///
    /// Fails immediately with `PoolError::Closed` once the pool is closed, and
    /// with the factory's error if opening a connection fails.
    pub async fn get(&self) -> Result<PooledConnection<F>> {
        let deadline = self
            .inner
            .config
            .max_wait_time()
            .map(|wait| Instant::now() + wait);
        self.inner.acquire(deadline, None).await
    }

    /// Like [`Pool::get`], with an explicit wait bound instead of
    /// `max_wait_time`
    pub async fn get_timeout(&self, timeout: Duration) -> Result<PooledConnection<F>> {
        self.inner.acquire(Some(Instant::now() + timeout), None).await
    }

    /// Like [`Pool::get`], waiting at most until `deadline`
    pub async fn get_until(&self, deadline: Instant) -> Result<PooledConnection<F>> {
        self.inner.acquire(Some(deadline), None).await
    }

    /// Like [`Pool::get`], giving up with `PoolError::Cancelled` as soon as
    /// `cancel` fires
    pub async fn get_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> Result<PooledConnection<F>> {
        let deadline = self
            .inner
            .config
            .max_wait_time()
            .map(|wait| Instant::now() + wait);
        self.inner.acquire(deadline, Some(cancel)).await
    }

    /// Make a single acquisition attempt without waiting
    ///
    /// Returns `PoolError::Exhausted` when every slot is taken.
    pub async fn try_get(&self) -> Result<PooledConnection<F>> {
        self.inner.try_get().await
    }

    /// Open up to `n` new idle connections, staying within capacity
    ///
    /// Keeps going after individual failures and reports all of them as one
    /// aggregate error. Does nothing on a closed pool.
    #[tracing::instrument(skip(self), fields(pool_id = %self.inner.id))]
    pub async fn supply(&self, n: usize) -> Result<()> {
        self.inner.supply(n).await
    }

    /// Disconnect up to `n` idle connections
    ///
    /// Stops early once no idle connection is left. Failures are aggregated.
    #[tracing::instrument(skip(self), fields(pool_id = %self.inner.id))]
    pub async fn release(&self, n: usize) -> Result<()> {
        self.inner.release(n).await
    }

    /// Run one maintenance pass now
    ///
    /// The background loop calls this on every tick. Keep-alive and trimming
    /// only happen when their intervals have elapsed; replenishment always
    /// runs.
    pub async fn run_maintenance(&self) -> Result<()> {
        maintenance::run(&self.inner).await
    }

    /// Close the pool
    ///
    /// Disconnects every idle connection, wakes blocked callers, and waits for
    /// the maintenance loop to stop. Connections still checked out are
    /// disconnected when their holders close them. Calling this more than
    /// once is a no-op.
    #[tracing::instrument(skip(self), fields(pool_id = %self.inner.id))]
    pub async fn close(&self) -> Result<()> {
        let idle = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.free.len()
        };

        self.inner.shutdown.cancel();
        self.inner.notify_available();

        let result = self.inner.release(idle).await;

        let handle = self.inner.maintenance.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "maintenance task ended abnormally");
        }

        tracing::info!("pool closed");
        result
    }

    /// Whether [`Pool::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Number of connections currently checked out
    pub fn used_connections(&self) -> usize {
        self.inner.state.lock().used
    }

    /// Number of idle connections in the pool
    pub fn idle_connections(&self) -> usize {
        self.inner.state.lock().free.len()
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let (idle, active, in_flight) = {
            let state = self.inner.state.lock();
            (state.free.len(), state.used, state.in_flight)
        };
        let waiting = self.inner.waiting.load(Ordering::SeqCst);
        PoolStats::new(
            self.inner.config.max_connections(),
            idle,
            active,
            in_flight,
            waiting,
        )
    }

    /// Snapshot the pool's lifetime counters
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

impl<F: ConnectionFactory> fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Counts a caller as waiting for as long as it is alive
struct WaitingGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> WaitingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn cancelled(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
