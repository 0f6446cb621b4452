//! Process-wide pool slot

use std::future::Future;

use parking_lot::RwLock;
use respool_core::{ConnectionFactory, PoolError, Result};

use crate::pool::{Pool, PoolConfig, PooledConnection};

/// A lazily initialised, replaceable pool shared across a process
///
/// Meant to live in a `static`:
///
/// ```ignore
/// static POOL: GlobalPool<TcpFactory> = GlobalPool::new();
///
/// POOL.init(config, factory).await?;
/// let reply = POOL.execute(|conn| async move { talk(conn).await }).await?;
/// ```
pub struct GlobalPool<F: ConnectionFactory> {
    slot: RwLock<Option<Pool<F>>>,
}

impl<F: ConnectionFactory> GlobalPool<F> {
    /// Create an empty slot
    pub const fn new() -> Self {
        Self {
            slot: parking_lot::const_rwlock(None),
        }
    }

    /// Build the pool and install it
    ///
    /// Fails with `PoolError::AlreadyInitialized` when a pool is installed.
    #[tracing::instrument(skip_all)]
    pub async fn init(&self, config: PoolConfig, factory: F) -> Result<()> {
        if self.slot.read().is_some() {
            return Err(PoolError::AlreadyInitialized);
        }

        let pool = Pool::new(config, factory).await?;

        // Another caller may have won the race while the pool was being built
        let rejected = {
            let mut slot = self.slot.write();
            if slot.is_some() {
                Some(pool)
            } else {
                *slot = Some(pool);
                None
            }
        };
        if let Some(pool) = rejected {
            if let Err(e) = pool.close().await {
                tracing::warn!(error = %e, "failed to close redundant pool");
            }
            return Err(PoolError::AlreadyInitialized);
        }

        tracing::info!("global pool initialized");
        Ok(())
    }

    /// Swap in a freshly built pool
    ///
    /// The new pool is built first; if that fails the current pool stays in
    /// place. The prior pool is closed before the new one is installed, and a
    /// failure to close it is returned after the swap.
    #[tracing::instrument(skip_all)]
    pub async fn replace(&self, config: PoolConfig, factory: F) -> Result<()> {
        let pool = Pool::new(config, factory).await?;

        let prior = self.slot.read().clone();
        let closed = match &prior {
            Some(prior) => prior.close().await,
            None => Ok(()),
        };

        let displaced = self.slot.write().replace(pool);
        // Closing is idempotent, this only matters if an init slipped in
        if let Some(displaced) = displaced
            && let Err(e) = displaced.close().await
        {
            tracing::warn!(error = %e, "failed to close displaced pool");
        }

        if let Err(e) = &closed {
            tracing::warn!(error = %e, "prior pool closed with errors");
        }
        tracing::info!("global pool replaced");
        closed
    }

    /// Get a handle to the installed pool
    pub fn get(&self) -> Result<Pool<F>> {
        self.slot.read().clone().ok_or(PoolError::NotInitialized)
    }

    /// Whether a pool is installed
    pub fn is_initialized(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Run `f` with a connection from the installed pool
    ///
    /// The connection goes back to the pool when `f` closes or drops it.
    pub async fn execute<T, Fut>(
        &self,
        f: impl FnOnce(PooledConnection<F>) -> Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let pool = self.get()?;
        let connection = pool.get().await?;
        f(connection).await
    }

    /// Close and remove the installed pool
    ///
    /// A no-op when nothing is installed.
    #[tracing::instrument(skip_all)]
    pub async fn close(&self) -> Result<()> {
        let prior = self.slot.write().take();
        match prior {
            Some(pool) => pool.close().await,
            None => Ok(()),
        }
    }
}

impl<F: ConnectionFactory> Default for GlobalPool<F> {
    fn default() -> Self {
        Self::new()
    }
}
