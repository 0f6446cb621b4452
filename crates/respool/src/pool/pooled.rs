//! Checked-out connection handle

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

use respool_core::{Connection, ConnectionFactory, Result};

use super::pool::PoolInner;

/// A connection checked out of a [`Pool`](super::Pool)
///
/// Dereferences to the underlying connection. Closing the handle, or just
/// dropping it, hands the connection back to the pool it came from. When the
/// pool is gone or closed the connection is disconnected instead.
pub struct PooledConnection<F: ConnectionFactory> {
    connection: Option<F::Connection>,
    pool: Weak<PoolInner<F>>,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    pub(crate) fn new(connection: F::Connection, pool: &Arc<PoolInner<F>>) -> Self {
        Self {
            connection: Some(connection),
            pool: Arc::downgrade(pool),
        }
    }

    /// Wrap a connection that belongs to no pool
    ///
    /// Closing a standalone connection disconnects it.
    pub fn standalone(connection: F::Connection) -> Self {
        Self {
            connection: Some(connection),
            pool: Weak::new(),
        }
    }

    /// Whether the pool this connection came from is still alive
    pub fn is_pooled(&self) -> bool {
        self.pool.strong_count() > 0
    }

    /// Return the connection to its pool
    ///
    /// On a closed or dropped pool, and for standalone connections, this
    /// disconnects instead and reports the disconnect outcome.
    pub async fn close(mut self) -> Result<()> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };
        match self.pool.upgrade() {
            Some(pool) => match pool.put_back(connection) {
                None => Ok(()),
                Some(mut rejected) => pool.disconnect(&mut rejected).await,
            },
            None => {
                let mut connection = connection;
                connection.disconnect().await
            }
        }
    }

    /// Disconnect the connection instead of returning it
    ///
    /// Use this when the connection is known to be broken. The slot it held
    /// is given back to the pool either way.
    pub async fn disconnect(mut self) -> Result<()> {
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };
        match self.pool.upgrade() {
            Some(pool) => {
                let result = pool.disconnect(&mut connection).await;
                pool.forget_used();
                result
            }
            None => connection.disconnect().await,
        }
    }

    fn connection(&self) -> &F::Connection {
        self.connection
            .as_ref()
            .expect("connection is only taken when the handle is consumed")
    }

    fn connection_mut(&mut self) -> &mut F::Connection {
        self.connection
            .as_mut()
            .expect("connection is only taken when the handle is consumed")
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        self.connection()
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection_mut()
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let leftover = match self.pool.upgrade() {
            Some(pool) => pool.put_back(connection),
            None => Some(connection),
        };

        // Disconnecting is async, so it can only happen on a runtime
        if let Some(mut connection) = leftover {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let pool = self.pool.clone();
                    handle.spawn(async move {
                        match pool.upgrade() {
                            Some(pool) => {
                                let _ = pool.disconnect(&mut connection).await;
                            }
                            None => {
                                if let Err(e) = connection.disconnect().await {
                                    tracing::warn!(error = %e, "failed to disconnect dropped connection");
                                }
                            }
                        }
                    });
                }
                Err(_) => {
                    tracing::warn!("dropped connection outside a runtime, skipping disconnect");
                }
            }
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for PooledConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pooled", &self.is_pooled())
            .finish_non_exhaustive()
    }
}
