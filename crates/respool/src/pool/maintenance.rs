//! Background upkeep of idle connections

use std::sync::Weak;
use std::time::Duration;

use respool_core::{AggregateError, Connection, ConnectionFactory, PoolError, Result};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::free_set::IdleConnection;
use super::pool::PoolInner;

/// Idle connections validated per keep-alive sweep
const KEEP_ALIVE_BATCH: usize = 16;

/// Start the maintenance loop for a pool
///
/// The loop only holds a weak reference between ticks and stops once the pool
/// is closed, dropped, or `shutdown` fires.
pub(crate) fn spawn<F: ConnectionFactory>(
    pool: Weak<PoolInner<F>>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(inner) = pool.upgrade() else {
                break;
            };
            if inner.is_closed() {
                break;
            }
            if let Err(e) = run(&inner).await {
                tracing::warn!(pool_id = %inner.id, error = %e, "maintenance pass reported failures");
            }
        }

        tracing::debug!("maintenance loop stopped");
    })
}

/// One maintenance pass: keep-alive, replenish, trim
pub(crate) async fn run<F: ConnectionFactory>(inner: &PoolInner<F>) -> Result<()> {
    let now = Instant::now();
    let mut errors = AggregateError::new();

    let keep_alive_due = {
        let mut state = inner.state.lock();
        if state.closed {
            return Ok(());
        }
        let due = now >= state.keep_alive_at;
        if due {
            state.keep_alive_at = now + inner.config.keep_alive_interval();
        }
        due
    };
    if keep_alive_due {
        keep_alive(inner, &mut errors).await;
    }

    let deficit = {
        let state = inner.state.lock();
        inner
            .config
            .init_connections()
            .saturating_sub(state.total())
    };
    if deficit > 0 {
        tracing::debug!(pool_id = %inner.id, deficit, "replenishing pool");
        if let Err(e) = inner.supply(deficit).await {
            errors.push(e);
        }
    }

    let excess = {
        let mut state = inner.state.lock();
        if now >= state.expire_at {
            state.expire_at = now + inner.config.max_idle_time();
            (state.free.len() + state.used).saturating_sub(inner.config.max_idle_connections())
        } else {
            0
        }
    };
    if excess > 0 {
        tracing::debug!(pool_id = %inner.id, excess, "trimming idle connections");
        if let Err(e) = inner.release(excess).await {
            errors.push(e);
        }
    }

    inner.metrics.record_maintenance_run();
    if !errors.is_empty() {
        inner.metrics.record_maintenance_errors(errors.len());
    }
    errors.into_result()
}

/// Validate a batch of idle connections, dropping the ones that fail
async fn keep_alive<F: ConnectionFactory>(inner: &PoolInner<F>, errors: &mut AggregateError) {
    let batch = {
        let mut state = inner.state.lock();
        let batch = state.free.take(KEEP_ALIVE_BATCH);
        state.in_flight += batch.len();
        batch
    };
    if batch.is_empty() {
        return;
    }

    let checked = batch.len();
    let mut dropped = 0usize;

    for IdleConnection {
        mut connection,
        idle_since,
    } in batch
    {
        if connection.validate().await {
            let rejected = {
                let mut state = inner.state.lock();
                state.in_flight = state.in_flight.saturating_sub(1);
                if state.closed {
                    Some(connection)
                } else {
                    state
                        .free
                        .try_push(IdleConnection {
                            connection,
                            idle_since,
                        })
                        .err()
                        .map(|idle| idle.connection)
                }
            };
            inner.notify_available();
            if let Some(mut connection) = rejected {
                let _ = inner.disconnect(&mut connection).await;
            }
        } else {
            dropped += 1;
            inner.metrics.record_keep_alive_failure();
            errors.push(PoolError::ConnectionInvalid);
            if let Err(e) = inner.disconnect(&mut connection).await {
                errors.push(e);
            }
            inner.forget_in_flight();
        }
    }

    tracing::debug!(pool_id = %inner.id, checked, dropped, "keep-alive sweep finished");
}
