//! Concurrent access tests
//!
//! Many tasks acquire, hold, break and return connections at random, and
//! call `supply` and `release` in between, while a monitor checks the
//! capacity bound. The mock factory's `peak_live` counter
//! checks the same bound from the backend's point of view.

use pretty_assertions::assert_eq;
use rand::Rng;
use respool::{Pool, PoolError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::fixtures::{MockFactory, init_tracing, scenario_config};

const TASKS: usize = 32;
const ITERATIONS: usize = 40;

/// Batch operations report per-connection failures as an aggregate; only
/// other errors end the worker
fn tolerate_batch_failure(result: respool::Result<()>) -> respool::Result<()> {
    match result {
        Ok(()) | Err(PoolError::Aggregate(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_random_load_respects_capacity() -> anyhow::Result<()> {
    init_tracing();
    let factory = MockFactory::new();
    factory.set_open_delay(Duration::from_millis(1));
    let config = scenario_config()
        .with_max_wait_time_ms(10_000)
        .with_maintenance_interval_ms(5)
        .with_keep_alive_interval_ms(20)
        .with_max_idle_time_ms(30);
    let max = config.max_connections();
    let pool = Pool::new(config, factory.clone()).await?;

    let stop = Arc::new(AtomicBool::new(false));
    let monitor = {
        let pool = pool.clone();
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            let mut samples = 0usize;
            while !stop.load(Ordering::SeqCst) {
                let stats = pool.stats();
                assert!(stats.total() <= max, "bookkeeping exceeded capacity: {stats:?}");
                assert!(stats.active() <= max);
                samples += 1;
                tokio::task::yield_now().await;
            }
            samples
        })
    };

    let workers: Vec<_> = (0..TASKS)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                for _ in 0..ITERATIONS {
                    let (hold_ms, action, n) = {
                        let mut rng = rand::thread_rng();
                        (
                            rng.gen_range(0..3u64),
                            rng.gen_range(0..12u8),
                            rng.gen_range(1..=5usize),
                        )
                    };

                    match action {
                        10 => {
                            tolerate_batch_failure(pool.supply(n).await)?;
                            continue;
                        }
                        11 => {
                            tolerate_batch_failure(pool.release(n).await)?;
                            continue;
                        }
                        _ => {}
                    }

                    let mut conn = pool.get().await?;
                    tokio::time::sleep(Duration::from_millis(hold_ms)).await;
                    match action {
                        0 => conn.disconnect().await?,
                        1 => {
                            conn.mark_broken();
                            conn.close().await?;
                        }
                        2 => drop(conn),
                        _ => conn.close().await?,
                    }
                }
                Ok::<_, PoolError>(())
            })
        })
        .collect();

    for worker in workers {
        worker.await??;
    }
    stop.store(true, Ordering::SeqCst);
    let samples = monitor.await?;
    assert!(samples > 0);

    assert!(
        factory.peak_live() <= max,
        "backend saw {} live connections, capacity is {max}",
        factory.peak_live()
    );
    assert_eq!(pool.used_connections(), 0);

    pool.close().await?;
    assert_eq!(factory.live(), 0, "close should leave nothing open");
    assert_eq!(factory.created(), factory.disconnected());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_during_load_terminates() -> anyhow::Result<()> {
    let factory = MockFactory::new();
    let config = scenario_config()
        .with_max_wait_time_ms(-1)
        .with_maintenance_interval_ms(5);
    let pool = Pool::new(config, factory.clone()).await?;

    let workers: Vec<_> = (0..TASKS)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                loop {
                    let (action, n) = {
                        let mut rng = rand::thread_rng();
                        (rng.gen_range(0..6u8), rng.gen_range(1..=5usize))
                    };
                    match action {
                        0 => tolerate_batch_failure(pool.supply(n).await)?,
                        1 => tolerate_batch_failure(pool.release(n).await)?,
                        _ => {}
                    }

                    match pool.get().await {
                        Ok(conn) => {
                            let hold_ms = rand::thread_rng().gen_range(0..3u64);
                            tokio::time::sleep(Duration::from_millis(hold_ms)).await;
                            conn.close().await?;
                        }
                        Err(PoolError::Closed) => return Ok::<(), PoolError>(()),
                        Err(e) => return Err(e),
                    }
                }
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(100)).await;
    tokio::time::timeout(Duration::from_secs(10), pool.close()).await??;

    for worker in workers {
        tokio::time::timeout(Duration::from_secs(10), worker).await???;
    }

    let runs = pool.metrics().maintenance_runs;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.metrics().maintenance_runs, runs, "maintenance loop should be gone");
    assert_eq!(factory.live(), 0);
    Ok(())
}
