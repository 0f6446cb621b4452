//! Background maintenance tests
//!
//! These run on a paused clock with short intervals (tick 100ms, keep-alive
//! 200ms, idle trimming 300ms), so every sleep deterministically lets the
//! maintenance loop run the ticks that fall inside it.

use anyhow::Context;
use pretty_assertions::assert_eq;
use respool::{Pool, PoolError};
use std::time::Duration;

use crate::fixtures::{MockFactory, fast_maintenance_config, init_tracing, scenario_config};

#[tokio::test(start_paused = true)]
async fn test_replenishes_to_init_connections() -> anyhow::Result<()> {
    init_tracing();
    let factory = MockFactory::new();
    let pool = Pool::new(fast_maintenance_config(), factory.clone()).await?;

    pool.release(2).await?;
    assert_eq!(pool.idle_connections(), 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(pool.idle_connections(), 2, "pool should be back at init_connections");
    assert_eq!(factory.created(), 4);

    pool.close().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_replenish_counts_checked_out_connections() -> anyhow::Result<()> {
    let factory = MockFactory::new();
    let pool = Pool::new(fast_maintenance_config(), factory.clone()).await?;

    let a = pool.get().await?;
    let b = pool.get().await?;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(pool.idle_connections(), 0, "used connections count toward init");
    assert_eq!(factory.created(), 2);

    drop((a, b));
    pool.close().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_trims_idle_connections_after_burst() -> anyhow::Result<()> {
    let factory = MockFactory::new();
    let pool = Pool::new(fast_maintenance_config(), factory.clone()).await?;

    let mut held = Vec::new();
    for _ in 0..5 {
        held.push(pool.get().await?);
    }
    for conn in held {
        conn.close().await?;
    }
    assert_eq!(pool.idle_connections(), 5);

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(
        pool.idle_connections(),
        3,
        "idle connections above max_idle_connections should be released"
    );
    assert_eq!(factory.disconnected(), 2);

    // Nothing more to trim, and still above init_connections
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(pool.idle_connections(), 3);
    assert_eq!(factory.live(), 3);

    pool.close().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_keep_alive_replaces_dead_idle_connections() -> anyhow::Result<()> {
    let factory = MockFactory::new();
    let pool = Pool::new(fast_maintenance_config(), factory.clone()).await?;

    factory.set_invalid(true);
    tokio::time::sleep(Duration::from_millis(250)).await;

    let metrics = pool.metrics();
    assert_eq!(metrics.keep_alive_failures, 2);
    assert!(metrics.maintenance_errors >= 2, "failed sweeps are counted");
    assert_eq!(factory.disconnected(), 2);
    assert_eq!(
        pool.idle_connections(),
        2,
        "replenishment should reopen what keep-alive dropped"
    );
    assert_eq!(factory.created(), 4);

    factory.set_invalid(false);
    pool.close().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_keep_alive_keeps_healthy_connections() -> anyhow::Result<()> {
    let factory = MockFactory::new();
    let pool = Pool::new(fast_maintenance_config(), factory.clone()).await?;

    tokio::time::sleep(Duration::from_millis(450)).await;

    assert!(factory.validations() >= 4, "two sweeps over two idle connections");
    assert_eq!(factory.disconnected(), 0);
    assert_eq!(factory.created(), 2);
    assert_eq!(pool.idle_connections(), 2);
    assert_eq!(pool.metrics().keep_alive_failures, 0);

    pool.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_maintenance_failures_do_not_break_the_pool() -> anyhow::Result<()> {
    let factory = MockFactory::new();
    let pool = Pool::new(scenario_config(), factory.clone()).await?;

    pool.release(2).await?;
    factory.set_fail_open(true);

    let err = pool
        .run_maintenance()
        .await
        .err()
        .context("replenishment should fail")?;
    match err {
        PoolError::Aggregate(errors) => assert_eq!(errors.len(), 2),
        other => anyhow::bail!("expected aggregate error, got {other}"),
    }
    assert!(pool.metrics().maintenance_errors >= 2);
    assert!(!pool.is_closed());
    assert_eq!(pool.stats().total(), 0, "failed supply must release its slots");

    factory.set_fail_open(false);
    let conn = pool.get().await?;
    drop(conn);
    pool.close().await?;
    Ok(())
}
