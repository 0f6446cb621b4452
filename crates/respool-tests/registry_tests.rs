//! Process-wide pool slot tests
//!
//! Each test owns its own `static` slot so tests can run in parallel.

use anyhow::Context;
use pretty_assertions::assert_eq;
use respool::{GlobalPool, PoolConfig, PoolError};

use crate::fixtures::{MockFactory, init_tracing, scenario_config};

#[tokio::test]
async fn test_get_before_init_fails() {
    static POOL: GlobalPool<MockFactory> = GlobalPool::new();

    assert!(!POOL.is_initialized());
    assert!(matches!(POOL.get(), Err(PoolError::NotInitialized)));
    let result = POOL.execute(|_conn| async { Ok(()) }).await;
    assert!(matches!(result, Err(PoolError::NotInitialized)));
}

#[tokio::test]
async fn test_init_twice_fails() -> anyhow::Result<()> {
    init_tracing();
    static POOL: GlobalPool<MockFactory> = GlobalPool::new();

    POOL.init(scenario_config(), MockFactory::new()).await?;
    let second = MockFactory::new();
    let err = POOL
        .init(scenario_config(), second.clone())
        .await
        .err()
        .context("second init should fail")?;

    assert!(matches!(err, PoolError::AlreadyInitialized));
    assert_eq!(second.created(), 0, "second pool should never be built");

    POOL.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_execute_returns_connection() -> anyhow::Result<()> {
    static POOL: GlobalPool<MockFactory> = GlobalPool::new();
    POOL.init(scenario_config(), MockFactory::new()).await?;

    let id = POOL.execute(|conn| async move { Ok(conn.id) }).await?;
    assert!(id < 2, "an idle connection should be reused");

    let pool = POOL.get()?;
    assert_eq!(pool.used_connections(), 0);
    assert_eq!(pool.idle_connections(), 2);

    POOL.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_execute_propagates_closure_error() -> anyhow::Result<()> {
    static POOL: GlobalPool<MockFactory> = GlobalPool::new();
    POOL.init(scenario_config(), MockFactory::new()).await?;

    let result: respool::Result<()> = POOL
        .execute(|_conn| async { Err(PoolError::Connection("request failed".into())) })
        .await;
    assert!(matches!(result, Err(PoolError::Connection(_))));
    assert_eq!(POOL.get()?.used_connections(), 0);

    POOL.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_replace_closes_prior_pool() -> anyhow::Result<()> {
    static POOL: GlobalPool<MockFactory> = GlobalPool::new();

    let first = MockFactory::new();
    POOL.init(scenario_config(), first.clone()).await?;
    let prior = POOL.get()?;

    let second = MockFactory::new();
    POOL.replace(PoolConfig::new(3).with_init_connections(3), second.clone())
        .await?;

    assert!(prior.is_closed());
    assert_eq!(first.live(), 0, "prior pool's connections are disconnected");

    let current = POOL.get()?;
    assert_ne!(current.id(), prior.id());
    assert_eq!(current.config().max_connections(), 3);
    assert_eq!(second.created(), 3);

    POOL.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_replace_keeps_prior_pool() -> anyhow::Result<()> {
    static POOL: GlobalPool<MockFactory> = GlobalPool::new();
    POOL.init(scenario_config(), MockFactory::new()).await?;
    let prior = POOL.get()?;

    let broken = MockFactory::new();
    broken.set_fail_open(true);
    let result = POOL.replace(scenario_config(), broken).await;
    assert!(result.is_err());

    let current = POOL.get()?;
    assert_eq!(current.id(), prior.id());
    assert!(!current.is_closed());

    let invalid = PoolConfig::new(2).with_init_connections(9);
    assert!(matches!(
        POOL.replace(invalid, MockFactory::new()).await,
        Err(PoolError::Config(_))
    ));
    assert_eq!(POOL.get()?.id(), prior.id());

    POOL.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_close_empties_slot() -> anyhow::Result<()> {
    static POOL: GlobalPool<MockFactory> = GlobalPool::new();
    let factory = MockFactory::new();
    POOL.init(scenario_config(), factory.clone()).await?;
    let pool = POOL.get()?;

    POOL.close().await?;
    assert!(!POOL.is_initialized());
    assert!(pool.is_closed());
    assert_eq!(factory.live(), 0);

    POOL.close().await?;
    POOL.init(scenario_config(), MockFactory::new()).await?;
    assert!(POOL.is_initialized());
    POOL.close().await?;
    Ok(())
}
