//! Retry- and breaker-wrapped query helpers, grounded on
//! `sage_core/database/connection.py`'s `execute`/`fetch`/`fetchrow`/`fetchval`,
//! each decorated `@retry(max_attempts=3, initial_delay=0.5)` plus its own
//! named breaker (`database_execute`/`database_fetch`/`database_fetchrow`/
//! `database_fetchval`, failure_threshold=5, recovery_timeout=60).

use std::time::Duration;

use deadpool_postgres::Pool;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

use sage_domain::error::{Error, Result};
use sage_resilience::{BreakerRegistry, CircuitBreakerConfig, Retryable, RetryPolicy};

use crate::pool::DbPool;

fn query_breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig { failure_threshold: 5, recovery_timeout: Duration::from_secs(60), ..Default::default() }
}

fn query_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(10), sage_resilience::RetryStrategy::Exponential)
}

async fn guarded<T, F, Fut>(breakers: &BreakerRegistry, name: &str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let breaker = breakers.get_or_create(name, query_breaker_config());
    let mut retry = query_retry();
    sage_resilience::ResilientCall::run(&breaker, &mut retry, op, |_: &Error| Retryable::Yes)
        .await
        .map_err(|e| match e {
            sage_resilience::BreakerCallError::Open(open) => Error::breaker_open(open.0),
            sage_resilience::BreakerCallError::Inner(inner) => inner,
        })
}

pub async fn execute(
    db: &DbPool,
    breakers: &BreakerRegistry,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<u64> {
    let pool = db.pool().await?;
    guarded(breakers, "database_execute", || async {
        let client = pool.get().await.map_err(|e| Error::database_connection(e.to_string()))?;
        client.execute(sql, params).await.map_err(|e| Error::database_connection(e.to_string()))
    })
    .await
}

pub async fn fetch(
    db: &DbPool,
    breakers: &BreakerRegistry,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<Vec<Row>> {
    let pool = db.pool().await?;
    guarded(breakers, "database_fetch", || async {
        let client = pool.get().await.map_err(|e| Error::database_connection(e.to_string()))?;
        client.query(sql, params).await.map_err(|e| Error::database_connection(e.to_string()))
    })
    .await
}

pub async fn fetch_row(
    db: &DbPool,
    breakers: &BreakerRegistry,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<Option<Row>> {
    let pool = db.pool().await?;
    guarded(breakers, "database_fetchrow", || async {
        let client = pool.get().await.map_err(|e| Error::database_connection(e.to_string()))?;
        client.query_opt(sql, params).await.map_err(|e| Error::database_connection(e.to_string()))
    })
    .await
}

pub async fn fetch_val<T>(
    db: &DbPool,
    breakers: &BreakerRegistry,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<T>
where
    T: for<'a> tokio_postgres::types::FromSql<'a> + Send + Sync,
{
    let pool = db.pool().await?;
    guarded(breakers, "database_fetchval", || async {
        let client = pool.get().await.map_err(|e| Error::database_connection(e.to_string()))?;
        let row = client.query_one(sql, params).await.map_err(|e| Error::database_connection(e.to_string()))?;
        row.try_get::<_, T>(0).map_err(|e| Error::database_connection(e.to_string()))
    })
    .await
}
