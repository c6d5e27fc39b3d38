//! Connection pool lifecycle, grounded on
//! `sage_core/database/connection.py::DatabaseConnection`.

use std::sync::Arc;
use std::time::Duration;

use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio::sync::Mutex as AsyncMutex;
use tokio_postgres::NoTls;

use sage_domain::config::DbConfig;
use sage_domain::error::{Error, Result};
use sage_resilience::{BreakerCallError, BreakerRegistry, CircuitBreakerConfig, Retryable, RetryPolicy};

use crate::schema;

/// Wraps a `deadpool_postgres::Pool`, mirroring the source's
/// connect-once/idempotent-reconnect contract: `connect()` is safe to call
/// repeatedly and only does work the first time.
pub struct DbPool {
    config: DbConfig,
    breakers: BreakerRegistry,
    inner: AsyncMutex<Option<Pool>>,
}

impl DbPool {
    pub fn new(config: DbConfig, breakers: BreakerRegistry) -> Self {
        Self { config, breakers, inner: AsyncMutex::new(None) }
    }

    /// Establishes the pool and bootstraps the schema if not already done.
    /// Wrapped in `DATABASE_RETRY` plus a `database_connection` breaker, per
    /// the source's `@retry(...)` + `@circuit_breaker("database_connection",
    /// failure_threshold=3, recovery_timeout=30)` stack.
    pub async fn connect(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let breaker = self.breakers.get_or_create(
            "database_connection",
            CircuitBreakerConfig { failure_threshold: 3, recovery_timeout: Duration::from_secs(30), ..Default::default() },
        );
        let mut retry = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(30), sage_resilience::RetryStrategy::Exponential);

        let config = self.config.clone();
        let pool = breaker
            .run(|| async {
                retry
                    .run(
                        || build_pool(&config),
                        |_: &Error| Retryable::Yes,
                    )
                    .await
            })
            .await
            .map_err(map_breaker_err)?;

        {
            let client = pool
                .get()
                .await
                .map_err(|e| Error::database_connection(format!("failed to acquire connection for schema init: {e}")))?;
            schema::initialize(&client)
                .await
                .map_err(|e| Error::database_connection(format!("schema initialization failed: {e}")))?;
        }

        *guard = Some(pool);
        Ok(())
    }

    pub async fn pool(&self) -> Result<Pool> {
        {
            let guard = self.inner.lock().await;
            if let Some(p) = guard.as_ref() {
                return Ok(p.clone());
            }
        }
        self.connect().await?;
        let guard = self.inner.lock().await;
        guard
            .as_ref()
            .cloned()
            .ok_or_else(|| Error::database_connection("pool not initialized after connect"))
    }

    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(pool) = guard.take() {
            pool.close();
        }
    }
}

async fn build_pool(config: &DbConfig) -> Result<Pool> {
    let mut cfg = PoolConfig::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.database.clone());
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.manager = Some(ManagerConfig { recycling_method: RecyclingMethod::Fast });
    cfg.pool = Some(deadpool_postgres::PoolConfig {
        max_size: config.pool_max,
        ..Default::default()
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| Error::database_connection(format!("failed to create connection pool: {e}")))
}

fn map_breaker_err(e: BreakerCallError<Error>) -> Error {
    match e {
        BreakerCallError::Open(open) => Error::breaker_open(open.0),
        BreakerCallError::Inner(inner) => inner,
    }
}

pub type SharedDbPool = Arc<DbPool>;
