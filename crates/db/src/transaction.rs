//! Transaction manager: isolation levels, an active-transaction registry
//! keyed by task identity, and `wait_for_all`, grounded on
//! `sage_core/database/transaction.py::TransactionManager`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use deadpool_postgres::Pool;
use futures_util::future::BoxFuture;
use tokio_postgres::Transaction as PgTransaction;
use parking_lot::Mutex;
use tokio::task;

use sage_domain::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    fn sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Identifies the logical caller of a transaction, the Rust analogue of the
/// source's `id(asyncio.current_task())` registry key (`tokio::task::Id`
/// scopes correctly to one transaction per spawned task, same as the
/// source's per-asyncio-task registry).
pub type TxId = task::Id;

/// Tracks in-flight transactions so `wait_for_all` can poll for drain
/// during shutdown, the same role as the source's `_active_transactions` set.
#[derive(Default)]
pub struct TransactionManager {
    active: Mutex<HashSet<TxId>>,
}

impl TransactionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    fn current_task_id() -> Result<TxId> {
        task::try_id().ok_or_else(|| Error::database_connection("transaction scope requires a tokio task context"))
    }

    /// Acquires a connection, opens a transaction at `isolation`, registers
    /// it under the current task id, runs `body`, then commits on success
    /// or rolls back on error - mirroring the source's `async with
    /// transaction(...)` context manager.
    pub async fn run<T, F>(self: &Arc<Self>, pool: &Pool, isolation: IsolationLevel, body: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t PgTransaction<'t>) -> BoxFuture<'t, Result<T>>,
    {
        let id = Self::current_task_id()?;
        self.active.lock().insert(id);

        let result = self.run_inner(pool, isolation, body).await;

        self.active.lock().remove(&id);
        result
    }

    async fn run_inner<T, F>(&self, pool: &Pool, isolation: IsolationLevel, body: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t PgTransaction<'t>) -> BoxFuture<'t, Result<T>>,
    {
        let mut client = pool.get().await.map_err(|e| Error::database_connection(e.to_string()))?;
        let txn = client
            .build_transaction()
            .isolation_level(match isolation {
                IsolationLevel::ReadUncommitted => tokio_postgres::IsolationLevel::ReadUncommitted,
                IsolationLevel::ReadCommitted => tokio_postgres::IsolationLevel::ReadCommitted,
                IsolationLevel::RepeatableRead => tokio_postgres::IsolationLevel::RepeatableRead,
                IsolationLevel::Serializable => tokio_postgres::IsolationLevel::Serializable,
            })
            .start()
            .await
            .map_err(|e| Error::database_connection(format!("failed to open transaction ({}): {e}", isolation.sql())))?;

        match body(&txn).await {
            Ok(value) => {
                txn.commit().await.map_err(|e| Error::database_connection(format!("commit failed: {e}")))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::error!(error = %rollback_err, original = %err, "rollback failed after transaction error");
                }
                Err(err)
            }
        }
    }

    /// Polls every 100ms until `active_count()` reaches zero or `timeout`
    /// elapses, matching the source's `wait_for_all_transactions`.
    pub async fn wait_for_all(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.active_count() == 0 {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::timeout(format!(
                    "{} transaction(s) still active after {:?}",
                    self.active_count(),
                    timeout
                )));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_levels_map_to_sql_keywords() {
        assert_eq!(IsolationLevel::ReadUncommitted.sql(), "READ UNCOMMITTED");
        assert_eq!(IsolationLevel::ReadCommitted.sql(), "READ COMMITTED");
        assert_eq!(IsolationLevel::Serializable.sql(), "SERIALIZABLE");
    }

    #[tokio::test]
    async fn wait_for_all_returns_immediately_when_nothing_active() {
        let mgr = TransactionManager::new();
        mgr.wait_for_all(Duration::from_millis(50)).await.unwrap();
    }

    #[tokio::test]
    async fn wait_for_all_times_out_when_registry_never_drains() {
        let mgr = TransactionManager::new();
        mgr.active.lock().insert(task::try_id().unwrap());
        let result = mgr.wait_for_all(Duration::from_millis(50)).await;
        assert!(result.is_err());
    }
}
