//! Postgres + pgvector connection pool, schema bootstrap, retry/breaker
//! wrapped query helpers, and the transaction manager.

pub mod ops;
pub mod pool;
pub mod schema;
pub mod transaction;

pub use pool::{DbPool, SharedDbPool};
pub use transaction::{IsolationLevel, TransactionManager, TxId};
