//! Memory storage: the write path (validation, fingerprinting, dedup,
//! metadata normalization, agent-report resolution, insert) and the read
//! paths (vector KNN, text search, by-id, by-session, statistics).
//! Grounded line-for-line on `sage_core/memory/storage.py::MemoryStorage`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde_json::{Map, Value};
use tokio_postgres::Row;
use tokio_postgres::Transaction as PgTransaction;
use uuid::Uuid;

use sage_db::DbPool;
use sage_domain::clock::Clock;
use sage_domain::error::{Error, Result};
use sage_domain::memory::{MemoryRecord, EMBEDDING_DIM};
use sage_resilience::{BreakerCallError, BreakerRegistry, CircuitBreakerConfig, Retryable, RetryPolicy};
use std::time::Duration;

use crate::metadata::{differs_on_dedup_keys, fingerprint, normalize};

#[derive(Clone)]
pub struct SaveRequest {
    pub user_input: String,
    pub assistant_response: String,
    pub embedding: Vec<f32>,
    pub metadata: Map<String, Value>,
    pub session_id: Option<String>,
    pub is_agent_report: bool,
    pub agent_metadata: Option<Value>,
}

pub struct MemoryStorage {
    db: Arc<DbPool>,
    breakers: BreakerRegistry,
    clock: Arc<dyn Clock>,
}

impl MemoryStorage {
    pub fn new(db: Arc<DbPool>, breakers: BreakerRegistry, clock: Arc<dyn Clock>) -> Self {
        Self { db, breakers, clock }
    }

    /// Validates, fingerprints, probes for a duplicate, normalizes metadata,
    /// resolves the agent-report flag, and inserts - or returns an existing
    /// row's id on a dedup hit. The probe and the insert both run against
    /// `txn`, so a concurrent caller's probe can never observe "no
    /// duplicate" while this call's insert is still uncommitted - the two
    /// statements commit or roll back as one unit (§4.6). The caller (see
    /// `sage-memory::manager`) opens `txn` via `sage_db::TransactionManager`
    /// and is responsible for the retry/breaker wrapping around the whole
    /// transaction attempt.
    pub async fn save_in_txn(&self, txn: &PgTransaction<'_>, req: SaveRequest) -> Result<Uuid> {
        if req.user_input.trim().is_empty() && req.assistant_response.trim().is_empty() {
            return Err(Error::validation("both user_input and assistant_response are empty"));
        }
        if req.embedding.is_empty() {
            return Err(Error::validation("embedding is required"));
        }
        if req.embedding.len() != EMBEDDING_DIM {
            return Err(Error::validation(format!(
                "embedding dimension mismatch: expected {}, got {}",
                EMBEDDING_DIM,
                req.embedding.len()
            )));
        }
        if let Some(sid) = &req.session_id {
            if sid.is_empty() {
                return Err(Error::validation("session_id must not be the empty string"));
            }
        }

        let now = self.clock.now();
        let fp = fingerprint(&req.user_input, &req.assistant_response, now);

        if let Some(existing_id) = self.find_duplicate_in_txn(txn, &fp, &req.session_id, &req.metadata).await? {
            return Ok(existing_id);
        }

        let (is_agent_report, agent_metadata, mut metadata) = resolve_agent_report(req.is_agent_report, req.agent_metadata, req.metadata);
        metadata.insert("content_hash".to_string(), Value::String(fp.content_hash.clone()));
        metadata.insert("time_aware_hash".to_string(), Value::String(fp.time_aware_hash.clone()));
        metadata.insert("time_window".to_string(), Value::String(fp.time_window.clone()));
        let metadata = normalize(metadata);

        let vector = Vector::from(req.embedding);
        let metadata_json = Value::Object(metadata);

        let row = txn
            .query_one(
                "insert into memories
                    (session_id, user_input, assistant_response, embedding, metadata, is_agent_report, agent_metadata)
                 values ($1, $2, $3, $4, $5, $6, $7)
                 returning id",
                &[&req.session_id, &req.user_input, &req.assistant_response, &vector, &metadata_json, &is_agent_report, &agent_metadata],
            )
            .await
            .map_err(|e| Error::database_connection(format!("insert failed: {e}")))?;

        Ok(row.get::<_, Uuid>("id"))
    }

    /// §4.6 dedup probe: matches the same SQL shape as the source, compares
    /// the matched row's metadata against the incoming metadata on
    /// `{tool_calls, message_count, thinking_content}`. Runs against `txn`
    /// so it sees `save_in_txn`'s own prior inserts within the same
    /// transaction and nothing a concurrent, not-yet-committed transaction
    /// has written.
    async fn find_duplicate_in_txn(
        &self,
        txn: &PgTransaction<'_>,
        fp: &crate::metadata::Fingerprint,
        session_id: &Option<String>,
        incoming_metadata: &Map<String, Value>,
    ) -> Result<Option<Uuid>> {
        let row = txn
            .query_opt(
                "select id, created_at, metadata from memories
                 where (metadata->>'content_hash' = $1 or metadata->>'time_aware_hash' = $2)
                   and session_id is not distinct from $3
                   and created_at > now() - interval '2 hours'
                 order by created_at desc limit 1",
                &[&fp.content_hash, &fp.time_aware_hash, session_id],
            )
            .await
            .map_err(|e| Error::database_connection(format!("dedup probe failed: {e}")))?;

        let Some(row) = row else { return Ok(None) };
        let existing_metadata: Value = row.get("metadata");
        if differs_on_dedup_keys(&existing_metadata, incoming_metadata) {
            return Ok(None);
        }
        Ok(Some(row.get::<_, Uuid>("id")))
    }

    /// Vector KNN, cosine distance, similarity reported as `1 - distance`.
    /// Wrapped in retry+breaker via `sage-db::ops`.
    /// Wrapped in the `memory_storage_search` breaker, layered on top of
    /// `sage-db::ops::fetch`'s own `database_fetch` breaker, matching the
    /// source's storage-level breaker sitting outside the connection-level
    /// one.
    pub async fn search_semantic(&self, embedding: &[f32], limit: i64, session_id: Option<&str>) -> Result<Vec<MemoryRecord>> {
        guarded(&self.breakers, "memory_storage_search", || self.search_semantic_inner(embedding, limit, session_id)).await
    }

    async fn search_semantic_inner(&self, embedding: &[f32], limit: i64, session_id: Option<&str>) -> Result<Vec<MemoryRecord>> {
        let vector = Vector::from(embedding.to_vec());
        let sql = match session_id {
            Some(_) => {
                "select id, session_id, user_input, assistant_response, metadata, is_agent_report, agent_metadata, created_at,
                        1 - (embedding <=> $1) as similarity
                 from memories
                 where session_id = $2
                 order by embedding <=> $1
                 limit $3"
            }
            None => {
                "select id, session_id, user_input, assistant_response, metadata, is_agent_report, agent_metadata, created_at,
                        1 - (embedding <=> $1) as similarity
                 from memories
                 order by embedding <=> $1
                 limit $2"
            }
        };

        let rows = match session_id {
            Some(sid) => sage_db::ops::fetch(&self.db, &self.breakers, sql, &[&vector, &sid, &limit]).await?,
            None => sage_db::ops::fetch(&self.db, &self.breakers, sql, &[&vector, &limit]).await?,
        };

        Ok(rows.iter().map(row_to_record_with_similarity).collect())
    }

    /// `ILIKE '%q%'` against both input/response columns, wrapped in the
    /// `memory_storage_text_search` breaker.
    pub async fn search_text(&self, query: &str, limit: i64, session_id: Option<&str>) -> Result<Vec<MemoryRecord>> {
        guarded(&self.breakers, "memory_storage_text_search", || self.search_text_inner(query, limit, session_id)).await
    }

    async fn search_text_inner(&self, query: &str, limit: i64, session_id: Option<&str>) -> Result<Vec<MemoryRecord>> {
        let pattern = format!("%{query}%");
        let sql = match session_id {
            Some(_) => {
                "select id, session_id, user_input, assistant_response, metadata, is_agent_report, agent_metadata, created_at
                 from memories
                 where session_id = $1 and (user_input ilike $2 or assistant_response ilike $2)
                 order by created_at desc
                 limit $3"
            }
            None => {
                "select id, session_id, user_input, assistant_response, metadata, is_agent_report, agent_metadata, created_at
                 from memories
                 where user_input ilike $1 or assistant_response ilike $1
                 order by created_at desc
                 limit $2"
            }
        };

        let rows = match session_id {
            Some(sid) => sage_db::ops::fetch(&self.db, &self.breakers, sql, &[&sid, &pattern, &limit]).await?,
            None => sage_db::ops::fetch(&self.db, &self.breakers, sql, &[&pattern, &limit]).await?,
        };

        Ok(rows.iter().map(row_to_record).collect())
    }

    pub async fn recent(&self, limit: i64, session_id: Option<&str>) -> Result<Vec<MemoryRecord>> {
        let sql = match session_id {
            Some(_) => {
                "select id, session_id, user_input, assistant_response, metadata, is_agent_report, agent_metadata, created_at
                 from memories where session_id = $1 order by created_at desc limit $2"
            }
            None => {
                "select id, session_id, user_input, assistant_response, metadata, is_agent_report, agent_metadata, created_at
                 from memories order by created_at desc limit $1"
            }
        };
        let rows = match session_id {
            Some(sid) => sage_db::ops::fetch(&self.db, &self.breakers, sql, &[&sid, &limit]).await?,
            None => sage_db::ops::fetch(&self.db, &self.breakers, sql, &[&limit]).await?,
        };
        Ok(rows.iter().map(row_to_record).collect())
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<MemoryRecord>> {
        let row = sage_db::ops::fetch_row(
            &self.db,
            &self.breakers,
            "select id, session_id, user_input, assistant_response, metadata, is_agent_report, agent_metadata, created_at
             from memories where id = $1",
            &[&id],
        )
        .await?;
        Ok(row.map(|r| row_to_record(&r)))
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let affected = sage_db::ops::execute(&self.db, &self.breakers, "delete from memories where id = $1", &[&id]).await?;
        Ok(affected > 0)
    }

    /// `GROUP BY session_id`, one row per session.
    pub async fn list_sessions(&self) -> Result<Vec<(String, i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>)>> {
        let rows = sage_db::ops::fetch(
            &self.db,
            &self.breakers,
            "select session_id, count(*) as cnt, min(created_at) as first_memory, max(created_at) as last_memory
             from memories where session_id is not null group by session_id",
            &[],
        )
        .await?;

        Ok(rows
            .iter()
            .map(|r| (r.get::<_, String>("session_id"), r.get::<_, i64>("cnt"), r.get("first_memory"), r.get("last_memory")))
            .collect())
    }

    /// `scope=session` returns `(total, first, last)`; `scope=global` also
    /// needs `session_count`, computed by the caller via `list_sessions`.
    pub async fn statistics_for_session(&self, session_id: &str) -> Result<(i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let row = sage_db::ops::fetch_row(
            &self.db,
            &self.breakers,
            "select count(*) as total, min(created_at) as first_memory, max(created_at) as last_memory
             from memories where session_id = $1",
            &[&session_id],
        )
        .await?;
        match row {
            Some(r) => Ok((r.get("total"), r.get("first_memory"), r.get("last_memory"))),
            None => Ok((0, None, None)),
        }
    }

    pub async fn statistics_global(&self) -> Result<(i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let row = sage_db::ops::fetch_row(
            &self.db,
            &self.breakers,
            "select count(*) as total, min(created_at) as first_memory, max(created_at) as last_memory from memories",
            &[],
        )
        .await?;
        match row {
            Some(r) => Ok((r.get("total"), r.get("first_memory"), r.get("last_memory"))),
            None => Ok((0, None, None)),
        }
    }
}

async fn guarded<T, F, Fut>(breakers: &BreakerRegistry, name: &str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let breaker = breakers.get_or_create(name, CircuitBreakerConfig { failure_threshold: 5, recovery_timeout: Duration::from_secs(60), ..Default::default() });
    let mut retry = RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(10), sage_resilience::RetryStrategy::Exponential);
    // Validation failures are not transient and fail fast per §7's
    // propagation policy; everything else (backend/connection faults) is
    // retried.
    sage_resilience::ResilientCall::run(&breaker, &mut retry, op, |e: &Error| {
        if matches!(e, Error::Validation { .. }) { Retryable::No } else { Retryable::Yes }
    })
    .await
        .map_err(|e| match e {
            BreakerCallError::Open(open) => Error::breaker_open(open.0),
            BreakerCallError::Inner(inner) => inner,
        })
}

fn resolve_agent_report(is_agent_report_arg: bool, agent_metadata_arg: Option<Value>, mut metadata: Map<String, Value>) -> (bool, Option<Value>, Map<String, Value>) {
    if let Some(agent_metadata) = agent_metadata_arg {
        return (true, Some(agent_metadata), metadata);
    }
    if let Some(lifted) = metadata.remove("agent_metadata") {
        return (true, Some(lifted), metadata);
    }
    let explicit_in_metadata = matches!(metadata.get("is_agent_report"), Some(Value::Bool(true)));
    (is_agent_report_arg || explicit_in_metadata, None, metadata)
}

fn row_to_record(row: &Row) -> MemoryRecord {
    MemoryRecord {
        id: row.get("id"),
        session_id: row.get("session_id"),
        user_input: row.get("user_input"),
        assistant_response: row.get("assistant_response"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        similarity: None,
        is_agent_report: row.get("is_agent_report"),
        agent_metadata: row.get("agent_metadata"),
    }
}

fn row_to_record_with_similarity(row: &Row) -> MemoryRecord {
    let mut record = row_to_record(row);
    // Postgres promotes `1 - (vector <=> vector)` (int minus real) to
    // double precision; read as f64 and narrow for the domain type.
    record.similarity = Some(row.get::<_, f64>("similarity") as f32);
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_metadata_argument_forces_is_agent_report() {
        let (flag, lifted, _) = resolve_agent_report(false, Some(Value::String("a".into())), Map::new());
        assert!(flag);
        assert_eq!(lifted, Some(Value::String("a".into())));
    }

    #[test]
    fn legacy_metadata_agent_metadata_is_lifted_out() {
        let mut metadata = Map::new();
        metadata.insert("agent_metadata".into(), Value::String("legacy".into()));
        let (flag, lifted, remaining) = resolve_agent_report(false, None, metadata);
        assert!(flag);
        assert_eq!(lifted, Some(Value::String("legacy".into())));
        assert!(!remaining.contains_key("agent_metadata"));
    }

    #[test]
    fn explicit_flag_or_metadata_flag_wins_when_no_agent_metadata_present() {
        let mut metadata = Map::new();
        metadata.insert("is_agent_report".into(), Value::Bool(true));
        let (flag, lifted, _) = resolve_agent_report(false, None, metadata);
        assert!(flag);
        assert_eq!(lifted, None);

        let (flag2, _, _) = resolve_agent_report(true, None, Map::new());
        assert!(flag2);

        let (flag3, _, _) = resolve_agent_report(false, None, Map::new());
        assert!(!flag3);
    }
}
