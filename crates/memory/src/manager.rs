//! Memory manager: composes the embedding client and storage layer into
//! save/search orchestration, the Chinese-language context formatter, and
//! session-scoped export. Grounded line-for-line on
//! `sage_core/memory/manager.py::MemoryManager`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{json, Value};
use uuid::Uuid;

use sage_clients::EmbeddingClient;
use sage_db::{DbPool, IsolationLevel, TransactionManager};
use sage_domain::error::{Error, Result};
use sage_domain::memory::{MemoryContent, MemoryRecord, SearchOptions, SearchStrategy, SessionInfo, Statistics};
use sage_resilience::{BreakerCallError, BreakerRegistry, CircuitBreakerConfig, Retryable, RetryPolicy};

use crate::storage::{MemoryStorage, SaveRequest};

pub struct MemoryManager {
    storage: Arc<MemoryStorage>,
    embedding: Arc<EmbeddingClient>,
    db: Arc<DbPool>,
    txm: Arc<TransactionManager>,
    breakers: BreakerRegistry,
    current_session_id: RwLock<String>,
}

impl MemoryManager {
    /// Mints a fresh `current_session_id`, matching `initialize()`'s
    /// `uuid4()` call.
    pub fn new(storage: Arc<MemoryStorage>, embedding: Arc<EmbeddingClient>, db: Arc<DbPool>, txm: Arc<TransactionManager>, breakers: BreakerRegistry) -> Self {
        Self { storage, embedding, db, txm, breakers, current_session_id: RwLock::new(Uuid::new_v4().to_string()) }
    }

    pub fn current_session_id(&self) -> String {
        self.current_session_id.read().clone()
    }

    /// `combined := userInput + "\n" + assistantResponse`; embeds, then
    /// opens a transaction scope (§4.6/§4.8) and runs the dedup probe plus
    /// insert against it as one unit. The whole scope is retried under the
    /// `memory_storage_save` breaker: each retry attempt opens a brand new
    /// transaction, so a transient failure never reuses an already
    /// committed-or-aborted one.
    pub async fn save(&self, content: MemoryContent) -> Result<Uuid> {
        let combined = format!("{}\n{}", content.user_input, content.assistant_response);
        let embedding = self.embedding.vectorize(&combined, true, self.embedding.chunk_size()).await?;

        let session_id = content.session_id.unwrap_or_else(|| self.current_session_id());
        let req = SaveRequest {
            user_input: content.user_input,
            assistant_response: content.assistant_response,
            embedding,
            metadata: content.metadata,
            session_id: Some(session_id),
            is_agent_report: content.is_agent_report,
            agent_metadata: content.agent_metadata,
        };

        let pool = self.db.pool().await?;
        let breaker = self.breakers.get_or_create(
            "memory_storage_save",
            CircuitBreakerConfig { failure_threshold: 5, recovery_timeout: Duration::from_secs(60), ..Default::default() },
        );
        let mut retry = RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(10), sage_resilience::RetryStrategy::Exponential);

        sage_resilience::ResilientCall::run(
            &breaker,
            &mut retry,
            || {
                let storage = self.storage.clone();
                let txm = self.txm.clone();
                let pool = pool.clone();
                let req = req.clone();
                async move {
                    txm.run(&pool, IsolationLevel::ReadCommitted, |txn| {
                        let storage = storage.clone();
                        let req = req.clone();
                        Box::pin(async move { storage.save_in_txn(txn, req).await })
                    })
                    .await
                }
            },
            |e: &Error| if matches!(e, Error::Validation { .. }) { Retryable::No } else { Retryable::Yes },
        )
        .await
        .map_err(|e| match e {
            BreakerCallError::Open(open) => Error::breaker_open(open.0),
            BreakerCallError::Inner(inner) => inner,
        })
    }

    /// `semantic`: vector-only. `recent`: session-scoped or global
    /// created_at-desc. `default`: vector search, then up to `limit/2` text
    /// matches not already present, merged preserving vector rank first,
    /// then re-sorted by similarity (if present) else `created_at desc`,
    /// truncated to `limit`.
    pub async fn search(&self, query: &str, options: SearchOptions) -> Result<Vec<MemoryRecord>> {
        let limit = options.limit.max(1) as i64;
        let session_id = options.session_id.as_deref();

        let mut results = match options.strategy {
            SearchStrategy::Semantic => {
                let vector = self.embedding.vectorize(query, true, self.embedding.chunk_size()).await?;
                self.storage.search_semantic(&vector, limit, session_id).await?
            }
            SearchStrategy::Recent => self.storage.recent(limit, session_id).await?,
            SearchStrategy::Default => {
                let vector = self.embedding.vectorize(query, true, self.embedding.chunk_size()).await?;
                let mut vector_hits = self.storage.search_semantic(&vector, limit, session_id).await?;

                let text_limit = ((limit as f64) / 2.0).ceil() as i64;
                let text_hits = self.storage.search_text(query, text_limit.max(1), session_id).await?;

                let seen: HashSet<Uuid> = vector_hits.iter().map(|r| r.id).collect();
                for hit in text_hits {
                    if !seen.contains(&hit.id) {
                        vector_hits.push(hit);
                    }
                }
                vector_hits
            }
        };

        results.sort_by(|a, b| match (a.similarity, b.similarity) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.created_at.cmp(&a.created_at),
        });
        results.truncate(options.limit.max(1));
        Ok(results)
    }

    /// `default` strategy against the current session, formatted with the
    /// exact Chinese-language section layout.
    pub async fn get_context(&self, query: &str, max_results: usize) -> Result<String> {
        let options = SearchOptions { limit: max_results, strategy: SearchStrategy::Default, session_id: Some(self.current_session_id()) };
        let results = self.search(query, options).await?;

        if results.is_empty() {
            return Ok("没有找到相关的历史记忆。".to_string());
        }

        let mut out = String::from("相关历史记忆：\n");
        for (i, record) in results.iter().enumerate() {
            out.push_str(&format!("\n[记忆 {}]", i + 1));
            out.push_str(&format!("\n时间：{}", record.created_at.to_rfc3339()));
            if let Some(similarity) = record.similarity {
                out.push_str(&format!("\n相关度：{similarity:.2}"));
            }
            out.push_str(&format!("\n用户：{}", record.user_input));
            out.push_str(&format!("\n助手：{}", record.assistant_response));
            out.push('\n');
            out.push_str(&"-".repeat(40));
        }
        Ok(out)
    }

    pub fn switch_session(&self, session_id: String) {
        *self.current_session_id.write() = session_id;
    }

    pub fn create_session(&self) -> String {
        let id = Uuid::new_v4().to_string();
        *self.current_session_id.write() = id.clone();
        id
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let current = self.current_session_id();
        let rows = self.storage.list_sessions().await?;
        Ok(rows
            .into_iter()
            .map(|(session_id, count, first, last)| {
                let is_current = session_id == current;
                SessionInfo { session_id, is_current, memory_count: count, first_memory: first, last_memory: last }
            })
            .collect())
    }

    pub async fn get_session_info(&self, session_id: Option<&str>) -> Result<SessionInfo> {
        let current = self.current_session_id();
        let target = session_id.unwrap_or(&current).to_string();
        let (count, first, last) = self.storage.statistics_for_session(&target).await?;
        Ok(SessionInfo { is_current: target == current, session_id: target, memory_count: count, first_memory: first, last_memory: last })
    }

    pub async fn get_statistics(&self, session_id: Option<&str>) -> Result<Statistics> {
        match session_id {
            Some(sid) => {
                let (total, first, last) = self.storage.statistics_for_session(sid).await?;
                Ok(Statistics { total_memories: total, first_memory: first, last_memory: last, session_count: None })
            }
            None => {
                let (total, first, last) = self.storage.statistics_global().await?;
                let session_count = self.storage.list_sessions().await?.len() as i64;
                Ok(Statistics { total_memories: total, first_memory: first, last_memory: last, session_count: Some(session_count) })
            }
        }
    }

    /// Returns the raw JSON array (`format == "json"`) or a Markdown
    /// document (`format == "markdown"`) of a session's memories.
    pub async fn export_session(&self, session_id: &str, format: &str) -> Result<String> {
        let records = self.storage.recent(i64::MAX, Some(session_id)).await?;

        if format == "markdown" {
            let mut out = String::from("# Sage 会话导出\n\n");
            out.push_str(&format!("会话 ID：{session_id}\n\n"));
            out.push_str(&format!("导出时间：{}\n\n", Utc::now().to_rfc3339()));
            for (i, record) in records.iter().enumerate() {
                out.push_str(&format!("## 记忆 {}\n\n", i + 1));
                out.push_str(&format!("- 时间：{}\n", record.created_at.to_rfc3339()));
                out.push_str(&format!("- 用户：{}\n", record.user_input));
                out.push_str(&format!("- 助手：{}\n\n", record.assistant_response));
            }
            Ok(out)
        } else {
            let values: Vec<Value> = records
                .into_iter()
                .map(|r| {
                    json!({
                        "id": r.id,
                        "session_id": r.session_id,
                        "user_input": r.user_input,
                        "assistant_response": r.assistant_response,
                        "metadata": r.metadata,
                        "created_at": r.created_at.to_rfc3339(),
                    })
                })
                .collect();
            Ok(serde_json::to_string_pretty(&values).unwrap_or_else(|_| "[]".to_string()))
        }
    }
}
