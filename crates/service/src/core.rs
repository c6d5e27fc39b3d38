//! `CoreService`: the single façade instance chaining config → DB pool →
//! embedding client → memory manager → session manager, per §4.9. Grounded
//! on `sage_core/core_service.py::SageCore`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use sage_clients::{EmbeddingClient, GeneratorClient};
use sage_db::{DbPool, TransactionManager};
use sage_domain::clock::SystemClock;
use sage_domain::config::SageConfig;
use sage_domain::error::{Error, Result};
use sage_domain::memory::{MemoryContent, MemoryRecord, SearchOptions, SessionInfo};
use sage_memory::{MemoryManager, MemoryStorage};
use sage_resilience::BreakerRegistry;
use sage_sessions::SessionManager;

use crate::api::SageCoreApi;

#[derive(Clone)]
struct Components {
    db: Arc<DbPool>,
    embedding: Arc<EmbeddingClient>,
    generator: Arc<GeneratorClient>,
    memory: Arc<MemoryManager>,
    sessions: Arc<SessionManager>,
    txm: Arc<TransactionManager>,
    started_at: DateTime<Utc>,
}

pub struct CoreService {
    breakers: BreakerRegistry,
    state: tokio::sync::RwLock<Option<Components>>,
}

impl Default for CoreService {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreService {
    pub fn new() -> Self {
        Self { breakers: BreakerRegistry::new(), state: tokio::sync::RwLock::new(None) }
    }

    /// Idempotent: a second call while already initialized is a no-op,
    /// matching the source's early `if self._initialized: return`.
    pub async fn initialize(&self, config: SageConfig) -> Result<()> {
        if self.state.read().await.is_some() {
            return Ok(());
        }

        tracing::info!("initializing sage core service");

        let db = Arc::new(DbPool::new(config.database, self.breakers.clone()));
        db.connect().await?;

        let embedding = Arc::new(EmbeddingClient::new(config.embedding, self.breakers.clone())?);
        let generator = Arc::new(GeneratorClient::new(config.generator, self.breakers.clone()));

        let storage = Arc::new(MemoryStorage::new(db.clone(), self.breakers.clone(), Arc::new(SystemClock)));
        let txm = TransactionManager::new();
        let memory = Arc::new(MemoryManager::new(storage, embedding.clone(), db.clone(), txm.clone(), self.breakers.clone()));
        let sessions = Arc::new(SessionManager::new(memory.clone()));

        *self.state.write().await = Some(Components { db, embedding, generator, memory, sessions, txm, started_at: Utc::now() });
        tracing::info!("sage core service initialized");
        Ok(())
    }

    async fn components(&self) -> Result<Components> {
        self.state.read().await.clone().ok_or_else(|| Error::configuration("service not initialized, call initialize() first"))
    }

    /// Awaits in-flight transactions, then drops the DB pool.
    pub async fn cleanup(&self) -> Result<()> {
        let mut guard = self.state.write().await;
        if let Some(components) = guard.take() {
            components.txm.wait_for_all(std::time::Duration::from_secs(30)).await?;
            components.db.close().await;
            tracing::info!("sage core service cleaned up");
        }
        Ok(())
    }
}

#[async_trait]
impl SageCoreApi for CoreService {
    async fn save_memory(&self, content: MemoryContent) -> Result<Uuid> {
        let c = self.components().await?;
        c.memory.save(content).await
    }

    async fn search_memory(&self, query: &str, options: SearchOptions) -> Result<Vec<MemoryRecord>> {
        let c = self.components().await?;
        c.memory.search(query, options).await
    }

    async fn get_context(&self, query: &str, max_results: usize) -> Result<String> {
        let c = self.components().await?;
        c.memory.get_context(query, max_results).await
    }

    /// `create`/`switch`/`info`/`list`, per §4.10's `manage_session` schema.
    async fn manage_session(&self, action: &str, session_id: Option<&str>) -> Result<SessionInfo> {
        let c = self.components().await?;
        match action {
            "create" => {
                let new_id = c.sessions.create();
                c.sessions.info(Some(&new_id)).await
            }
            "switch" => {
                let target = session_id.ok_or_else(|| Error::validation("switching sessions requires session_id"))?;
                c.sessions.switch(target.to_string());
                c.sessions.info(Some(target)).await
            }
            "info" => c.sessions.info(session_id).await,
            "list" => {
                // `all_sessions` is surfaced by the tool layer alongside
                // this record; SessionInfo carries no free-form metadata bag
                // of its own (unlike the Python source's dict-shaped return).
                c.sessions.info(None).await
            }
            other => Err(Error::validation(format!("unknown session action: {other}"))),
        }
    }

    /// Keyword-free, style-keyed random pick from a fixed phrase set, per
    /// `core_service.py::generate_prompt`.
    async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let c = self.components().await?;
        c.sessions.list().await
    }

    async fn generate_prompt(&self, _context: &str, style: &str) -> Result<String> {
        use rand::seq::SliceRandom;
        let phrases: &[&str] = match style {
            "question" => &["基于以上信息，您还想了解什么？", "有什么具体的问题需要深入探讨吗？", "这些信息中哪个部分您最感兴趣？"],
            "suggestion" => &["也许您可以尝试...", "根据历史记录，建议您...", "下一步可以考虑..."],
            _ => &["有什么我可以帮助您的吗？", "请告诉我您的想法。", "让我们继续探讨这个话题。"],
        };
        let mut rng = rand::thread_rng();
        Ok(phrases.choose(&mut rng).copied().unwrap_or(phrases[0]).to_string())
    }

    async fn export_session(&self, session_id: &str, format: &str) -> Result<String> {
        let c = self.components().await?;
        c.sessions.export(session_id, format).await
    }

    async fn get_status(&self) -> Result<Value> {
        let guard = self.state.read().await;
        let Some(c) = guard.as_ref() else {
            return Ok(json!({ "initialized": false, "service": "sage_core" }));
        };

        let stats = c.memory.get_statistics(None).await.ok();
        Ok(json!({
            "initialized": true,
            "service": "sage_core",
            "uptime_seconds": (Utc::now() - c.started_at).num_seconds(),
            "components": {
                "database": true,
                "embedding": true,
                "memory_manager": true,
                "session_manager": true,
            },
            "current_session": c.sessions.current(),
            "statistics": stats,
            "circuit_breakers": self.breakers.all_stats(),
        }))
    }

    async fn reset_circuit_breaker(&self, breaker_name: Option<&str>, all: bool) -> Result<Value> {
        if all {
            self.breakers.reset_all();
            return Ok(json!({ "reset": "all" }));
        }
        let name = breaker_name.ok_or_else(|| Error::validation("reset_circuit_breaker requires breaker_name unless all=true"))?;
        self.breakers.reset(name);
        Ok(json!({ "reset": name }))
    }
}
