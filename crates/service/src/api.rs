//! `SageCoreApi`: the façade surface `sage-mcp`'s tool handlers call through.
//! Grounded on the teacher's `SerialMemoryProvider` trait
//! (`crates/serialmemory-client/src/provider.rs`) for the
//! trait-over-concrete-implementation shape.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use sage_domain::error::Result;
use sage_domain::memory::{MemoryContent, SearchOptions, SessionInfo};

#[async_trait]
pub trait SageCoreApi: Send + Sync {
    async fn save_memory(&self, content: MemoryContent) -> Result<Uuid>;

    async fn search_memory(&self, query: &str, options: SearchOptions) -> Result<Vec<sage_domain::memory::MemoryRecord>>;

    async fn get_context(&self, query: &str, max_results: usize) -> Result<String>;

    async fn manage_session(&self, action: &str, session_id: Option<&str>) -> Result<SessionInfo>;

    /// The full session list, used by the `manage_session{action:"list"}`
    /// tool response alongside the current session's `SessionInfo`.
    async fn list_sessions(&self) -> Result<Vec<SessionInfo>>;

    async fn generate_prompt(&self, context: &str, style: &str) -> Result<String>;

    async fn export_session(&self, session_id: &str, format: &str) -> Result<String>;

    async fn get_status(&self) -> Result<Value>;

    async fn reset_circuit_breaker(&self, breaker_name: Option<&str>, all: bool) -> Result<Value>;
}
