//! Shared memory-record types: the domain model read/written by `sage-memory`
//! and carried across the JSON-RPC boundary by `sage-mcp`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed embedding dimension for the reference deployment (Qwen3-Embedding-8B).
pub const EMBEDDING_DIM: usize = 4096;

/// Inbound payload for a `save` call, before fingerprinting and normalization.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryContent {
    pub user_input: String,
    pub assistant_response: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub is_agent_report: bool,
    #[serde(default)]
    pub agent_metadata: Option<serde_json::Value>,
}

/// A stored row as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub session_id: Option<String>,
    pub user_input: String,
    pub assistant_response: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(default)]
    pub is_agent_report: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Default,
    Semantic,
    Recent,
}

impl Default for SearchStrategy {
    fn default() -> Self {
        SearchStrategy::Default
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: usize,
    pub strategy: SearchStrategy,
    pub session_id: Option<String>,
}

/// Session summary as returned by `list_sessions`/`get_session_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub is_current: bool,
    pub memory_count: i64,
    pub first_memory: Option<DateTime<Utc>>,
    pub last_memory: Option<DateTime<Utc>>,
}

/// Global or per-session statistics, as returned by `get_statistics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub total_memories: i64,
    pub first_memory: Option<DateTime<Utc>>,
    pub last_memory: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_count: Option<i64>,
}
