//! Session lifecycle façade over `sage-memory`'s `MemoryManager`.
//!
//! The spec's session model has no table or state of its own: a session is
//! just the `session_id` carried on a memory row. This crate exists so
//! `sage-mcp`'s `manage_session` tool has one narrow surface to call instead
//! of reaching into `MemoryManager` directly, matching the teacher's
//! convention of a dedicated session crate sitting between the gateway and
//! the storage layer.

use std::sync::Arc;

use sage_domain::error::Result;
use sage_domain::memory::SessionInfo;
use sage_memory::MemoryManager;

pub struct SessionManager {
    memory: Arc<MemoryManager>,
}

impl SessionManager {
    pub fn new(memory: Arc<MemoryManager>) -> Self {
        Self { memory }
    }

    pub fn current(&self) -> String {
        self.memory.current_session_id()
    }

    pub fn switch(&self, session_id: String) {
        self.memory.switch_session(session_id);
    }

    pub fn create(&self) -> String {
        self.memory.create_session()
    }

    pub async fn list(&self) -> Result<Vec<SessionInfo>> {
        self.memory.list_sessions().await
    }

    pub async fn info(&self, session_id: Option<&str>) -> Result<SessionInfo> {
        self.memory.get_session_info(session_id).await
    }

    pub async fn export(&self, session_id: &str, format: &str) -> Result<String> {
        self.memory.export_session(session_id, format).await
    }
}
