//! Top-level JSON-RPC dispatch table for the MCP tool server, per §4.10.
//! Grounded on `sage_mcp_stdio_single.py`'s `handle_list_tools` /
//! `handle_call_tool` / `handle_list_resources` / `handle_read_resource`
//! registration, collapsed into one dispatch function shared by the stdio
//! and HTTP/SSE transports.

pub mod protocol;
pub mod tools;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

use sage_domain::memory::{SearchOptions, SearchStrategy};
use sage_service::SageCoreApi;
use serde_json::{json, Value};

/// Dispatches one decoded request to its handler and returns the response
/// to send back, or `None` for a notification (no `id`, no reply).
pub async fn handle_request(core: &dyn SageCoreApi, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    if request.is_notification() {
        return None;
    }
    let id = request.id.clone().unwrap_or(Value::Null);

    let outcome = match request.method.as_str() {
        "initialize" => Ok(protocol::server_initialize_result()),
        "tools/list" => serde_json::to_value(tools::tools_list().tools)
            .map(|tools| json!({ "tools": tools }))
            .map_err(|e| JsonRpcError::internal_error(e.to_string())),
        "tools/call" => handle_tools_call(core, request.params).await,
        "resources/list" => handle_resources_list(core).await,
        "resources/read" => handle_resources_read(core, request.params).await,
        other => Err(JsonRpcError::method_not_found(other)),
    };

    Some(match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(id, error),
    })
}

async fn handle_tools_call(core: &dyn SageCoreApi, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let params = params.ok_or_else(|| JsonRpcError::invalid_params("tools/call requires params"))?;
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| JsonRpcError::invalid_params("tools/call requires params.name"))?;
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    let result = tools::call_tool(core, name, arguments).await?;
    serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

/// Lists the current session, the all-sessions index, and system status as
/// `sage://` resource URIs, matching `handle_list_resources`.
async fn handle_resources_list(core: &dyn SageCoreApi) -> Result<Value, JsonRpcError> {
    let session = core
        .manage_session("info", None)
        .await
        .map_err(|e| JsonRpcError::from_domain_error(&e))?;

    Ok(json!({
        "resources": [
            {
                "uri": format!("sage://session/{}", session.session_id),
                "name": format!("当前会话 ({} 条记忆)", session.memory_count),
                "description": "当前活跃的会话",
                "mimeType": "application/json",
            },
            {
                "uri": "sage://sessions/list",
                "name": "所有会话列表",
                "description": "系统中所有会话的列表",
                "mimeType": "application/json",
            },
            {
                "uri": "sage://system/status",
                "name": "系统状态",
                "description": "Sage 系统的当前状态",
                "mimeType": "application/json",
            },
        ]
    }))
}

async fn handle_resources_read(core: &dyn SageCoreApi, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let params = params.ok_or_else(|| JsonRpcError::invalid_params("resources/read requires params"))?;
    let uri = params
        .get("uri")
        .and_then(Value::as_str)
        .ok_or_else(|| JsonRpcError::invalid_params("resources/read requires params.uri"))?;

    let text = if let Some(session_id) = uri.strip_prefix("sage://session/") {
        let options = SearchOptions { limit: 10, strategy: SearchStrategy::Recent, session_id: Some(session_id.to_string()) };
        let memories = core
            .search_memory("", options)
            .await
            .map_err(|e| JsonRpcError::from_domain_error(&e))?;
        serde_json::to_string_pretty(&json!({
            "session_id": session_id,
            "memory_count": memories.len(),
            "memories": memories,
        }))
    } else if uri == "sage://sessions/list" {
        let sessions = core.list_sessions().await.map_err(|e| JsonRpcError::from_domain_error(&e))?;
        serde_json::to_string_pretty(&sessions)
    } else if uri == "sage://system/status" {
        let status = core.get_status().await.map_err(|e| JsonRpcError::from_domain_error(&e))?;
        serde_json::to_string_pretty(&status)
    } else {
        return Err(JsonRpcError::invalid_params(format!("unknown resource URI: {uri}")));
    }
    .map_err(|e| JsonRpcError::internal_error(e.to_string()))?;

    Ok(json!({
        "contents": [{
            "uri": uri,
            "mimeType": "application/json",
            "text": text,
        }]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sage_domain::error::Result;
    use sage_domain::memory::{MemoryContent, MemoryRecord, SessionInfo};
    use uuid::Uuid;

    struct StubCore;

    #[async_trait]
    impl SageCoreApi for StubCore {
        async fn save_memory(&self, _content: MemoryContent) -> Result<Uuid> {
            Ok(Uuid::nil())
        }
        async fn search_memory(&self, _query: &str, _options: SearchOptions) -> Result<Vec<MemoryRecord>> {
            Ok(vec![])
        }
        async fn get_context(&self, _query: &str, _max_results: usize) -> Result<String> {
            Ok("没有找到相关的历史记忆。".into())
        }
        async fn manage_session(&self, _action: &str, _session_id: Option<&str>) -> Result<SessionInfo> {
            Ok(SessionInfo { session_id: "s1".into(), is_current: true, memory_count: 0, first_memory: None, last_memory: None })
        }
        async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
            Ok(vec![])
        }
        async fn generate_prompt(&self, _context: &str, _style: &str) -> Result<String> {
            Ok("continue?".into())
        }
        async fn export_session(&self, _session_id: &str, _format: &str) -> Result<String> {
            Ok("{}".into())
        }
        async fn get_status(&self) -> Result<Value> {
            Ok(json!({ "initialized": true }))
        }
        async fn reset_circuit_breaker(&self, _breaker_name: Option<&str>, _all: bool) -> Result<Value> {
            Ok(json!({ "reset": true }))
        }
    }

    #[tokio::test]
    async fn notification_yields_no_response() {
        let req = JsonRpcRequest { jsonrpc: "2.0".into(), id: None, method: "notifications/initialized".into(), params: None };
        assert!(handle_request(&StubCore, req).await.is_none());
    }

    #[tokio::test]
    async fn tools_list_returns_seven_tools() {
        let req = JsonRpcRequest { jsonrpc: "2.0".into(), id: Some(json!(1)), method: "tools/list".into(), params: None };
        let resp = handle_request(&StubCore, req).await.unwrap();
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 7);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let req = JsonRpcRequest { jsonrpc: "2.0".into(), id: Some(json!(1)), method: "bogus/method".into(), params: None };
        let resp = handle_request(&StubCore, req).await.unwrap();
        assert_eq!(resp.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn resources_list_includes_current_session() {
        let req = JsonRpcRequest { jsonrpc: "2.0".into(), id: Some(json!(1)), method: "resources/list".into(), params: None };
        let resp = handle_request(&StubCore, req).await.unwrap();
        let resources = resp.result.unwrap()["resources"].as_array().unwrap().len();
        assert_eq!(resources, 3);
    }
}
