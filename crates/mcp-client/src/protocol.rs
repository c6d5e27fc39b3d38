//! JSON-RPC 2.0 types for the MCP tool server.
//!
//! Each message is a single line of JSON (newline-delimited) over stdio, or
//! a JSON POST body over HTTP. Generalized from the teacher's client-side
//! `crates/mcp-client/src/protocol.rs` (which minted its own ids and
//! expected `ClientInfo`) to the server side: the caller's `id` is opaque
//! and echoed back verbatim, never minted here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An inbound JSON-RPC 2.0 call. `id` is `None` for a notification (no
/// response expected); present (and echoed verbatim, including its JSON
/// type) for a request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

fn default_jsonrpc_version() -> String {
    "2.0".to_string()
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0".into(), id, result: Some(result), error: None }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self { jsonrpc: "2.0".into(), id, result: None, error: Some(error) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The JSON-RPC error codes this server emits, per §6.1.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const UNAUTHORIZED: i64 = -32001;
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    pub fn with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        Self { code, message: message.into(), data: Some(data) }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::PARSE_ERROR, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(error_codes::METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    pub fn tool_not_found(name: &str) -> Self {
        Self::new(error_codes::METHOD_NOT_FOUND, format!("unknown tool: {name}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(error_codes::UNAUTHORIZED, message)
    }

    /// Maps a domain error onto its JSON-RPC code per §6.1 /
    /// `sage_domain::error::Error::json_rpc_code`.
    pub fn from_domain_error(err: &sage_domain::error::Error) -> Self {
        Self::new(err.json_rpc_code(), err.to_string())
    }
}

/// A single tool definition returned by `tools/list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolsListResult {
    pub tools: Vec<McpToolDef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl ToolCallContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self { content_type: "text".into(), text: text.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolCallContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn ok(text: impl Into<String>) -> Self {
        Self { content: vec![ToolCallContent::text(text)], is_error: false }
    }

    pub fn err(text: impl Into<String>) -> Self {
        Self { content: vec![ToolCallContent::text(text)], is_error: true }
    }
}

/// The `initialize` method's reply, per §4.10.
pub fn server_initialize_result() -> Value {
    serde_json::json!({
        "protocolVersion": "2024-11-05",
        "serverInfo": { "name": "sage-mcp", "version": env!("CARGO_PKG_VERSION") },
        "capabilities": { "tools": {}, "resources": {} },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_without_id_is_a_notification() {
        let raw = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let req: JsonRpcRequest = serde_json::from_str(raw).unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn request_id_is_echoed_verbatim_including_type() {
        let raw = r#"{"jsonrpc":"2.0","id":"abc-123","method":"tools/list"}"#;
        let req: JsonRpcRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.id, Some(Value::String("abc-123".into())));

        let resp = JsonRpcResponse::success(req.id.unwrap(), serde_json::json!({}));
        let out = serde_json::to_string(&resp).unwrap();
        assert!(out.contains("\"id\":\"abc-123\""));
    }

    #[test]
    fn failure_response_omits_result() {
        let resp = JsonRpcResponse::failure(Value::from(1), JsonRpcError::method_not_found("bogus"));
        let out = serde_json::to_string(&resp).unwrap();
        assert!(!out.contains("\"result\""));
        assert!(out.contains("-32601"));
    }

    #[test]
    fn tool_call_result_ok_and_err() {
        let ok = ToolCallResult::ok("done");
        assert!(!ok.is_error);
        let err = ToolCallResult::err("boom");
        assert!(err.is_error);
    }
}
