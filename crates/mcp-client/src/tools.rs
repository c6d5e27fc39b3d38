//! The seven MCP tools and their JSON-RPC `tools/call` dispatch, per §4.10.
//! Grounded on `sage_mcp_stdio_single.py`'s tool list/schemas, reconciled
//! with the tool names and argument shapes named in the specification.

use serde::Deserialize;
use serde_json::{json, Value};

use sage_domain::memory::{MemoryContent, SearchOptions, SearchStrategy};
use sage_service::SageCoreApi;

use crate::protocol::{JsonRpcError, McpToolDef, ToolCallResult, ToolsListResult};

pub fn tools_list() -> ToolsListResult {
    ToolsListResult {
        tools: vec![
            McpToolDef {
                name: "save_conversation".into(),
                description: "Save a user prompt / assistant response pair as a memory.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "user_prompt": { "type": "string" },
                        "assistant_response": { "type": "string" },
                        "metadata": { "type": "object" }
                    },
                    "required": ["user_prompt", "assistant_response"]
                }),
            },
            McpToolDef {
                name: "get_context".into(),
                description: "Fetch formatted, semantically relevant memory context for a query.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "max_results": { "type": "integer", "default": 10 }
                    },
                    "required": ["query"]
                }),
            },
            McpToolDef {
                name: "search_memory".into(),
                description: "Search stored memories by vector similarity, text match, or recency.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "limit": { "type": "integer", "default": 10 },
                        "strategy": { "type": "string", "enum": ["default", "semantic", "recent"] },
                        "session_id": { "type": "string" }
                    },
                    "required": ["query"]
                }),
            },
            McpToolDef {
                name: "manage_session".into(),
                description: "Create, switch, inspect, or list conversation sessions.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "action": { "type": "string", "enum": ["create", "switch", "info", "list"] },
                        "session_id": { "type": "string" }
                    },
                    "required": ["action"]
                }),
            },
            McpToolDef {
                name: "generate_prompt".into(),
                description: "Generate a short follow-up prompt in a given style.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "context": { "type": "string" },
                        "style": { "type": "string", "enum": ["default", "question", "suggestion"] }
                    },
                    "required": ["context"]
                }),
            },
            McpToolDef {
                name: "get_status".into(),
                description: "Report service initialization state, component health, and statistics.".into(),
                input_schema: json!({ "type": "object", "properties": {} }),
            },
            McpToolDef {
                name: "reset_circuit_breaker".into(),
                description: "Reset one named circuit breaker, or all of them.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "all": { "type": "boolean" },
                        "breaker_name": { "type": "string" }
                    }
                }),
            },
        ],
    }
}

#[derive(Deserialize)]
struct SaveConversationArgs {
    user_prompt: String,
    assistant_response: String,
    #[serde(default)]
    metadata: serde_json::Map<String, Value>,
}

#[derive(Deserialize)]
struct GetContextArgs {
    query: String,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

fn default_max_results() -> usize {
    10
}

#[derive(Deserialize)]
struct SearchMemoryArgs {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

fn default_limit() -> usize {
    10
}

#[derive(Deserialize)]
struct ManageSessionArgs {
    action: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct GeneratePromptArgs {
    context: String,
    #[serde(default = "default_style")]
    style: String,
}

fn default_style() -> String {
    "default".to_string()
}

#[derive(Deserialize, Default)]
struct ResetCircuitBreakerArgs {
    #[serde(default)]
    all: bool,
    #[serde(default)]
    breaker_name: Option<String>,
}

fn parse_strategy(raw: Option<&str>) -> SearchStrategy {
    match raw {
        Some("semantic") => SearchStrategy::Semantic,
        Some("recent") => SearchStrategy::Recent,
        _ => SearchStrategy::Default,
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(arguments: Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(arguments).map_err(|e| JsonRpcError::invalid_params(format!("invalid tool arguments: {e}")))
}

/// `params.name` dispatch for `tools/call`. An unrecognized tool name maps
/// to `-32601`; bad arguments map to `-32602`; a known tool's own failure
/// (a domain error surfaced while running the handler) is mapped through
/// `Error::json_rpc_code` - `-32602` for validation failures, `-32603` for
/// everything else - per §4.10/§6.1.
pub async fn call_tool(core: &dyn SageCoreApi, name: &str, arguments: Value) -> Result<ToolCallResult, JsonRpcError> {
    match name {
        "save_conversation" => {
            let args: SaveConversationArgs = parse_args(arguments)?;
            let content = MemoryContent {
                user_input: args.user_prompt,
                assistant_response: args.assistant_response,
                metadata: args.metadata,
                ..Default::default()
            };
            match core.save_memory(content).await {
                Ok(id) => Ok(ToolCallResult::ok(format!("对话已保存，记忆ID: {id}"))),
                Err(e) => Err(JsonRpcError::from_domain_error(&e)),
            }
        }
        "get_context" => {
            let args: GetContextArgs = parse_args(arguments)?;
            match core.get_context(&args.query, args.max_results).await {
                Ok(text) => Ok(ToolCallResult::ok(text)),
                Err(e) => Err(JsonRpcError::from_domain_error(&e)),
            }
        }
        "search_memory" => {
            let args: SearchMemoryArgs = parse_args(arguments)?;
            let options = SearchOptions { limit: args.limit, strategy: parse_strategy(args.strategy.as_deref()), session_id: args.session_id };
            match core.search_memory(&args.query, options).await {
                Ok(records) => Ok(ToolCallResult::ok(serde_json::to_string_pretty(&records).unwrap_or_default())),
                Err(e) => Err(JsonRpcError::from_domain_error(&e)),
            }
        }
        "manage_session" => {
            let args: ManageSessionArgs = parse_args(arguments)?;
            match core.manage_session(&args.action, args.session_id.as_deref()).await {
                Ok(info) => {
                    let mut payload = serde_json::to_value(&info).unwrap_or(Value::Null);
                    if args.action == "list" {
                        if let Ok(all) = core.list_sessions().await {
                            if let Value::Object(ref mut map) = payload {
                                map.insert("all_sessions".to_string(), serde_json::to_value(all).unwrap_or(Value::Null));
                            }
                        }
                    }
                    Ok(ToolCallResult::ok(serde_json::to_string_pretty(&payload).unwrap_or_default()))
                }
                Err(e) => Err(JsonRpcError::from_domain_error(&e)),
            }
        }
        "generate_prompt" => {
            let args: GeneratePromptArgs = parse_args(arguments)?;
            match core.generate_prompt(&args.context, &args.style).await {
                Ok(text) => Ok(ToolCallResult::ok(text)),
                Err(e) => Err(JsonRpcError::from_domain_error(&e)),
            }
        }
        "get_status" => match core.get_status().await {
            Ok(status) => Ok(ToolCallResult::ok(serde_json::to_string_pretty(&status).unwrap_or_default())),
            Err(e) => Err(JsonRpcError::from_domain_error(&e)),
        },
        "reset_circuit_breaker" => {
            let args: ResetCircuitBreakerArgs = parse_args(arguments)?;
            match core.reset_circuit_breaker(args.breaker_name.as_deref(), args.all).await {
                Ok(result) => Ok(ToolCallResult::ok(serde_json::to_string_pretty(&result).unwrap_or_default())),
                Err(e) => Err(JsonRpcError::from_domain_error(&e)),
            }
        }
        other => Err(JsonRpcError::tool_not_found(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_list_names_match_the_seven_registered_tools() {
        let list = tools_list();
        let names: Vec<&str> = list.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["save_conversation", "get_context", "search_memory", "manage_session", "generate_prompt", "get_status", "reset_circuit_breaker"]
        );
    }

    #[test]
    fn parse_strategy_defaults_to_default_variant() {
        assert_eq!(parse_strategy(None), SearchStrategy::Default);
        assert_eq!(parse_strategy(Some("semantic")), SearchStrategy::Semantic);
        assert_eq!(parse_strategy(Some("bogus")), SearchStrategy::Default);
    }

    #[test]
    fn unknown_tool_name_is_method_not_found() {
        let err = JsonRpcError::tool_not_found("nonexistent");
        assert_eq!(err.code, -32601);
    }
}
