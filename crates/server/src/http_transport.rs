//! `POST /mcp` + `GET /health` + `GET /` over HTTP/SSE, per §4.12. The
//! bearer check is grounded on the teacher's `AdminGuard` extractor
//! (`crates/gateway/src/api/admin/guard.rs`): hash the configured token
//! once at startup, compare in constant time per request.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use sage_domain::config::AuthConfig;
use sage_mcp::{JsonRpcError, JsonRpcRequest};
use sage_service::{CoreService, SageCoreApi};

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<CoreService>,
    pub bearer_token_hash: Option<Arc<[u8]>>,
}

impl AppState {
    pub fn new(core: Arc<CoreService>, auth: &AuthConfig) -> Self {
        let bearer_token_hash = auth
            .require_auth
            .then(|| auth.bearer_token.as_deref().unwrap_or(""))
            .map(|token| Arc::from(Sha256::digest(token.as_bytes()).as_slice()));
        Self { core, bearer_token_hash }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.bearer_token_hash else {
            return true;
        };
        let provided = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or("");
        let provided_hash = Sha256::digest(provided.as_bytes());
        bool::from(provided_hash.ct_eq(expected))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/mcp", post(handle_mcp))
        .route("/health", get(handle_health))
        .route("/", get(handle_index))
        .with_state(state)
}

async fn handle_index() -> impl IntoResponse {
    Json(serde_json::json!({
        "endpoints": {
            "POST /mcp": "JSON-RPC 2.0 tool calls (text/event-stream supported)",
            "GET /health": "liveness + sage core readiness",
            "GET /": "this document",
        }
    }))
}

async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.core.get_status().await;
    let sage_core = status.map(|v| v.get("initialized").and_then(|b| b.as_bool()).unwrap_or(false)).unwrap_or(false);
    let body = serde_json::json!({
        "status": if sage_core { "ok" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "sageCore": sage_core,
    });
    if sage_core {
        (StatusCode::OK, Json(body))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}

async fn handle_mcp(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> axum::response::Response {
    if !state.authorized(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": JsonRpcError::unauthorized("missing or invalid bearer token") })),
        )
            .into_response();
    }

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": { "code": -32700, "message": "Parse error" } })),
            )
                .into_response();
        }
    };

    let response = sage_mcp::handle_request(state.core.as_ref(), request).await;
    let response = match response {
        Some(r) => r,
        None => return StatusCode::NO_CONTENT.into_response(),
    };

    let wants_sse = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false);

    if wants_sse {
        let data = serde_json::to_string(&response).unwrap_or_default();
        let stream = async_stream::stream! {
            yield Ok::<_, std::convert::Infallible>(Event::default().data(data));
            yield Ok(Event::default().data("[DONE]"));
        };
        Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
    } else {
        Json(response).into_response()
    }
}
