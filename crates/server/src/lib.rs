//! Shared bootstrap for both MCP transports, grounded on the teacher's
//! `crates/gateway/src/main.rs` startup sequence (tracing init, config
//! load, listener bind) and `crates/gateway/src/api/tasks.rs`'s SSE
//! streaming pattern, retargeted to the two transports named in §4.11–4.12.

pub mod http_transport;
pub mod stdio_transport;

use std::sync::Arc;

use sage_domain::config::SageConfig;
use sage_service::CoreService;
use tracing_subscriber::EnvFilter;

/// Structured JSON tracing to stderr, matching the teacher's `init_tracing`.
/// Protocol frames own stdout on the stdio transport (§4.11), so logging
/// never touches it.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sage_server=debug")))
        .with_writer(std::io::stderr)
        .json()
        .init();
}

/// Loads configuration and brings up a fully initialized [`CoreService`].
pub async fn bootstrap() -> anyhow::Result<Arc<CoreService>> {
    let config = SageConfig::load(None)?;
    tracing::info!(config = %config.redacted(), "sage core starting");
    let core = Arc::new(CoreService::new());
    core.initialize(config).await?;
    Ok(core)
}
