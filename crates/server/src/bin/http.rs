//! `sage-mcp-http` — HTTP/SSE JSON-RPC tool server (§4.12, §6.7).

use clap::Parser;

use sage_domain::config::SageConfig;
use sage_server::http_transport::{router, AppState};

#[derive(Parser)]
struct Cli {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sage_server::init_tracing();
    let cli = Cli::parse();

    let core = sage_server::bootstrap().await?;
    let mut config = SageConfig::load(None)?;
    if let Some(host) = cli.host {
        config.http.host = host;
    }
    if let Some(port) = cli.port {
        config.http.port = port;
    }

    let state = AppState::new(core, &config.auth);
    let app = router(state);

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "sage-mcp-http listening");

    axum::serve(listener, app).await?;
    Ok(())
}
