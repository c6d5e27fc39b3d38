//! `sage-mcp-stdio` — stdio JSON-RPC tool server (§4.11, §6.7).

#[tokio::main]
async fn main() {
    sage_server::init_tracing();

    let core = match sage_server::bootstrap().await {
        Ok(core) => core,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize sage core");
            std::process::exit(1);
        }
    };

    let code = sage_server::stdio_transport::run(core).await;
    std::process::exit(code);
}
