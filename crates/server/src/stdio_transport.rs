//! Line-delimited JSON-RPC over stdio, per §4.11. Grounded on the framing
//! style of the teacher's (now-retired) client-side `StdioTransport`, which
//! read/wrote newline-delimited JSON against a child process; here the
//! roles are reversed — stdin/stdout belong to the server.

use std::sync::Arc;

use sage_mcp::{JsonRpcRequest, JsonRpcResponse};
use sage_service::CoreService;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Runs the stdio server loop to completion. Returns the process exit code:
/// `0` on clean EOF, `130` on interrupt (SIGINT/Ctrl-C).
pub async fn run(core: Arc<CoreService>) -> i32 {
    let stdin = io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut stdout = io::stdout();

    if let Err(e) = write_line(&mut stdout, &serde_json::json!({ "type": "ready" })).await {
        tracing::error!(error = %e, "failed to write ready frame");
        return 1;
    }

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(l)) => l,
                    Ok(None) => {
                        tracing::info!("stdin closed, shutting down");
                        return 0;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "stdin read error");
                        return 1;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                    Ok(request) => sage_mcp::handle_request(core.as_ref(), request).await,
                    Err(_) => Some(JsonRpcResponse::failure(
                        serde_json::Value::Null,
                        sage_mcp::JsonRpcError::parse_error("Parse error"),
                    )),
                };
                if let Some(response) = response {
                    if let Err(e) = write_line(&mut stdout, &response).await {
                        tracing::error!(error = %e, "stdout write error");
                        return 1;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                return 130;
            }
        }
    }
}

async fn write_line<W, T>(writer: &mut W, value: &T) -> io::Result<()>
where
    W: AsyncWriteExt + Unpin,
    T: serde::Serialize,
{
    let mut line = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
