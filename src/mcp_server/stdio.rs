//! Line-delimited JSON-RPC over a byte stream (stdin/stdout in production).

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use super::auth::RequestContext;
use super::dispatch::McpServer;

/// Serve one JSON-RPC message per line until EOF or cancellation.
///
/// stdio carries no transport metadata, so every request starts from an
/// empty [`RequestContext`]; credentials can only arrive in `params`.
pub async fn serve<R, W>(
    server: Arc<McpServer>,
    reader: R,
    mut writer: W,
    cancel: CancellationToken,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let ctx = RequestContext::new();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("stdio transport cancelled");
                return Ok(());
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            tracing::info!("stdin closed, stdio transport exiting");
            return Ok(());
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(response) = server.handle_message(trimmed, &ctx).await {
            let mut json = serde_json::to_string(&response)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            json.push('\n');
            writer.write_all(json.as_bytes()).await?;
            writer.flush().await?;
        }
    }
}
