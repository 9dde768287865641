//! Mock video data service for local development.

use anyhow::Context;
use video_mcp_server::mock_service::{self, DEFAULT_PORT, PORT_ENV};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    video_mcp_server::init_stderr_tracing();

    let port = match std::env::var(PORT_ENV) {
        Ok(value) => value
            .trim()
            .parse::<u16>()
            .with_context(|| format!("invalid {PORT_ENV}: {value}"))?,
        Err(_) => DEFAULT_PORT,
    };

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    let public_base = format!("http://localhost:{port}");

    tracing::info!(port, "mock video service listening");
    mock_service::serve(listener, &public_base, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down");
    })
    .await
    .context("mock video service failed")?;

    Ok(())
}
