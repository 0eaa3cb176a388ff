use anyhow::{Context, Result};
use proctor_core::{HttpRelay, Orchestrator};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod http_interface;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!(
        bind = %config.bind_addr,
        backend = %config.backend_url,
        timeout_secs = config.backend_timeout.as_secs(),
        verify_retries = config.verify_retries,
        "proctord starting"
    );

    let relay = HttpRelay::new(config.relay_config()).context("failed to build backend client")?;
    let state = Arc::new(http_interface::AppState::new(Orchestrator::new(relay)));
    let app = http_interface::router(state, config.router_options());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("proctord ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("proctord shutting down");
    Ok(())
}

/// Resolve on Ctrl-C. In-flight requests finish before the listener closes.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
