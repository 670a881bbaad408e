mod config;
mod editor;
mod error;
mod gemini;
mod models;
mod notify;
mod prompts;
mod routes;

use anyhow::Context;
use routes::AppState;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    tracing::info!(
        model = %config.model,
        language = ?config.language,
        api_base = %config.api_base,
        session_ttl_secs = config.session_ttl.as_secs(),
        "Loaded configuration"
    );

    let state = AppState::new(&config);
    routes::spawn_session_sweeper(state.clone(), config.session_ttl);
    let app = routes::router(state, config.max_upload_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("👋 Shutting down");
}
