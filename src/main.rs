use std::net::SocketAddr;

use anyhow::Context;
use cohort_api::{app, config, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DB_* and ACCESS_TOKEN_SECRET
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::config().clone();
    tracing::info!("Starting Cohort API in {:?} mode", config.environment);
    if config.security.access_token_secret.is_empty() {
        anyhow::bail!("ACCESS_TOKEN_SECRET must be set");
    }

    let state = AppState::new(config);

    // Without a database the service cannot do anything useful
    state
        .db
        .health_check()
        .await
        .context("database unreachable at startup")?;
    tracing::info!("Database connection verified: {}", state.db.database_name());

    let bind_addr = format!("0.0.0.0:{}", state.config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    println!("🚀 Cohort API listening on http://{}", bind_addr);

    let db = state.db.clone();
    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    db.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
