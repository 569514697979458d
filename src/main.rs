use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use pikpak_web::config::Config;
use pikpak_web::services::{spawn_session_pruner, spawn_sweeper, PikPakConnector};
use pikpak_web::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load().context("Failed to load configuration")?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let sweep_every = Duration::from_secs(config.session.sweep_interval_secs.max(1));

    let factory = Arc::new(PikPakConnector::new(&config.pikpak)?);
    let state = AppState::from_config(config, factory)?;
    tracing::info!("Running in {:?} mode", state.mode());

    let _sweeper = spawn_sweeper(state.clients.clone(), sweep_every);
    let _pruner = spawn_session_pruner(state.sessions.clone(), sweep_every);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server running on {}", addr);

    axum::serve(listener, app.into_make_service())
        .await
        .context("Server error")?;
    Ok(())
}
