mod artifacts;
mod backend;
mod clipboard;
mod config;
mod controller;
mod error;
mod features;
mod launch;
mod models;
mod params;
mod policy;
mod routes;
#[cfg(test)]
mod test_helpers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{fmt, EnvFilter};

use crate::artifacts::ArtifactStore;
use crate::backend::HttpBackend;
use crate::clipboard::SharedClipboard;
use crate::config::Settings;
use crate::launch::Launch;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let settings = Settings::from_env()?;
    let backend = HttpBackend::new(&settings.backend_base_url, settings.http_timeout)?;
    tracing::info!("Using generation backend at {}", backend.base_url());

    let artifacts = ArtifactStore::new(&settings.download_dir);
    tracing::info!("Saving downloads to {}", artifacts.root().display());

    let launch = Arc::new(Launch::load(&settings.launch_state_file, settings.launch_at));

    let state = AppState {
        sessions: Arc::default(),
        backend: Arc::new(backend),
        artifacts,
        clipboard: SharedClipboard::default(),
        launch,
    };
    tokio::spawn(housekeeping(state.clone(), settings.session_idle));

    let app = routes::router(state, settings.max_request_bytes).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("👋 Shutting down");
        })
        .await?;
    Ok(())
}

/// Once a second: fire the launch notification when due and drop idle sessions.
async fn housekeeping(state: AppState, session_idle: Duration) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        interval.tick().await;
        if let Err(e) = state.launch.tick(Utc::now()).await {
            tracing::error!("❌ Launch notification failed: {:#}", e);
        }
        state.evict_idle(session_idle);
    }
}
