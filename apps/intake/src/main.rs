mod config;
mod errors;
mod extraction;
mod llm_client;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::extraction::{ExtractionSchema, JobAnalyzer};
use crate::llm_client::build_backend;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Intake API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the model backend
    let backend = build_backend(&config.llm)?;
    let info = backend.describe();
    info!(
        "LLM backend: {} (model: {}, endpoint: {})",
        info.backend, info.model, info.endpoint
    );
    if let Err(e) = backend.initialize().await {
        warn!("LLM backend is not ready, analysis requests will fail until it is: {e}");
    }

    let analyzer = JobAnalyzer::new(
        backend.clone(),
        ExtractionSchema::job_posting()?,
        config.llm.options,
    );

    // Build app state
    let state = AppState {
        analyzer: Arc::new(analyzer),
        backend,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
