pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::extraction::handlers as jobs;
use crate::llm_client::handlers as llm;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Backend API
        .route("/api/v1/llm", get(llm::handle_backend_status))
        .route("/api/v1/llm/models", get(llm::handle_list_models))
        // Job analysis API
        .route("/api/v1/jobs/analyze", post(jobs::handle_analyze))
        .route("/api/v1/jobs/analyze/stream", post(jobs::handle_analyze_stream))
        .with_state(state)
}
