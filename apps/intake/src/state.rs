use std::sync::Arc;

use crate::extraction::JobAnalyzer;
use crate::llm_client::LlmBackend;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<JobAnalyzer>,
    /// The same backend the analyzer uses, for status and model listing.
    pub backend: Arc<dyn LlmBackend>,
}
