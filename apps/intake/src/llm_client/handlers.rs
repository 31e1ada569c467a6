//! Axum route handlers for backend status.

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::warn;

use crate::errors::AppError;
use crate::llm_client::{BackendInfo, LlmError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BackendStatusResponse {
    #[serde(flatten)]
    pub info: BackendInfo,
    /// "connected" or "not connected"
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelListResponse {
    pub models: Vec<String>,
}

/// GET /api/v1/llm
///
/// Describes the configured backend and probes it.
pub async fn handle_backend_status(State(state): State<AppState>) -> Json<BackendStatusResponse> {
    let info = state.backend.describe();
    let (status, detail) = match state.backend.initialize().await {
        Ok(()) => ("connected", None),
        Err(e) => {
            warn!("LLM backend probe failed: {e}");
            ("not connected", Some(e.to_string()))
        }
    };
    Json(BackendStatusResponse {
        info,
        status,
        detail,
    })
}

/// GET /api/v1/llm/models
pub async fn handle_list_models(
    State(state): State<AppState>,
) -> Result<Json<ModelListResponse>, AppError> {
    let models = state.backend.list_models().await.map_err(|e| match e {
        LlmError::Unavailable(msg) => AppError::BackendUnavailable(msg),
        other => AppError::Llm(format!("Listing models failed: {other}")),
    })?;
    Ok(Json(ModelListResponse { models }))
}
