//! Axum route handlers for the job analysis API.

use std::convert::Infallible;

use async_stream::stream;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::AppError;
use crate::extraction::analyzer::{AnalysisError, AnalyzeOptions};
use crate::extraction::record::Record;
use crate::state::AppState;

/// User-facing message for any analysis that produced no record.
pub const ANALYSIS_FAILED_MESSAGE: &str = "Failed to analyze job description, please try again";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub record: Record,
}

/// Messages sent from the generation task to the SSE response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnalysisEvent {
    Update { text: String, done: bool },
    Complete { record: Record },
    Failed { message: &'static str },
}

impl AnalysisEvent {
    fn name(&self) -> &'static str {
        match self {
            AnalysisEvent::Update { .. } => "update",
            AnalysisEvent::Complete { .. } => "complete",
            AnalysisEvent::Failed { .. } => "failed",
        }
    }

    fn into_sse(self) -> Event {
        let name = self.name();
        Event::default()
            .event(name)
            .json_data(&self)
            .unwrap_or_else(|e| Event::default().event("failed").data(e.to_string()))
    }
}

fn log_record(record: &Record) {
    info!(
        title = record.text("title").unwrap_or_default(),
        company = record.text("company").unwrap_or_default(),
        skills = record.list("skills").len(),
        "Job description analyzed"
    );
}

fn validate(request: &AnalyzeRequest) -> Result<(), AppError> {
    if request.description.trim().is_empty() {
        return Err(AppError::Validation(
            "description cannot be empty".to_string(),
        ));
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/jobs/analyze
///
/// Whole-response analysis. An unreachable backend is a 503, every other
/// failure is a 422 with a generic message.
pub async fn handle_analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    validate(&request)?;

    match state
        .analyzer
        .try_analyze(&request.description, AnalyzeOptions::default())
        .await
    {
        Ok(record) => {
            log_record(&record);
            Ok(Json(AnalyzeResponse { record }))
        }
        Err(AnalysisError::BackendUnavailable(e)) => {
            Err(AppError::BackendUnavailable(e.to_string()))
        }
        Err(e) => {
            info!("Analysis produced no record: {e}");
            Err(AppError::UnprocessableEntity(
                ANALYSIS_FAILED_MESSAGE.to_string(),
            ))
        }
    }
}

/// POST /api/v1/jobs/analyze/stream
///
/// Streams progress as server-sent events: `update` events while the model
/// generates, then one `complete` or `failed` event. Dropping the response
/// (client disconnect) cancels the generation.
pub async fn handle_analyze_stream(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    validate(&request)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<AnalysisEvent>();
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let analyzer = state.analyzer.clone();

    tokio::spawn(async move {
        let updates = tx.clone();
        let mut receiver_gone = false;
        let mut on_update = move |text: &str, done: bool| {
            let update = AnalysisEvent::Update {
                text: text.to_string(),
                done,
            };
            if updates.send(update).is_err() && !receiver_gone {
                receiver_gone = true;
                debug!("Analysis stream closed, dropping progress updates");
            }
        };

        let outcome = analyzer
            .analyze(
                &request.description,
                AnalyzeOptions::streaming(&mut on_update, cancel),
            )
            .await;

        let last = match outcome {
            Some(record) => {
                log_record(&record);
                AnalysisEvent::Complete { record }
            }
            None => AnalysisEvent::Failed {
                message: ANALYSIS_FAILED_MESSAGE,
            },
        };
        if tx.send(last).is_err() {
            debug!("Analysis stream closed before the result was delivered");
        }
    });

    let events = stream! {
        let _guard = guard;
        while let Some(event) = rx.recv().await {
            yield Ok(event.into_sse());
        }
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
