//! Job Analyzer: the pipeline entry point used by the surrounding app.
//!
//! Flow: build_prompt → generate (whole or streamed) → clean → parse →
//!       fill source-text fields → Record.
//!
//! Every failure collapses to "no record" at `analyze`. The raw model output
//! is logged for diagnosis and never handed back to the caller.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::extraction::cleaner::clean;
use crate::extraction::parser::{format_instructions, parse, ExtractionError};
use crate::extraction::record::{FieldValue, Record};
use crate::extraction::schema::{ExtractionSchema, FieldSource};
use crate::extraction::stream::consume;
use crate::extraction::synthesizer::build_prompt;
use crate::llm_client::{ChatMessage, GenerationOptions, LlmBackend, LlmError};

// ────────────────────────────────────────────────────────────────────────────
// Errors and options
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("model backend unavailable: {0}")]
    BackendUnavailable(#[source] LlmError),

    #[error("generation produced no text")]
    EmptyOrCancelledGeneration,

    #[error("model output could not be extracted: {0}")]
    MalformedExtraction(#[source] ExtractionError),

    #[error("model output does not fit the schema: {0}")]
    SchemaMismatch(#[source] ExtractionError),
}

impl From<LlmError> for AnalysisError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::EmptyContent => AnalysisError::EmptyOrCancelledGeneration,
            other => AnalysisError::BackendUnavailable(other),
        }
    }
}

impl From<ExtractionError> for AnalysisError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::SchemaMismatch { .. } => AnalysisError::SchemaMismatch(err),
            other => AnalysisError::MalformedExtraction(other),
        }
    }
}

/// Progress callback: `(display_text, is_final)`.
pub type UpdateFn<'a> = &'a mut (dyn FnMut(&str, bool) + Send);

/// Per-call options for `analyze`.
#[derive(Default)]
pub struct AnalyzeOptions<'a> {
    /// Stream the generation and report progress through `on_update`.
    pub stream: bool,
    pub on_update: Option<UpdateFn<'a>>,
    /// Owned by the caller. Only consulted when streaming.
    pub cancel: Option<CancellationToken>,
}

impl<'a> AnalyzeOptions<'a> {
    pub fn streaming(on_update: UpdateFn<'a>, cancel: CancellationToken) -> Self {
        Self {
            stream: true,
            on_update: Some(on_update),
            cancel: Some(cancel),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Analyzer
// ────────────────────────────────────────────────────────────────────────────

pub struct JobAnalyzer {
    backend: Arc<dyn LlmBackend>,
    schema: ExtractionSchema,
    options: GenerationOptions,
}

impl JobAnalyzer {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        schema: ExtractionSchema,
        options: GenerationOptions,
    ) -> Self {
        Self {
            backend,
            schema,
            options,
        }
    }

    /// Analyzes `text`, returning `None` on any failure.
    pub async fn analyze(&self, text: &str, options: AnalyzeOptions<'_>) -> Option<Record> {
        match self.try_analyze(text, options).await {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Job analysis failed: {e}");
                None
            }
        }
    }

    /// Same as `analyze` but keeps the failure category.
    pub async fn try_analyze(
        &self,
        text: &str,
        mut options: AnalyzeOptions<'_>,
    ) -> Result<Record, AnalysisError> {
        let instructions = format_instructions(&self.schema);
        let prompt = build_prompt(Some(&self.schema), text, &instructions);
        let messages = [ChatMessage::user(prompt)];

        info!(
            chars = text.len(),
            stream = options.stream,
            "Analyzing job description"
        );

        let raw = if options.stream {
            let cancel = options.cancel.take().unwrap_or_default();
            let chunks = self
                .backend
                .generate_streaming(&messages, &self.options)
                .await?;
            let on_update = &mut options.on_update;
            consume(chunks, &cancel, |display, done| {
                if let Some(callback) = on_update.as_mut() {
                    callback(display, done);
                }
            })
            .await?
        } else {
            Some(self.backend.generate(&messages, &self.options).await?)
        };

        let raw = match raw {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return Err(AnalysisError::EmptyOrCancelledGeneration),
        };

        let Some(candidate) = clean(&raw) else {
            warn!(raw = %raw, "No JSON object found in model output");
            return Err(ExtractionError::NoJsonObject.into());
        };
        debug!(candidate = %candidate, "Cleaned model output");

        let mut record = parse(&candidate, &self.schema).map_err(|e| {
            warn!(raw = %raw, candidate = %candidate, "Model output failed to parse: {e}");
            AnalysisError::from(e)
        })?;

        for field in self.schema.fields() {
            if field.source == FieldSource::SourceText {
                record.set(field.name, FieldValue::text(text));
            }
        }

        info!("Job analysis produced a record with {} fields", record.len());
        Ok(record)
    }
}
