//! LLM Client: the model backend interface used by the extraction pipeline.
//!
//! Two variants exist, a local Ollama server and a llama.cpp `llama-server`.
//! The variant is picked once at startup from `LLM_BACKEND`; nothing else in
//! the crate inspects which one it is talking to.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use crate::config::LlmConfig;

pub mod handlers;
pub mod llamacpp;
pub mod ollama;

pub use llamacpp::LlamaCppBackend;
pub use ollama::OllamaBackend;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("model '{0}' is not available on the backend")]
    ModelNotFound(String),

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("stream error: {0}")]
    Stream(String),
}

impl LlmError {
    /// Maps connection-level failures to `Unavailable`, keeping other
    /// transport errors as they are.
    pub(crate) fn from_transport(base_url: &str, err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            LlmError::Unavailable(format!("{base_url}: {err}"))
        } else {
            LlmError::Http(err)
        }
    }
}

/// A single chat message sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling options forwarded to the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 2000,
            top_p: 0.95,
        }
    }
}

/// Static description of a configured backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendInfo {
    pub backend: &'static str,
    pub model: String,
    pub endpoint: String,
}

/// Which backend implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Ollama,
    LlamaCpp,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(BackendKind::Ollama),
            "llamacpp" | "llama.cpp" | "llama-cpp" => Ok(BackendKind::LlamaCpp),
            other => Err(format!(
                "unknown LLM backend '{other}' (expected 'ollama' or 'llamacpp')"
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Ollama => f.write_str("ollama"),
            BackendKind::LlamaCpp => f.write_str("llama.cpp"),
        }
    }
}

/// Incremental text chunks from a streaming generation. Dropping the stream
/// aborts the underlying request.
pub type ChunkStream = BoxStream<'static, Result<String, LlmError>>;

/// The model backend interface.
#[async_trait::async_trait]
pub trait LlmBackend: Send + Sync {
    /// Verifies the backend is reachable and the configured model is usable.
    async fn initialize(&self) -> Result<(), LlmError>;

    /// Whole-response generation.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, LlmError>;

    /// Starts a streaming generation and returns its chunk stream.
    async fn generate_streaming(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<ChunkStream, LlmError>;

    /// Models the backend can serve.
    async fn list_models(&self) -> Result<Vec<String>, LlmError>;

    fn describe(&self) -> BackendInfo;
}

/// Builds the configured backend.
pub fn build_backend(config: &LlmConfig) -> Result<Arc<dyn LlmBackend>, LlmError> {
    let client = Client::builder().timeout(config.timeout).build()?;

    let backend: Arc<dyn LlmBackend> = match config.backend {
        BackendKind::Ollama => Arc::new(OllamaBackend::new(
            client,
            config.ollama_base_url.clone(),
            config.model.clone(),
        )),
        BackendKind::LlamaCpp => Arc::new(LlamaCppBackend::new(
            client,
            config.llamacpp_base_url.clone(),
            config.model.clone(),
        )),
    };
    Ok(backend)
}

/// Default per-request timeout when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Reads an error body, preferring a JSON `error` message when present.
pub(crate) async fn api_error(response: reqwest::Response) -> LlmError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| match v.get("error") {
            Some(serde_json::Value::String(message)) => Some(message.clone()),
            Some(other) => other
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string),
            None => None,
        })
        .unwrap_or(body);
    LlmError::Api { status, message }
}

/// Splits a streaming response body into non-empty lines. Handles lines
/// split across network chunks and a final line with no trailing newline.
pub(crate) fn body_lines(response: reqwest::Response) -> BoxStream<'static, Result<String, LlmError>> {
    let mut body = Box::pin(response.bytes_stream());

    Box::pin(stream! {
        let mut buffer: Vec<u8> = Vec::new();
        while let Some(next) = body.next().await {
            let chunk: Bytes = match next {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(LlmError::Stream(e.to_string()));
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line).trim().to_string();
                if !line.is_empty() {
                    yield Ok(line);
                }
            }
        }
        let tail = String::from_utf8_lossy(&buffer).trim().to_string();
        if !tail.is_empty() {
            yield Ok(tail);
        }
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted backend shared by the pipeline and route tests.

    use std::sync::Mutex;

    use futures::stream;

    use super::*;

    pub(crate) struct ScriptedBackend {
        pub chunks: Vec<String>,
        pub fail_with: Option<fn() -> LlmError>,
        pub prompts: Mutex<Vec<String>>,
    }

    fn connection_refused() -> LlmError {
        LlmError::Unavailable("connection refused".to_string())
    }

    impl ScriptedBackend {
        pub(crate) fn new<I, S>(chunks: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                chunks: chunks.into_iter().map(Into::into).collect(),
                fail_with: None,
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn unavailable() -> Self {
            Self {
                fail_with: Some(connection_refused),
                ..Self::new(Vec::<String>::new())
            }
        }

        pub(crate) fn last_prompt(&self) -> Option<String> {
            self.prompts.lock().unwrap().last().cloned()
        }

        fn record(&self, messages: &[ChatMessage]) -> Result<(), LlmError> {
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            let prompt: String = messages.iter().map(|m| m.content.as_str()).collect();
            self.prompts.lock().unwrap().push(prompt);
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn initialize(&self) -> Result<(), LlmError> {
            self.fail_with.map_or(Ok(()), |fail| Err(fail()))
        }

        async fn generate(
            &self,
            messages: &[ChatMessage],
            _options: &GenerationOptions,
        ) -> Result<String, LlmError> {
            self.record(messages)?;
            let text = self.chunks.concat();
            if text.trim().is_empty() {
                return Err(LlmError::EmptyContent);
            }
            Ok(text.trim().to_string())
        }

        async fn generate_streaming(
            &self,
            messages: &[ChatMessage],
            _options: &GenerationOptions,
        ) -> Result<ChunkStream, LlmError> {
            self.record(messages)?;
            let chunks: Vec<Result<String, LlmError>> =
                self.chunks.iter().cloned().map(Ok).collect();
            Ok(Box::pin(stream::iter(chunks)))
        }

        async fn list_models(&self) -> Result<Vec<String>, LlmError> {
            self.initialize().await?;
            Ok(vec!["scripted".to_string()])
        }

        fn describe(&self) -> BackendInfo {
            BackendInfo {
                backend: "scripted",
                model: "scripted".to_string(),
                endpoint: "memory".to_string(),
            }
        }
    }
}
