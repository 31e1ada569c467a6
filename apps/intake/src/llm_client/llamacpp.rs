//! llama.cpp backend, talking to `llama-server` through its OpenAI-compatible
//! chat completions endpoint. Streaming responses arrive as server-sent events.

use async_stream::stream;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    api_error, body_lines, BackendInfo, ChatMessage, ChunkStream, GenerationOptions, LlmBackend,
    LlmError,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

const SSE_DATA_PREFIX: &str = "data:";
const SSE_DONE: &str = "[DONE]";

#[derive(Clone)]
pub struct LlamaCppBackend {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<Content>,
    delta: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl LlamaCppBackend {
    pub fn new(client: Client, base_url: String, model: String) -> Self {
        info!("Initializing llama.cpp backend at {base_url} (model: {model})");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    async fn post_completion(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
            stream,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&self.base_url, e))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response)
    }
}

/// Extracts the payload of an SSE `data:` line. Comments, event names and
/// other fields yield `None`.
fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix(SSE_DATA_PREFIX).map(str::trim)
}

#[async_trait::async_trait]
impl LlmBackend for LlamaCppBackend {
    async fn initialize(&self) -> Result<(), LlmError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&self.base_url, e))?;

        match response.status() {
            status if status.is_success() => {
                info!("llama.cpp server is ready");
                Ok(())
            }
            StatusCode::SERVICE_UNAVAILABLE => {
                warn!("llama.cpp server is still loading the model");
                Err(LlmError::Unavailable("model is still loading".to_string()))
            }
            _ => Err(api_error(response).await),
        }
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        debug!("Generating response with llama.cpp...");
        let response: CompletionResponse = self
            .post_completion(messages, options, false)
            .await?
            .json()
            .await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(text)
    }

    async fn generate_streaming(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<ChunkStream, LlmError> {
        debug!("Streaming response from llama.cpp...");
        let mut lines = body_lines(self.post_completion(messages, options, true).await?);

        Ok(Box::pin(stream! {
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                let Some(data) = sse_data(&line) else {
                    continue;
                };
                if data == SSE_DONE {
                    break;
                }
                let event: CompletionResponse = match serde_json::from_str(data) {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(LlmError::Parse(e));
                        return;
                    }
                };
                let content = event
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta)
                    .and_then(|d| d.content)
                    .unwrap_or_default();
                if !content.is_empty() {
                    yield Ok(content);
                }
            }
        }))
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&self.base_url, e))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let models: ModelsResponse = response.json().await?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }

    fn describe(&self) -> BackendInfo {
        BackendInfo {
            backend: "llama.cpp",
            model: self.model.clone(),
            endpoint: self.base_url.clone(),
        }
    }
}
