//! Ollama backend (`/api/chat`, `/api/tags`).

use async_stream::stream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    api_error, body_lines, BackendInfo, ChatMessage, ChunkStream, GenerationOptions, LlmBackend,
    LlmError,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

impl From<&GenerationOptions> for OllamaOptions {
    fn from(options: &GenerationOptions) -> Self {
        Self {
            temperature: options.temperature,
            top_p: options.top_p,
            num_predict: options.max_tokens,
        }
    }
}

/// One response object; a streamed body is a sequence of these, one per line.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaBackend {
    pub fn new(client: Client, base_url: String, model: String) -> Self {
        info!("Initializing Ollama backend with model: {model}");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    async fn post_chat(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream,
            options: options.into(),
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
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

#[async_trait::async_trait]
impl LlmBackend for OllamaBackend {
    async fn initialize(&self) -> Result<(), LlmError> {
        let models = self.list_models().await?;
        if models.iter().any(|m| m == &self.model) {
            info!("Ollama model verified: {}", self.model);
            Ok(())
        } else {
            Err(LlmError::ModelNotFound(self.model.clone()))
        }
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        debug!("Generating response with Ollama...");
        let response: ChatResponse = self.post_chat(messages, options, false).await?.json().await?;

        if let Some(message) = response.error {
            return Err(LlmError::Api { status: 200, message });
        }
        let text = response
            .message
            .map(|m| m.content.trim().to_string())
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
        debug!("Streaming response from Ollama...");
        let mut lines = body_lines(self.post_chat(messages, options, true).await?);

        Ok(Box::pin(stream! {
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                let event: ChatResponse = match serde_json::from_str(&line) {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(LlmError::Parse(e));
                        return;
                    }
                };
                if let Some(message) = event.error {
                    yield Err(LlmError::Stream(message));
                    return;
                }
                if let Some(message) = event.message {
                    if !message.content.is_empty() {
                        yield Ok(message.content);
                    }
                }
                if event.done {
                    break;
                }
            }
        }))
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&self.base_url, e))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    fn describe(&self) -> BackendInfo {
        BackendInfo {
            backend: "ollama",
            model: self.model.clone(),
            endpoint: self.base_url.clone(),
        }
    }
}
