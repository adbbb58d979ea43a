//! Hosted language-model clients
//!
//! One narrow seam, [`LanguageModel::complete`], with an implementation per
//! provider wire format. The API key is handed to the client at
//! construction and lives exactly as long as the client.
//!
//! Every failure here is a transport failure: non-2xx status, timeout, or a
//! response envelope that does not have the provider's shape. What the model
//! actually wrote is not inspected at this layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sg_common::config::{ModelConfig, ModelProvider};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENAI_TEMPERATURE: f32 = 0.3;
const USER_AGENT: &str = concat!("ScopeGuard/", env!("CARGO_PKG_VERSION"));

/// Model transport errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Malformed response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ModelError::Timeout(_))
    }
}

/// Text-completion seam used by the classifier
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send `prompt` as the sole user message, returning the model's raw text
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ModelError>;

    /// Model identifier, for logging
    fn model_name(&self) -> &str;
}

/// Build the client selected by `config.provider`
pub fn build_language_model(
    config: &ModelConfig,
    api_key: String,
) -> Result<Arc<dyn LanguageModel>, ModelError> {
    let model: Arc<dyn LanguageModel> = match config.provider {
        ModelProvider::Anthropic => Arc::new(AnthropicClient::new(config, api_key)?),
        ModelProvider::Openai => Arc::new(OpenAiClient::new(config, api_key)?),
    };
    Ok(model)
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ModelError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| ModelError::NetworkError(e.to_string()))
}

fn map_send_error(e: reqwest::Error, timeout: Duration) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout(timeout)
    } else {
        ModelError::NetworkError(e.to_string())
    }
}

/// Read the body of a non-2xx response into an `ApiError`
async fn api_error(response: reqwest::Response) -> ModelError {
    let status = response.status().as_u16();
    let error_text = response.text().await.unwrap_or_default();
    ModelError::ApiError(status, error_text)
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

// ---------------------------------------------------------------------------
// Anthropic Messages API

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicResponse {
    /// Concatenated text blocks (non-text blocks ignored)
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Anthropic Messages API client
pub struct AnthropicClient {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl AnthropicClient {
    pub fn new(config: &ModelConfig, api_key: String) -> Result<Self, ModelError> {
        let base = config.base_url.as_deref().unwrap_or(ANTHROPIC_BASE_URL);
        Ok(Self {
            http_client: build_http_client(config.timeout())?,
            endpoint: format!("{}/v1/messages", base.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ModelError> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        tracing::debug!(model = %self.model, max_tokens, "Calling Anthropic Messages API");

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Ok(body.text())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible Chat Completions

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible chat-completion endpoints (OpenAI, Groq, ...)
pub struct OpenAiClient {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(config: &ModelConfig, api_key: String) -> Result<Self, ModelError> {
        let base = config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
        Ok(Self {
            http_client: build_http_client(config.timeout())?,
            endpoint: format!("{}/v1/chat/completions", base.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ModelError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
            temperature: OPENAI_TEMPERATURE,
        };

        tracing::debug!(model = %self.model, max_tokens, "Calling chat completions API");

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("response has no choices".to_string()))?;

        Ok(choice.message.content.unwrap_or_default())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
