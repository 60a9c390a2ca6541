//! OpenAI-compatible chat completion client
//!
//! Groq, Ollama (`/v1`), vLLM and OpenRouter all accept the same
//! `/chat/completions` request shape, so one client serves every provider a
//! debate entity can be bound to.

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::llm_client::LlmClient;
use crate::types::TokenUsage;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Chat client for one OpenAI-compatible provider
pub struct ChatClient {
    /// Provider name from configuration (e.g. "groq", "ollama")
    name: String,
    /// HTTP client
    client: Client,
    /// Base URL, without trailing slash
    base_url: String,
    /// Bearer token, if the provider needs one
    api_key: Option<SecretString>,
    /// Request timeout
    timeout: Duration,
}

impl ChatClient {
    /// Create a client for the named provider
    pub fn new(name: impl Into<String>, config: &ProviderConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            client,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            api_key: config.api_key()?,
            timeout,
        })
    }

    /// Provider name this client was built for
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check that the provider answers on its models endpoint
    pub async fn health_check(&self) -> Result<ModelsResponse> {
        let url = format!("{}/models", self.base_url);

        let mut request = self.client.get(&url);
        if let Some(ref api_key) = self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(&self.name, e))?;

        if !response.status().is_success() {
            return Err(Error::invocation(
                &self.name,
                format!("health check failed with status {}", response.status()),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| Error::invocation(&self.name, format!("invalid models response: {}", e)))
    }

    fn transport_error(&self, entity: &str, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::timeout(entity, self.timeout.as_secs())
        } else {
            Error::invocation(entity, err.to_string())
        }
    }
}

#[async_trait]
impl LlmClient for ChatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let model = request.model.clone();
        debug!(provider = %self.name, model = %model, messages = request.messages.len(), "sending completion request");

        let mut http_request = self.client.post(&url).json(&request);
        if let Some(ref api_key) = self.api_key {
            http_request = http_request.bearer_auth(api_key.expose_secret());
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| self.transport_error(&model, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::invocation(
                &model,
                format!("{} request failed with status {}: {}", self.name, status, error_text),
            ));
        }

        response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| self.transport_error(&model, e))
    }

    fn client_type(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}

/// Completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Temperature for sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens for completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Always false; turns are returned whole
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    /// Create a new completion request
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            stream: false,
        }
    }

    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
}

/// Completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Unique identifier
    #[serde(default)]
    pub id: String,
    /// Model used
    #[serde(default)]
    pub model: String,
    /// Choices
    pub choices: Vec<Choice>,
    /// Token usage; some local servers omit it
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    /// Text of the first choice, if any
    pub fn text(&self) -> Option<&str> {
        self.choices.first().map(|choice| choice.message.content.as_str())
    }
}

/// Choice in completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Index of the choice
    #[serde(default)]
    pub index: u32,
    /// Message content
    pub message: Message,
    /// Finish reason
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    pub prompt_tokens: u64,
    /// Completion tokens
    pub completion_tokens: u64,
    /// Total tokens
    pub total_tokens: u64,
}

impl From<Usage> for TokenUsage {
    fn from(usage: Usage) -> Self {
        TokenUsage::new(usage.prompt_tokens, usage.completion_tokens)
    }
}

/// Models listing returned by `/models`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    /// Available models
    #[serde(default)]
    pub data: Vec<ModelInfo>,
}

/// Information about a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model ID
    pub id: String,
    /// Owner organization
    #[serde(default)]
    pub owned_by: String,
}
