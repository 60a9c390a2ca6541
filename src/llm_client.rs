//! Unified LLM client trait for remote (Groq, OpenRouter) and local (Ollama, vLLM) models

use crate::chat::{CompletionRequest, CompletionResponse};
use crate::error::Result;
use async_trait::async_trait;

/// Unified trait for LLM clients
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a completion request and wait for the whole reply
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the client type for debugging/logging
    fn client_type(&self) -> &str;

    /// Get the base URL (for local models) or endpoint (for remote)
    fn endpoint(&self) -> &str;
}
