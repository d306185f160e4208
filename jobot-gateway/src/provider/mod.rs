//! Completion provider abstraction.
//!
//! The gateway talks to exactly one upstream completion API at a time, but
//! keeps it behind a trait so the HTTP layer can be exercised without the
//! network.

mod openai;

pub use openai::OpenAIProvider;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use jobot_common::config::CompletionConfig;
use jobot_common::Message;
use serde::{Deserialize, Serialize};

// ============================================================================
// Provider Trait
// ============================================================================

/// Incremental content fragments of a streamed completion, in order.
pub type FragmentStream = BoxStream<'static, Result<String, ProviderError>>;

/// Unified interface for completion APIs.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Wait for the whole completion.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError>;

    /// Open a streamed completion.
    ///
    /// Resolves once the upstream has accepted the request; failures after
    /// that point arrive as `Err` items on the stream.
    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<FragmentStream, ProviderError>;
}

/// Error from a provider.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.provider, self.model, self.message)
    }
}

impl std::error::Error for ProviderError {}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Fixed generation parameters applied to every forwarded conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

impl From<&CompletionConfig> for GenerationParams {
    fn from(config: &CompletionConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

/// A conversation plus generation parameters, ready to send upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

impl CompletionRequest {
    pub fn new(params: &GenerationParams, messages: Vec<Message>) -> Self {
        Self {
            model: params.model.clone(),
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
        }
    }
}

/// Result of a non-streamed completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Generated message; `None` when the upstream reply had an unexpected shape
    pub message: Option<Message>,
    pub finish_reason: Option<String>,
    pub usage: TokenUsage,
    pub latency_ms: u64,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_generation_params() {
        let params = GenerationParams::from(&CompletionConfig::default());
        let request = CompletionRequest::new(&params, vec![Message::user("Hello")]);

        assert_eq!(request.model, "openai/gpt-4o-mini");
        assert_eq!(request.max_tokens, 4096);
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::new("openai", "gpt-4o", "API error: quota").with_status(429);
        assert_eq!(err.to_string(), "[openai:gpt-4o] API error: quota");
        assert_eq!(err.status_code, Some(429));
    }
}
