//! OpenAI-compatible completion provider.
//!
//! Works against any `/chat/completions` endpoint that follows the OpenAI
//! wire format (OpenAI, GitHub Models, Azure-style proxies, local servers).

use super::{
    Completion, CompletionProvider, CompletionRequest, FragmentStream, ProviderError, TokenUsage,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use jobot_common::sse::{FrameDecoder, DONE_SENTINEL};
use jobot_common::{Message, Role};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const PROVIDER_NAME: &str = "openai";

/// OpenAI-compatible API provider.
pub struct OpenAIProvider {
    client: reqwest::Client,
    completions_url: String,
}

impl OpenAIProvider {
    /// Create a provider for a full `.../chat/completions` URL.
    pub fn new(
        api_key: impl AsRef<str>,
        completions_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key.as_ref()))
                .unwrap_or_else(|_| HeaderValue::from_static("")),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            completions_url: completions_url.into(),
        }
    }

    fn error(&self, model: &str, message: impl Into<String>) -> ProviderError {
        ProviderError::new(PROVIDER_NAME, model, message)
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let body = OpenAIRequest::from_request(request, stream);

        let response = self
            .client
            .post(&self.completions_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.error(&request.model, format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self
                .error(&request.model, format!("API error: {}", upstream_message(&body)))
                .with_status(status.as_u16()));
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let start = Instant::now();
        let response = self.send(&request, false).await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.error(&request.model, format!("Failed to parse response: {}", e)))?;

        // A reply that is JSON but not a completion is reported as a missing
        // message so the caller can surface it as an unexpected format.
        let Ok(parsed) = serde_json::from_value::<OpenAIResponse>(value) else {
            tracing::warn!(model = %request.model, "Completion response has unexpected shape");
            return Ok(Completion {
                message: None,
                finish_reason: None,
                usage: TokenUsage::default(),
                latency_ms,
            });
        };

        let choice = parsed.choices.into_iter().next();
        let finish_reason = choice.as_ref().and_then(|c| c.finish_reason.clone());
        let message = choice
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(Message::assistant);

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(Completion {
            message,
            finish_reason,
            usage,
            latency_ms,
        })
    }

    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<FragmentStream, ProviderError> {
        let response = self.send(&request, true).await?;
        let model = request.model;
        let mut bytes = response.bytes_stream();

        let fragments = async_stream::stream! {
            let mut decoder = FrameDecoder::new();
            let mut finished = false;

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(ProviderError::new(PROVIDER_NAME, &model, format!("Stream interrupted: {}", e)));
                        return;
                    }
                };

                for payload in decoder.push(&chunk) {
                    if payload.trim() == DONE_SENTINEL {
                        finished = true;
                        break;
                    }
                    match parse_chunk(&payload) {
                        ChunkEvent::Content(text) => yield Ok(text),
                        ChunkEvent::Empty => {}
                        ChunkEvent::Failed(message) => {
                            yield Err(ProviderError::new(PROVIDER_NAME, &model, message));
                            return;
                        }
                    }
                }

                if finished {
                    break;
                }
            }

            if !finished {
                if let Some(payload) = decoder.finish() {
                    if let ChunkEvent::Content(text) = parse_chunk(&payload) {
                        yield Ok(text);
                    }
                }
            }
        };

        Ok(fragments.boxed())
    }
}

/// What one upstream stream chunk contributes.
#[derive(Debug, PartialEq)]
enum ChunkEvent {
    Content(String),
    Empty,
    Failed(String),
}

fn parse_chunk(payload: &str) -> ChunkEvent {
    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return ChunkEvent::Failed(error.message);
            }
            chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta)
                .and_then(|d| d.content)
                .filter(|text| !text.is_empty())
                .map_or(ChunkEvent::Empty, ChunkEvent::Content)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed upstream chunk");
            ChunkEvent::Empty
        }
    }
}

/// Pull a readable message out of an upstream error body.
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
    stream: bool,
}

impl<'a> OpenAIRequest<'a> {
    fn from_request(request: &'a CompletionRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stream,
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Token counts; servers that omit some of them still parse.
#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
    #[serde(default)]
    total_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<UpstreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: UpstreamError,
}

#[derive(Debug, Deserialize)]
struct UpstreamError {
    message: String,
}
