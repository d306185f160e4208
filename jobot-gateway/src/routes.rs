//! Route definitions for the Jobot gateway.
//!
//! Provides the chat completion endpoint and health checks.

use crate::auth::{SessionError, SessionGate};
use crate::provider::{CompletionProvider, CompletionRequest, GenerationParams, ProviderError};
use crate::stream::event_stream_response;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Request, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{any, get},
    Router,
};
use jobot_common::logging::generate_request_id;
use jobot_common::util::truncate_with_ellipsis;
use jobot_common::Message;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn CompletionProvider>,
    /// Present when chat requests need a live session
    pub sessions: Option<SessionGate>,
    pub generation: GenerationParams,
    pub stream_by_default: bool,
}

/// Chat request body.
///
/// The endpoint is stateless: clients send the whole conversation,
/// including the system prompt, on every turn.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: Option<bool>,
}

/// Non-streamed chat response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: Message,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// Failures of the chat endpoint, each mapped to a status and JSON body.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Messages array is required")]
    BadRequest,

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("{0}")]
    Unauthorized(#[from] SessionError),

    #[error("Unexpected response format")]
    UnexpectedFormat,

    #[error("{}", .0.message)]
    Upstream(#[from] ProviderError),
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ChatError::BadRequest => StatusCode::BAD_REQUEST,
            ChatError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ChatError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ChatError::UnexpectedFormat | ChatError::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ChatError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ChatError::BadRequest => "INVALID_REQUEST",
            ChatError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ChatError::Unauthorized(_) => "AUTH_REQUIRED",
            ChatError::UnexpectedFormat => "UNEXPECTED_FORMAT",
            ChatError::Upstream(_) => "UPSTREAM_ERROR",
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().into(),
        });

        if matches!(self, ChatError::MethodNotAllowed) {
            return (status, [(header::ALLOW, "POST")], body).into_response();
        }
        (status, body).into_response()
    }
}

/// Build the chat route.
pub fn chat_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", any(chat_handler))
        .with_state(state)
}

/// Build health check routes.
pub fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/health", get(health_handler))
}

/// Build all gateway routes.
///
/// The body limit is enforced when the chat handler reads the body, after
/// the method check.
pub fn build_routes(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .merge(chat_routes(state))
        .merge(health_routes())
        .layer(DefaultBodyLimit::max(body_limit_bytes))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Chat completion handler.
///
/// Checks run in a fixed order and each one fails before the completion
/// API is contacted: method, body, session. The body is not read until the
/// method has been accepted.
async fn chat_handler(
    State(state): State<AppState>,
    req: Request,
) -> Result<Response, ChatError> {
    let request_id = generate_request_id();
    let span = tracing::info_span!("chat", request_id = %request_id);

    handle_chat(state, req, request_id)
        .instrument(span)
        .await
        .map_err(|e| {
            match &e {
                ChatError::Upstream(inner) => tracing::error!(error = %inner, "Chat request failed"),
                other => tracing::debug!(error = %other, "Chat request rejected"),
            }
            e
        })
}

async fn handle_chat(
    state: AppState,
    req: Request,
    request_id: String,
) -> Result<Response, ChatError> {
    if req.method() != Method::POST {
        return Err(ChatError::MethodNotAllowed);
    }

    let headers = req.headers().clone();
    let body = read_body(req, &state).await?;
    let request: ChatRequest =
        serde_json::from_slice(&body).map_err(|_| ChatError::BadRequest)?;
    if request.messages.is_empty() {
        return Err(ChatError::BadRequest);
    }

    if let Some(gate) = &state.sessions {
        let user = gate.authorize(&headers).await.map_err(|e| {
            tracing::warn!(reason = %e, "Session check failed");
            ChatError::Unauthorized(e)
        })?;
        tracing::debug!(user_id = %user.id, "Session accepted");
    }

    let stream = request.stream.unwrap_or(state.stream_by_default);
    let preview = request
        .messages
        .last()
        .map(|m| truncate_with_ellipsis(&m.content, 60))
        .unwrap_or_default();
    tracing::info!(
        messages = request.messages.len(),
        stream,
        last = %preview,
        "Forwarding conversation"
    );

    let completion_request = CompletionRequest::new(&state.generation, request.messages);

    if stream {
        let fragments = state.provider.complete_stream(completion_request).await?;
        return Ok(event_stream_response(fragments, request_id));
    }

    let completion = state.provider.complete(completion_request).await?;
    let message = completion.message.ok_or_else(|| {
        tracing::error!(provider = state.provider.name(), "Completion had no message");
        ChatError::UnexpectedFormat
    })?;

    tracing::info!(
        latency_ms = completion.latency_ms,
        output_tokens = completion.usage.output_tokens,
        "Completion returned"
    );

    Ok(Json(ChatResponse { message }).into_response())
}

/// Buffer the body under the router's `DefaultBodyLimit`.
async fn read_body(req: Request, state: &AppState) -> Result<Bytes, ChatError> {
    Bytes::from_request(req, state).await.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ChatError::PayloadTooLarge
        } else {
            tracing::debug!(reason = %rejection.body_text(), "Failed to read request body");
            ChatError::BadRequest
        }
    })
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "jobot-gateway".into(),
    })
}
