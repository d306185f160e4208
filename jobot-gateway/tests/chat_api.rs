//! Integration tests for the Jobot gateway.
//!
//! Drives the router with `oneshot` against fake providers and, for the
//! end-to-end cases, a wiremock completion API.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use futures_util::stream::{self, StreamExt};
use jobot_common::config::Config;
use jobot_common::{Message, Role};
use jobot_gateway::{
    build_router, build_router_with_state, AppState, ChatResponse, Completion, CompletionProvider,
    CompletionRequest, ErrorResponse, FragmentStream, GenerationParams, ProviderError,
    SessionError, SessionGate, SessionUser, SessionVerifier, TokenUsage,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ─────────────────────────────────────────────────────────────────────────────
// Fakes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Reply {
    Message(Option<String>),
    Fragments(Vec<Result<String, String>>),
    OpenFails(String),
}

struct FakeProvider {
    reply: Reply,
    calls: AtomicUsize,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl FakeProvider {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self, request: CompletionRequest) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
    }

    fn fail(message: &str) -> ProviderError {
        ProviderError::new("fake", "fake-model", message)
    }
}

#[async_trait]
impl CompletionProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        self.record(request);
        match &self.reply {
            Reply::Message(content) => Ok(Completion {
                message: content.clone().map(Message::assistant),
                finish_reason: Some("stop".into()),
                usage: TokenUsage::default(),
                latency_ms: 1,
            }),
            Reply::OpenFails(msg) => Err(Self::fail(msg)),
            Reply::Fragments(_) => panic!("non-stream call on a streaming fake"),
        }
    }

    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<FragmentStream, ProviderError> {
        self.record(request);
        match &self.reply {
            Reply::Fragments(items) => {
                let items: Vec<Result<String, ProviderError>> = items
                    .iter()
                    .map(|item| item.clone().map_err(|e| Self::fail(&e)))
                    .collect();
                Ok(stream::iter(items).boxed())
            }
            Reply::OpenFails(msg) => Err(Self::fail(msg)),
            Reply::Message(_) => panic!("stream call on a non-streaming fake"),
        }
    }
}

struct FakeVerifier;

#[async_trait]
impl SessionVerifier for FakeVerifier {
    async fn verify(&self, access_token: &str) -> Result<SessionUser, SessionError> {
        match access_token {
            "valid-token" => Ok(SessionUser {
                id: "user-1".into(),
                email: None,
            }),
            "outage" => Err(SessionError::Unavailable("connection refused".into())),
            _ => Err(SessionError::Rejected),
        }
    }
}

fn state(provider: Arc<FakeProvider>, require_session: bool, stream: bool) -> AppState {
    AppState {
        provider,
        sessions: require_session
            .then(|| SessionGate::new(Arc::new(FakeVerifier), "sb-access-token")),
        generation: GenerationParams::from(&Config::default().completion),
        stream_by_default: stream,
    }
}

fn app(provider: Arc<FakeProvider>, require_session: bool, stream: bool) -> Router {
    build_router_with_state(state(provider, require_session, stream), 1024 * 1024)
}

fn conversation() -> Value {
    json!({
        "messages": [
            {"role": "system", "content": "You are Jobot."},
            {"role": "user", "content": "Hello"}
        ]
    })
}

async fn send(
    app: &Router,
    method: Method,
    body: Option<String>,
    cookie: Option<&str>,
) -> (StatusCode, axum::http::HeaderMap, String) {
    let mut request = Request::builder().method(method).uri("/api/chat");
    if let Some(c) = cookie {
        request = request.header(header::COOKIE, c);
    }
    let request = match body {
        Some(b) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

fn error_of(body: &str) -> ErrorResponse {
    serde_json::from_str(body).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Request Validation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_is_rejected_without_upstream_call() {
    let provider = FakeProvider::new(Reply::Message(Some("hi".into())));
    let app = app(provider.clone(), false, false);

    let (status, headers, body) = send(&app, Method::GET, None, None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(headers.get(header::ALLOW).unwrap(), "POST");
    assert_eq!(error_of(&body).error, "Method not allowed");
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_method_checked_before_session() {
    let provider = FakeProvider::new(Reply::Message(Some("hi".into())));
    let app = app(provider.clone(), true, false);

    let (status, _, _) = send(&app, Method::PUT, Some(conversation().to_string()), None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_oversized_body_on_get_is_still_method_not_allowed() {
    let provider = FakeProvider::new(Reply::Message(Some("hi".into())));
    let app = build_router_with_state(state(provider.clone(), false, false), 256);

    let (status, headers, _) = send(&app, Method::GET, Some("x".repeat(4096)), None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(headers.get(header::ALLOW).unwrap(), "POST");
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_oversized_post_is_payload_too_large() {
    let provider = FakeProvider::new(Reply::Message(Some("hi".into())));
    let app = build_router_with_state(state(provider.clone(), false, false), 256);

    let big = json!({"messages": [{"role": "user", "content": "x".repeat(4096)}]});
    let (status, _, body) = send(&app, Method::POST, Some(big.to_string()), None).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(error_of(&body).code, "PAYLOAD_TOO_LARGE");
    assert_eq!(provider.calls(), 0);

    let (status, _, _) = send(&app, Method::POST, Some(conversation().to_string()), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_bodies_are_bad_requests() {
    let provider = FakeProvider::new(Reply::Message(Some("hi".into())));
    let app = app(provider.clone(), false, false);

    let bodies = [
        json!({"messages": "Hello"}).to_string(),
        json!({"prompt": "Hello"}).to_string(),
        json!({"messages": [{"role": "robot", "content": "x"}]}).to_string(),
        json!({"messages": []}).to_string(),
        "{ not json".to_string(),
    ];

    for body in bodies {
        let (status, _, text) = send(&app, Method::POST, Some(body.clone()), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(error_of(&text).error, "Messages array is required");
    }
    assert_eq!(provider.calls(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Gating
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_session_is_unauthorized() {
    let provider = FakeProvider::new(Reply::Message(Some("hi".into())));
    let app = app(provider.clone(), true, false);

    let (status, _, body) = send(&app, Method::POST, Some(conversation().to_string()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_of(&body).code, "AUTH_REQUIRED");
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_rejected_or_unchecked_session_is_unauthorized() {
    let provider = FakeProvider::new(Reply::Message(Some("hi".into())));
    let app = app(provider.clone(), true, false);

    for cookie in ["sb-access-token=expired", "sb-access-token=outage"] {
        let (status, _, _) =
            send(&app, Method::POST, Some(conversation().to_string()), Some(cookie)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "cookie: {cookie}");
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_valid_session_reaches_provider() {
    let provider = FakeProvider::new(Reply::Message(Some("Hi there".into())));
    let app = app(provider.clone(), true, false);

    let (status, _, _) = send(
        &app,
        Method::POST,
        Some(conversation().to_string()),
        Some("theme=dark; sb-access-token=valid-token"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(provider.calls(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Non-streaming
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_non_stream_returns_assistant_message() {
    let provider = FakeProvider::new(Reply::Message(Some("Hi there".into())));
    let app = app(provider.clone(), false, false);

    let (status, _, body) = send(&app, Method::POST, Some(conversation().to_string()), None).await;
    assert_eq!(status, StatusCode::OK);

    let reply: ChatResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(reply.message.role, Role::Assistant);
    assert_eq!(reply.message.content, "Hi there");

    let forwarded = provider.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(forwarded.messages.len(), 2);
    assert_eq!(forwarded.messages[0].role, Role::System);
    assert_eq!(forwarded.max_tokens, 4096);
    assert_eq!(forwarded.temperature, 1.0);
}

#[tokio::test]
async fn test_missing_message_is_unexpected_format() {
    let provider = FakeProvider::new(Reply::Message(None));
    let app = app(provider.clone(), false, false);

    let (status, _, body) = send(&app, Method::POST, Some(conversation().to_string()), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_of(&body).error, "Unexpected response format");
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_upstream_failure_is_server_error() {
    let provider = FakeProvider::new(Reply::OpenFails("API error: rate limited".into()));
    let app = app(provider.clone(), false, false);

    let (status, _, body) = send(&app, Method::POST, Some(conversation().to_string()), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_of(&body).error, "API error: rate limited");
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stream_relays_fragments_then_done() {
    let provider = FakeProvider::new(Reply::Fragments(vec![
        Ok("Hel".into()),
        Ok(String::new()),
        Ok("lo".into()),
    ]));
    let app = app(provider.clone(), false, true);

    let (status, headers, body) =
        send(&app, Method::POST, Some(conversation().to_string()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/event-stream");
    assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-cache");
    assert_eq!(headers.get(header::CONNECTION).unwrap(), "keep-alive");
    assert_eq!(
        body,
        "data: {\"content\":\"Hel\"}\n\ndata: {\"content\":\"lo\"}\n\ndata: {\"done\":true}\n\n"
    );
}

#[tokio::test]
async fn test_stream_flag_overrides_default() {
    let provider = FakeProvider::new(Reply::Fragments(vec![Ok("x".into())]));
    let app = app(provider.clone(), false, false);

    let mut body = conversation();
    body["stream"] = json!(true);
    let (status, headers, _) = send(&app, Method::POST, Some(body.to_string()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/event-stream");
}

#[tokio::test]
async fn test_mid_stream_failure_writes_error_frame() {
    let provider = FakeProvider::new(Reply::Fragments(vec![
        Ok("Par".into()),
        Err("upstream closed".into()),
    ]));
    let app = app(provider.clone(), false, true);

    let (status, _, body) = send(&app, Method::POST, Some(conversation().to_string()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        "data: {\"content\":\"Par\"}\n\ndata: {\"error\":\"upstream closed\"}\n\n"
    );
}

#[tokio::test]
async fn test_stream_open_failure_is_json_error() {
    let provider = FakeProvider::new(Reply::OpenFails("API error: bad key".into()));
    let app = app(provider.clone(), false, true);

    let (status, headers, body) =
        send(&app, Method::POST, Some(conversation().to_string()), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_ne!(headers.get(header::CONTENT_TYPE).unwrap(), "text/event-stream");
    assert_eq!(error_of(&body).error, "API error: bad key");
}

// ─────────────────────────────────────────────────────────────────────────────
// End to end against a mock completion API
// ─────────────────────────────────────────────────────────────────────────────

fn config_for(server: &MockServer, stream: bool) -> Config {
    let mut config = Config::default();
    config.completion.base_url = server.uri();
    config.secrets.openai_api_key = Some("sk-test".into());
    config.chat.stream = stream;
    config
}

#[tokio::test]
async fn test_end_to_end_non_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Hello from upstream"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = build_router(&config_for(&server, false)).unwrap();
    let (status, _, body) = send(&app, Method::POST, Some(conversation().to_string()), None).await;
    assert_eq!(status, StatusCode::OK);

    let reply: ChatResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(reply.message.content, "Hello from upstream");
}

#[tokio::test]
async fn test_end_to_end_stream() {
    let server = MockServer::start().await;
    let upstream = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n\n",
        "data: [DONE]\n\n"
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(upstream),
        )
        .mount(&server)
        .await;

    let app = build_router(&config_for(&server, true)).unwrap();
    let (status, _, body) = send(&app, Method::POST, Some(conversation().to_string()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        "data: {\"content\":\"He\"}\n\ndata: {\"content\":\"llo\"}\n\ndata: {\"done\":true}\n\n"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_check() {
    let provider = FakeProvider::new(Reply::Message(None));
    let app = app(provider, false, false);

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    let health: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["service"], "jobot-gateway");
}
