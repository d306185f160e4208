//! Jobot Gateway - Chat completion proxy.
//!
//! This crate provides the server side of Jobot:
//! - `/api/chat`, forwarding a whole conversation to the completion API
//! - Optional session gating against Supabase
//! - Event-stream relay of completion fragments
//! - Health checks
//!
//! ## Architecture
//!
//! ```text
//! Client → Gateway (method → body → session) → Completion API
//!                ↓
//!        JSON reply or event stream
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod auth;
pub mod provider;
pub mod routes;
pub mod stream;

pub use auth::{SessionError, SessionGate, SessionUser, SessionVerifier, SupabaseSessionVerifier};
pub use provider::{
    Completion, CompletionProvider, CompletionRequest, FragmentStream, GenerationParams,
    OpenAIProvider, ProviderError, TokenUsage,
};
pub use routes::{AppState, ChatError, ChatRequest, ChatResponse, ErrorResponse};

use axum::Router;
use jobot_common::config::Config;
use jobot_common::error::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Assemble application state from configuration.
pub fn build_state(config: &Config) -> Result<AppState> {
    let api_key = config
        .secrets
        .openai_api_key
        .as_deref()
        .ok_or_else(|| Error::Config("completion API key is not set".into()))?;

    let provider = OpenAIProvider::new(
        api_key,
        config.completions_url(),
        Duration::from_secs(config.completion.timeout_secs),
    );

    let sessions = if config.auth.require_session {
        let url = config
            .auth
            .supabase_url
            .as_deref()
            .ok_or_else(|| Error::Config("auth provider URL is not set".into()))?;
        let anon_key = config
            .secrets
            .supabase_anon_key
            .as_deref()
            .ok_or_else(|| Error::Config("auth provider key is not set".into()))?;

        let verifier = SupabaseSessionVerifier::new(
            url,
            anon_key,
            Duration::from_secs(config.auth.timeout_secs),
        );
        Some(SessionGate::new(Arc::new(verifier), config.auth.session_cookie.clone()))
    } else {
        None
    };

    Ok(AppState {
        provider: Arc::new(provider),
        sessions,
        generation: GenerationParams::from(&config.completion),
        stream_by_default: config.chat.stream,
    })
}

/// Build the gateway router around prepared state.
pub fn build_router_with_state(state: AppState, body_limit_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::build_routes(state, body_limit_bytes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Build the gateway router with all routes and middleware.
pub fn build_router(config: &Config) -> Result<Router> {
    let state = build_state(config)?;
    Ok(build_router_with_state(state, config.chat.body_limit_bytes))
}

/// Start the gateway server. Returns after Ctrl-C once in-flight requests finish.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.network.bind.parse::<std::net::IpAddr>()?,
        config.network.port,
    ));

    let router = build_router(config)?;

    tracing::info!(
        model = %config.completion.model,
        require_session = config.auth.require_session,
        stream = config.chat.stream,
        "Starting Jobot Gateway on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Jobot Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
