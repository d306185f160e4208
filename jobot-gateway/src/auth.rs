//! Session gating for the chat endpoint.
//!
//! Sessions belong to the auth provider (Supabase). The gateway only pulls
//! the access token out of the request and asks the provider who it
//! belongs to; the token itself is never decoded or stored.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// User attached to a valid session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Why a request has no usable session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Authentication required")]
    Missing,

    #[error("Invalid or expired session")]
    Rejected,

    #[error("Session check failed: {0}")]
    Unavailable(String),
}

/// Answers whether an access token belongs to a live session.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify(&self, access_token: &str) -> Result<SessionUser, SessionError>;
}

/// Verifies tokens against Supabase's `GET /auth/v1/user`.
pub struct SupabaseSessionVerifier {
    client: reqwest::Client,
    user_url: String,
    anon_key: String,
}

impl SupabaseSessionVerifier {
    pub fn new(supabase_url: &str, anon_key: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            user_url: format!("{}/auth/v1/user", supabase_url.trim_end_matches('/')),
            anon_key: anon_key.into(),
        }
    }
}

#[async_trait]
impl SessionVerifier for SupabaseSessionVerifier {
    async fn verify(&self, access_token: &str) -> Result<SessionUser, SessionError> {
        let response = self
            .client
            .get(&self.user_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| SessionError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SessionError::Rejected);
        }
        if !status.is_success() {
            return Err(SessionError::Unavailable(format!(
                "auth provider returned {}",
                status.as_u16()
            )));
        }

        response
            .json::<SessionUser>()
            .await
            .map_err(|e| SessionError::Unavailable(format!("unreadable user: {}", e)))
    }
}

/// Session requirement applied to chat requests.
#[derive(Clone)]
pub struct SessionGate {
    verifier: Arc<dyn SessionVerifier>,
    cookie_name: Arc<String>,
}

impl SessionGate {
    pub fn new(verifier: Arc<dyn SessionVerifier>, cookie_name: impl Into<String>) -> Self {
        Self {
            verifier,
            cookie_name: Arc::new(cookie_name.into()),
        }
    }

    /// Resolve the request's session or say why there is none.
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<SessionUser, SessionError> {
        let token = extract_session_token(headers, &self.cookie_name).ok_or(SessionError::Missing)?;
        self.verifier.verify(&token).await
    }
}

/// Find the access token in the session cookie, falling back to a bearer
/// `Authorization` header.
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim().to_string());

    from_cookie
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(|token| token.trim().to_string())
        })
        .filter(|token| !token.is_empty())
}
