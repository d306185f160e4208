//! HTTP client for the Jobot gateway's chat endpoint.

use crate::error::{ClientError, ClientResult};
use crate::stream::reconstruct;
use jobot_common::config::Config;
use jobot_common::Message;
use reqwest::header::COOKIE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for `POST /api/chat`.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
    endpoint: String,
    /// `name=value` cookie carrying the session token
    session_cookie: Option<String>,
}

impl ProxyClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> ClientResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            session_cookie: None,
        })
    }

    /// Create a client from the `client` and `auth` config sections.
    pub fn from_config(config: &Config) -> ClientResult<Self> {
        let client = Self::new(
            config.client.endpoint.clone(),
            Duration::from_secs(config.client.timeout_secs),
        )?;

        Ok(match &config.client.session_token {
            Some(token) => client.with_session(&config.auth.session_cookie, token),
            None => client,
        })
    }

    /// Send the session token as a cookie on every request.
    pub fn with_session(mut self, cookie_name: &str, token: &str) -> Self {
        self.session_cookie = Some(format!("{cookie_name}={token}"));
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, messages: &[Message], stream: bool) -> ClientResult<reqwest::Response> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .json(&ChatPayload { messages, stream });
        if let Some(cookie) = &self.session_cookie {
            request = request.header(COOKIE, cookie);
        }

        tracing::debug!(endpoint = %self.endpoint, messages = messages.len(), stream, "Sending conversation");
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(err) if !err.error.is_empty() => Err(ClientError::Server(err.error)),
            _ => Err(ClientError::Http(status.as_u16())),
        }
    }

    /// Request a whole reply.
    pub async fn complete(&self, messages: &[Message]) -> ClientResult<Message> {
        let response = self.send(messages, false).await?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|_| ClientError::UnexpectedFormat)?;

        body.get("message")
            .cloned()
            .and_then(|m| serde_json::from_value::<Message>(m).ok())
            .ok_or(ClientError::UnexpectedFormat)
    }

    /// Request a streamed reply, calling `on_update` with the text so far.
    pub async fn complete_stream<F>(&self, messages: &[Message], on_update: F) -> ClientResult<String>
    where
        F: FnMut(&str),
    {
        let response = self.send(messages, true).await?;
        reconstruct(response.bytes_stream(), on_update).await
    }
}
