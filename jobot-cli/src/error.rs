//! Errors surfaced to the chat transcript.

use thiserror::Error;

/// Why a turn produced no assistant reply.
///
/// `Display` is the text shown after the `❌ Error:` marker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Non-2xx status without a readable error body
    #[error("HTTP error! status: {0}")]
    Http(u16),

    /// Error reported by the gateway, either as a JSON body or a stream frame
    #[error("{0}")]
    Server(String),

    /// Connection, timeout, or mid-stream read failure
    #[error("{0}")]
    Transport(String),

    #[error("Unexpected response format")]
    UnexpectedFormat,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
