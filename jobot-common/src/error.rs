//! Error types for Jobot.

use thiserror::Error;

/// Result type alias using the Jobot error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Jobot components.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("missing completion API key".into());
        assert_eq!(err.to_string(), "Configuration error: missing completion API key");
    }

    #[test]
    fn test_json_error_converts() {
        fn parse(text: &str) -> Result<u8> {
            Ok(serde_json::from_str(text)?)
        }
        assert!(matches!(parse("nope"), Err(Error::Json(_))));
        assert_eq!(parse("7").unwrap(), 7);
    }
}
