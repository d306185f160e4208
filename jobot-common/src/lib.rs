//! Jobot Common - Shared types, framing, and configuration for Jobot.
//!
//! This crate provides:
//! - The role-tagged `Message` model shared by the gateway and the chat client
//! - Server-sent event framing (`data: <json>\n\n`) in both directions
//! - Configuration types and loading
//! - Error types
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod message;
pub mod sse;
pub mod util;

pub use config::{
    AuthConfig, ChatConfig, ClientConfig, CompletionConfig, Config, NetworkConfig,
    ObservabilityConfig, SecretsConfig,
};
pub use error::{Error, Result};
pub use message::{Message, Role, StreamFrame};
pub use sse::FrameDecoder;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::message::{Message, Role, StreamFrame};
}
