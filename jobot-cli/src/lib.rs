//! Jobot CLI - Terminal chat client for the Jobot gateway.
//!
//! - [`conversation`]: transcript state, changed only through events
//! - [`client`]: requests to `/api/chat`, JSON or streamed
//! - [`stream`]: rebuilds a reply from the gateway's event stream
//! - [`chat`]: one submit-and-reply turn at a time
//! - [`render`]: markdown-aware terminal output

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod chat;
pub mod client;
pub mod conversation;
pub mod error;
pub mod render;
pub mod stream;

pub use chat::{ChatSession, TurnOutcome};
pub use client::ProxyClient;
pub use conversation::{ChatEvent, Conversation};
pub use error::{ClientError, ClientResult};
pub use render::{ChatView, TerminalView};
