//! Conversation state.
//!
//! All changes go through [`Conversation::apply`], so the transcript, the
//! pending flag and the streaming placeholder can never disagree.

use jobot_common::{Message, Role};

/// Prefix of assistant messages that stand in for a failed reply.
pub const ERROR_PREFIX: &str = "❌ Error: ";

/// Something that happened during a chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The user sent a message; a reply is now pending. Ignored while
    /// another reply is still pending.
    UserSubmitted(String),
    /// A streamed reply began; an empty assistant placeholder is appended.
    AssistantStarted,
    /// Accumulated content of the streamed reply so far.
    AssistantContent(String),
    /// The streamed reply ended normally.
    AssistantFinished,
    /// A whole reply arrived at once.
    AssistantReplied(String),
    /// The turn failed.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    pending: bool,
    streaming: bool,
}

impl Conversation {
    /// Start a conversation seeded with the system prompt.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            pending: false,
            streaming: false,
        }
    }

    pub fn apply(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::UserSubmitted(content) => {
                if self.pending {
                    tracing::debug!("Dropping submission while a reply is pending");
                    return;
                }
                self.messages.push(Message::user(content));
                self.pending = true;
            }
            ChatEvent::AssistantStarted => {
                self.messages.push(Message::assistant(""));
                self.streaming = true;
            }
            ChatEvent::AssistantContent(content) => {
                if let Some(placeholder) = self.placeholder_mut() {
                    placeholder.content = content;
                } else {
                    tracing::debug!("Dropping content with no reply in progress");
                }
            }
            ChatEvent::AssistantFinished => {
                self.streaming = false;
                self.pending = false;
            }
            ChatEvent::AssistantReplied(content) => {
                self.messages.push(Message::assistant(content));
                self.pending = false;
            }
            ChatEvent::Failed(reason) => {
                let text = format!("{ERROR_PREFIX}{reason}");
                match self.placeholder_mut() {
                    Some(placeholder) => placeholder.content = text,
                    None => self.messages.push(Message::assistant(text)),
                }
                self.streaming = false;
                self.pending = false;
            }
        }
    }

    fn placeholder_mut(&mut self) -> Option<&mut Message> {
        if !self.streaming {
            return None;
        }
        self.messages
            .last_mut()
            .filter(|m| m.role == Role::Assistant)
    }

    /// Full history, system prompt included, as sent to the gateway.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages shown in the transcript.
    pub fn visible(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }
}
