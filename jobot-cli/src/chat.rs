//! Chat session controller.
//!
//! Ties the conversation, the gateway client and a view together. One turn
//! runs at a time; the full history goes to the gateway on every turn.

use crate::client::ProxyClient;
use crate::conversation::{ChatEvent, Conversation};
use crate::error::ClientError;
use crate::render::ChatView;

/// Warning shown for empty submissions.
pub const EMPTY_INPUT_WARNING: &str = "Please enter a message before you hit send";

/// Warning shown when a submission arrives while a reply is pending.
pub const BUSY_WARNING: &str = "Jobot is still replying, please wait";

/// What became of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Input was empty; nothing was sent.
    Empty,
    /// A reply was already pending; nothing was sent.
    Busy,
    /// The assistant replied.
    Replied,
    /// The turn failed; the transcript holds the error message.
    Failed(ClientError),
}

pub struct ChatSession<V: ChatView> {
    conversation: Conversation,
    client: ProxyClient,
    view: V,
    stream: bool,
}

impl<V: ChatView> ChatSession<V> {
    pub fn new(client: ProxyClient, view: V, system_prompt: impl Into<String>, stream: bool) -> Self {
        Self {
            conversation: Conversation::new(system_prompt),
            client,
            view,
            stream,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// Re-render every visible message.
    pub fn show_history(&mut self) {
        for message in self.conversation.visible() {
            self.view.show_message(message);
        }
    }

    /// Send one user message and wait for the reply.
    pub async fn submit(&mut self, input: &str) -> TurnOutcome {
        if input.trim().is_empty() {
            self.view.warn(EMPTY_INPUT_WARNING);
            return TurnOutcome::Empty;
        }
        if self.conversation.is_pending() {
            self.view.warn(BUSY_WARNING);
            return TurnOutcome::Busy;
        }

        self.conversation
            .apply(ChatEvent::UserSubmitted(input.to_string()));
        if let Some(message) = self.conversation.last() {
            self.view.show_message(message);
        }

        let history = self.conversation.messages().to_vec();
        let result = if self.stream {
            self.stream_turn(&history).await
        } else {
            self.single_turn(&history).await
        };

        match result {
            Ok(()) => TurnOutcome::Replied,
            Err(err) => {
                tracing::warn!(error = %err, "Chat turn failed");
                self.view.warn(&format!("Jobot could not reply: {err}"));
                TurnOutcome::Failed(err)
            }
        }
    }

    async fn stream_turn(&mut self, history: &[jobot_common::Message]) -> Result<(), ClientError> {
        self.conversation.apply(ChatEvent::AssistantStarted);
        self.view.typing();

        let conversation = &mut self.conversation;
        let view = &mut self.view;
        let result = self
            .client
            .complete_stream(history, |text| {
                conversation.apply(ChatEvent::AssistantContent(text.to_string()));
                view.stream_update(text);
            })
            .await;

        match &result {
            Ok(_) => self.conversation.apply(ChatEvent::AssistantFinished),
            Err(err) => self.conversation.apply(ChatEvent::Failed(err.to_string())),
        }
        if let Some(message) = self.conversation.last() {
            self.view.stream_finished(message);
        }
        result.map(|_| ())
    }

    async fn single_turn(&mut self, history: &[jobot_common::Message]) -> Result<(), ClientError> {
        self.view.typing();

        let result = self.client.complete(history).await;
        let outcome = match result {
            Ok(reply) => {
                self.conversation
                    .apply(ChatEvent::AssistantReplied(reply.content));
                Ok(())
            }
            Err(err) => {
                self.conversation.apply(ChatEvent::Failed(err.to_string()));
                Err(err)
            }
        };

        if let Some(message) = self.conversation.last() {
            self.view.stream_finished(message);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobot_common::Message;
    use std::time::Duration;

    #[derive(Default)]
    struct Notices {
        warnings: Vec<String>,
        shown: Vec<Message>,
    }

    impl ChatView for Notices {
        fn warn(&mut self, message: &str) {
            self.warnings.push(message.to_string());
        }

        fn show_message(&mut self, message: &Message) {
            self.shown.push(message.clone());
        }

        fn typing(&mut self) {}

        fn stream_update(&mut self, _content: &str) {}

        fn stream_finished(&mut self, _message: &Message) {}
    }

    fn session() -> ChatSession<Notices> {
        // never contacted
        let client = ProxyClient::new("http://127.0.0.1:9/api/chat", Duration::from_secs(1)).unwrap();
        ChatSession::new(client, Notices::default(), "sys", false)
    }

    #[test]
    fn test_submit_refused_while_reply_pending() {
        let mut session = session();
        session
            .conversation
            .apply(ChatEvent::UserSubmitted("first".into()));
        assert!(session.conversation().is_pending());

        let outcome = tokio_test::block_on(session.submit("again"));

        assert_eq!(outcome, TurnOutcome::Busy);
        assert_eq!(session.view().warnings, vec![BUSY_WARNING]);
        assert!(session.view().shown.is_empty());
        assert_eq!(session.conversation().messages().len(), 2);
        assert_eq!(session.conversation().last().unwrap().content, "first");
    }

    #[test]
    fn test_empty_input_checked_before_pending() {
        let mut session = session();
        session
            .conversation
            .apply(ChatEvent::UserSubmitted("first".into()));

        let outcome = tokio_test::block_on(session.submit("  "));
        assert_eq!(outcome, TurnOutcome::Empty);
        assert_eq!(session.view().warnings, vec![EMPTY_INPUT_WARNING]);
    }
}
