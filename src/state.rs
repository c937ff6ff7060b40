//! UI-agnostic conversation state
//!
//! Messages and the ordered conversation they live in. Nothing here knows about
//! the terminal or the network; the controller drives it and the TUI renders it.

use serde::{Deserialize, Serialize};

/// Content shown in a model message while its reply is still in flight.
pub const PLACEHOLDER: &str = "...";

/// First message of every conversation that has a live session.
pub const GREETING: &str = "Xin chào! Tôi là Gia sư 4.0. Bạn muốn học về chủ đề gì hôm nay?";

/// A chat message in the tutoring conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// Ordered message list.
///
/// Append-only, except that the trailing model message may be overwritten
/// once while its reply is pending.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_greeting() -> Self {
        Self {
            messages: vec![Message::model(GREETING)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Overwrite the trailing message if it belongs to the model.
    ///
    /// Returns false (and leaves the conversation alone) when the last
    /// message is a user message or the list is empty.
    pub fn resolve_trailing(&mut self, content: impl Into<String>) -> bool {
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Model => {
                last.content = content.into();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_conversation_starts_with_model() {
        let conversation = Conversation::with_greeting();
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.messages()[0].role, Role::Model);
        assert_eq!(conversation.messages()[0].content, GREETING);
    }

    #[test]
    fn test_resolve_trailing_replaces_model_placeholder() {
        let mut conversation = Conversation::new();
        conversation.push(Message::user("hello"));
        conversation.push(Message::model(PLACEHOLDER));

        assert!(conversation.resolve_trailing("hi there"));
        assert_eq!(conversation.last().map(|m| m.content.as_str()), Some("hi there"));
        assert_eq!(conversation.len(), 2);
    }

    #[test]
    fn test_resolve_trailing_skips_user_message() {
        let mut conversation = Conversation::new();
        conversation.push(Message::user("hello"));

        assert!(!conversation.resolve_trailing("ignored"));
        assert_eq!(conversation.last(), Some(&Message::user("hello")));
    }

    #[test]
    fn test_resolve_trailing_on_empty() {
        let mut conversation = Conversation::new();
        assert!(!conversation.resolve_trailing("ignored"));
        assert!(conversation.is_empty());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::model("x")).unwrap();
        assert_eq!(json, r#"{"role":"model","content":"x"}"#);
    }
}
