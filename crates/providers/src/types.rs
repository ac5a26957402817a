use parley_core::{Message, MessageRole};
use serde::{Deserialize, Serialize};

/// The role of a message sender on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl From<MessageRole> for Role {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => Role::User,
            MessageRole::Assistant => Role::Assistant,
        }
    }
}

/// A single entry of the outbound `chat_history`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self { role: message.role.into(), content: message.content.clone() }
    }
}

/// Ordered message list: system directive, prior turns, new prompt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboundPayload(pub Vec<ChatMessage>);

impl OutboundPayload {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Content of the leading system message
    pub fn system_content(&self) -> Option<&str> {
        self.0.first().filter(|m| m.role == Role::System).map(|m| m.content.as_str())
    }
}

/// Request body for `POST {base_url}{path}`
///
/// `prompt` is always empty; the new prompt is the last entry of `chat_history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
    pub chat_history: OutboundPayload,
}

impl PromptRequest {
    pub fn new(chat_history: OutboundPayload) -> Self {
        Self { prompt: String::new(), chat_history }
    }

    /// The user prompt carried by this request
    pub fn latest_prompt(&self) -> Option<&str> {
        self.chat_history.0.last().filter(|m| m.role == Role::User).map(|m| m.content.as_str())
    }
}

/// Normalized backend reply
///
/// `message` is `None` when a 2xx body carried no usable reply text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionReply {
    pub message: Option<String>,
}

impl CompletionReply {
    pub fn text(message: impl Into<String>) -> Self {
        Self { message: Some(message.into()) }
    }

    pub fn empty() -> Self {
        Self { message: None }
    }
}
