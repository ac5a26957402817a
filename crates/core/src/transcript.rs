use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Content shown in the assistant placeholder while a request is outstanding
pub const PLACEHOLDER_CONTENT: &str = "...";

/// Capacity of the change notification channel
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Author of a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Only ever true for the transient assistant placeholder
    #[serde(default, alias = "loading", skip_serializing_if = "std::ops::Not::not")]
    pub pending: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into(), pending: false }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into(), pending: false }
    }

    /// Assistant placeholder awaiting a reply
    pub fn placeholder() -> Self {
        Self { role: MessageRole::Assistant, content: PLACEHOLDER_CONTENT.to_string(), pending: true }
    }
}

/// Mutation notifications broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptChange {
    /// Messages were appended at the end
    Appended { count: usize },
    /// The pending placeholder was replaced by a resolved message
    ReplacedLast,
    /// Pending placeholders were removed
    PendingRemoved { count: usize },
    /// The transcript was emptied
    Cleared,
}

/// Ordered list of exchanged messages plus at most one pending placeholder
///
/// Supports:
/// - Appending messages (never reorders existing entries)
/// - Replacing the pending placeholder with the resolved reply
/// - Rolling back placeholders after a failed request
/// - Subscribing to mutations
#[derive(Debug)]
pub struct TranscriptStore {
    messages: Vec<Message>,
    changes: broadcast::Sender<TranscriptChange>,
}

impl TranscriptStore {
    /// Create an empty transcript
    pub fn new() -> Self {
        Self::from_messages(Vec::new())
    }

    /// Rehydrate a transcript from persisted messages
    ///
    /// Pending entries cannot survive a restart and are dropped.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let messages = messages.into_iter().filter(|m| !m.pending).collect();
        Self { messages, changes }
    }

    /// Subscribe to mutation notifications
    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptChange> {
        self.changes.subscribe()
    }

    /// Append one or more messages to the end of the transcript
    pub fn append(&mut self, messages: impl IntoIterator<Item = Message>) -> Result<()> {
        let messages: Vec<Message> = messages.into_iter().collect();
        if messages.is_empty() {
            return Ok(());
        }

        let incoming_pending = messages.iter().filter(|m| m.pending).count();
        if incoming_pending + self.pending_count() > 1 {
            return Err(Error::invariant("transcript may hold at most one pending message"));
        }

        let count = messages.len();
        self.messages.extend(messages);
        self.notify(TranscriptChange::Appended { count });
        Ok(())
    }

    /// Replace the trailing pending placeholder with a resolved message
    pub fn replace_last(&mut self, message: Message) -> Result<()> {
        if message.pending {
            return Err(Error::invariant("replacement message must not be pending"));
        }

        match self.messages.last_mut() {
            Some(last) if last.pending => {
                *last = message;
                self.notify(TranscriptChange::ReplacedLast);
                Ok(())
            }
            Some(_) => Err(Error::invariant("last transcript entry is not a pending placeholder")),
            None => Err(Error::invariant("transcript is empty, nothing to replace")),
        }
    }

    /// Strip every pending placeholder, returning how many were removed
    pub fn remove_all_pending(&mut self) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| !m.pending);
        let count = before - self.messages.len();
        if count > 0 {
            self.notify(TranscriptChange::PendingRemoved { count });
        }
        count
    }

    /// Empty the transcript
    pub fn clear(&mut self) {
        self.messages.clear();
        self.notify(TranscriptChange::Cleared);
    }

    /// All entries, including a pending placeholder if one exists
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Resolved entries only, in order
    pub fn history(&self) -> Vec<Message> {
        self.messages.iter().filter(|m| !m.pending).cloned().collect()
    }

    /// Get a message by position
    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Whether a placeholder is currently present
    pub fn has_pending(&self) -> bool {
        self.messages.iter().any(|m| m.pending)
    }

    fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.pending).count()
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if transcript is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn notify(&self, change: TranscriptChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_exchange() -> TranscriptStore {
        let mut store = TranscriptStore::new();
        store.append(vec![Message::user("hi"), Message::assistant("yo")]).unwrap();
        store
    }

    #[test]
    fn test_append_preserves_order() {
        let mut store = store_with_exchange();
        store.append(vec![Message::user("next")]).unwrap();

        let contents: Vec<&str> = store.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "yo", "next"]);
    }

    #[test]
    fn test_append_empty_is_noop() {
        let mut store = TranscriptStore::new();
        let mut rx = store.subscribe();
        store.append(Vec::new()).unwrap();
        assert!(store.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_append_rejects_second_pending() {
        let mut store = TranscriptStore::new();
        store.append(vec![Message::user("a"), Message::placeholder()]).unwrap();

        let result = store.append(vec![Message::placeholder()]);
        assert!(matches!(result, Err(Error::Invariant(_))));
        assert_eq!(store.len(), 2);

        let mut fresh = TranscriptStore::new();
        let result = fresh.append(vec![Message::placeholder(), Message::placeholder()]);
        assert!(result.is_err());
        assert!(fresh.is_empty());
    }

    #[test]
    fn test_replace_last_resolves_placeholder() {
        let mut store = store_with_exchange();
        store.append(vec![Message::user("2+2?"), Message::placeholder()]).unwrap();
        assert!(store.has_pending());

        store.replace_last(Message::assistant("4")).unwrap();

        assert!(!store.has_pending());
        assert_eq!(store.last(), Some(&Message::assistant("4")));
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_replace_last_without_pending_fails() {
        let mut store = store_with_exchange();
        let result = store.replace_last(Message::assistant("late"));
        assert!(matches!(result, Err(Error::Invariant(_))));
        assert_eq!(store.last(), Some(&Message::assistant("yo")));

        let mut empty = TranscriptStore::new();
        assert!(empty.replace_last(Message::assistant("x")).is_err());
    }

    #[test]
    fn test_replace_last_rejects_pending_replacement() {
        let mut store = TranscriptStore::new();
        store.append(vec![Message::placeholder()]).unwrap();
        let result = store.replace_last(Message::placeholder());
        assert!(result.is_err());
        assert!(store.has_pending());
    }

    #[test]
    fn test_remove_all_pending_rolls_back() {
        let mut store = store_with_exchange();
        store.append(vec![Message::user("q"), Message::placeholder()]).unwrap();

        assert_eq!(store.remove_all_pending(), 1);
        assert_eq!(store.len(), 3);
        assert_eq!(store.last(), Some(&Message::user("q")));
        assert_eq!(store.remove_all_pending(), 0);
    }

    #[test]
    fn test_clear() {
        let mut store = store_with_exchange();
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_history_excludes_pending() {
        let mut store = store_with_exchange();
        store.append(vec![Message::user("q"), Message::placeholder()]).unwrap();

        let history = store.history();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|m| !m.pending));
    }

    #[test]
    fn test_from_messages_drops_pending() {
        let store = TranscriptStore::from_messages(vec![Message::user("q"), Message::placeholder()]);
        assert_eq!(store.messages(), &[Message::user("q")]);
    }

    #[test]
    fn test_subscribers_observe_mutations() {
        let mut store = TranscriptStore::new();
        let mut rx = store.subscribe();

        store.append(vec![Message::user("q"), Message::placeholder()]).unwrap();
        store.replace_last(Message::assistant("a")).unwrap();
        store.append(vec![Message::user("q2"), Message::placeholder()]).unwrap();
        store.remove_all_pending();
        store.clear();

        assert_eq!(rx.try_recv().unwrap(), TranscriptChange::Appended { count: 2 });
        assert_eq!(rx.try_recv().unwrap(), TranscriptChange::ReplacedLast);
        assert_eq!(rx.try_recv().unwrap(), TranscriptChange::Appended { count: 2 });
        assert_eq!(rx.try_recv().unwrap(), TranscriptChange::PendingRemoved { count: 1 });
        assert_eq!(rx.try_recv().unwrap(), TranscriptChange::Cleared);
    }

    #[test]
    fn test_message_serialization() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);

        let json = serde_json::to_string(&Message::placeholder()).unwrap();
        assert!(json.contains(r#""pending":true"#));
    }

    #[test]
    fn test_message_accepts_loading_alias() {
        let msg: Message = serde_json::from_str(r#"{"role":"assistant","content":"...","loading":true}"#).unwrap();
        assert!(msg.pending);
        assert_eq!(msg.role, MessageRole::Assistant);
    }

    #[test]
    fn test_message_role_display() {
        assert_eq!(MessageRole::User.to_string(), "user");
        assert_eq!(MessageRole::Assistant.as_str(), "assistant");
    }
}
