// crates/server/src/threads.rs
//! Conversation persistence seam.
//!
//! Executors append assistant replies through this trait; the
//! synchronization layer on the client probes it (via the API) to decide
//! when an optimistic pending marker may be cleared. The in-memory
//! implementation is the default backing store.

use std::collections::HashMap;
use std::sync::RwLock;

use skilldeck_core::types::ChatMessage;

pub trait ThreadStore: Send + Sync {
    /// Append a message to a conversation, creating the thread if needed.
    fn append(&self, conversation_id: &str, message: ChatMessage);

    /// Full message history, oldest first. Empty for unknown threads.
    fn history(&self, conversation_id: &str) -> Vec<ChatMessage>;

    /// Number of persisted messages in a thread.
    fn message_count(&self, conversation_id: &str) -> usize;
}

#[derive(Default)]
pub struct InMemoryThreadStore {
    threads: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ThreadStore for InMemoryThreadStore {
    fn append(&self, conversation_id: &str, message: ChatMessage) {
        match self.threads.write() {
            Ok(mut threads) => {
                threads
                    .entry(conversation_id.to_string())
                    .or_default()
                    .push(message);
            }
            Err(e) => tracing::error!("RwLock poisoned appending message: {e}"),
        }
    }

    fn history(&self, conversation_id: &str) -> Vec<ChatMessage> {
        match self.threads.read() {
            Ok(threads) => threads.get(conversation_id).cloned().unwrap_or_default(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading thread: {e}");
                Vec::new()
            }
        }
    }

    fn message_count(&self, conversation_id: &str) -> usize {
        match self.threads.read() {
            Ok(threads) => threads.get(conversation_id).map(Vec::len).unwrap_or(0),
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_history() {
        let store = InMemoryThreadStore::new();
        assert!(store.history("c1").is_empty());
        assert_eq!(store.message_count("c1"), 0);

        store.append("c1", ChatMessage::user("hello"));
        store.append("c1", ChatMessage::assistant("hi there"));
        store.append("c2", ChatMessage::user("other thread"));

        let history = store.history("c1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "hello");
        assert_eq!(history[1].content, "hi there");
        assert_eq!(store.message_count("c1"), 2);
        assert_eq!(store.message_count("c2"), 1);
    }
}
