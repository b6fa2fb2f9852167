//! Append-only conversation log.
//!
//! The message store is the UI's read model: an ordered sequence of
//! committed, immutable turns. Ordering equals the order turns are
//! finalized, which equals delivery order — no reordering is performed.
//! Corrections require appending a new turn, never mutating an old one.

// Rust guideline compliant 2026-02

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Local user input.
    User,
    /// Assistant reply (streamed or complete).
    Assistant,
    /// Connection lifecycle and error notices.
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// One committed, immutable entry in the visible message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who produced the turn.
    pub role: Role,
    /// Final turn content.
    pub content: String,
    /// When the turn was committed.
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// Create a turn stamped with the current time.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only ordered log of conversation turns.
#[derive(Debug, Default)]
pub struct MessageStore {
    turns: Vec<ConversationTurn>,
}

impl MessageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn to the end of the log. O(1); existing entries are
    /// never removed or reordered.
    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Empty the log (explicit user "clear" action). Does not affect
    /// connection state.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Consistent read-only view for rendering.
    #[must_use]
    pub fn snapshot(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Number of committed turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut store = MessageStore::new();
        store.append(ConversationTurn::new(Role::User, "first"));
        store.append(ConversationTurn::new(Role::Assistant, "second"));
        store.append(ConversationTurn::new(Role::System, "third"));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].content, "first");
        assert_eq!(snapshot[1].content, "second");
        assert_eq!(snapshot[2].content, "third");
    }

    #[test]
    fn test_clear_empties_the_log() {
        let mut store = MessageStore::new();
        store.append(ConversationTurn::new(Role::User, "hello"));
        assert!(!store.is_empty());
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let turn = ConversationTurn::new(Role::Assistant, "hi");
        let json = serde_json::to_string(&turn).expect("serialize");
        assert!(json.contains(r#""role":"assistant""#));
    }
}
