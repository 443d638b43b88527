//! Bounded conversation history.

use ragline_backend::{ChatMessage, Role};

/// One turn of the conversation.
pub type ChatTurn = ChatMessage;

/// Ordered chat history of one conversation.
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    turns: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(ChatTurn::new(role, content));
    }

    /// The last `max_turns` turns, oldest first.
    pub fn windowed(&self, max_turns: usize) -> &[ChatTurn] {
        let start = self.turns.len().saturating_sub(max_turns);
        &self.turns[start..]
    }

    /// Drop everything but the last `max_turns` turns.
    pub fn trim(&mut self, max_turns: usize) {
        let excess = self.turns.len().saturating_sub(max_turns);
        self.turns.drain(..excess);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(n: usize) -> ChatSession {
        let mut session = ChatSession::new();
        for i in 0..n {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            session.append(role, format!("turn {}", i));
        }
        session
    }

    #[test]
    fn test_windowed_keeps_latest_in_order() {
        let session = session_with(5);
        let window = session.windowed(2);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].content, "turn 3");
        assert_eq!(window[1].content, "turn 4");
    }

    #[test]
    fn test_windowed_larger_than_history() {
        let session = session_with(3);
        assert_eq!(session.windowed(10).len(), 3);
        assert!(session.windowed(0).is_empty());
    }

    #[test]
    fn test_trim() {
        let mut session = session_with(12);
        session.trim(10);
        assert_eq!(session.len(), 10);
        assert_eq!(session.turns()[0].content, "turn 2");

        session.trim(20);
        assert_eq!(session.len(), 10);
    }

    #[test]
    fn test_clear() {
        let mut session = session_with(4);
        session.clear();
        assert!(session.is_empty());
    }
}
