//! Per-connection conversation state.

use crate::defaults::MAX_HISTORY_MESSAGES;
use crate::pipeline::types::{Message, TurnOutcome};

/// Conversation history bounded to a fixed number of messages.
///
/// When the bound is exceeded the oldest messages are dropped first.
#[derive(Debug, Clone)]
pub struct History {
    messages: Vec<Message>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(MAX_HISTORY_MESSAGES)
    }
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            messages: Vec::new(),
            limit,
        }
    }

    /// Append one user/assistant exchange and evict down to the limit.
    ///
    /// Eviction removes whole exchanges, so history always starts with a
    /// user message. An odd limit therefore keeps one message fewer.
    pub fn push_turn(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.messages.push(Message::user(user));
        self.messages.push(Message::assistant(assistant));
        if self.messages.len() > self.limit {
            let excess = (self.messages.len() - self.limit).next_multiple_of(2);
            self.messages.drain(..excess.min(self.messages.len()));
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// State owned by one client connection.
#[derive(Debug, Default)]
pub struct Session {
    history: History,
    turns: u64,
}

impl Session {
    pub fn new(history_limit: usize) -> Self {
        Self {
            history: History::new(history_limit),
            turns: 0,
        }
    }

    pub fn history(&self) -> &[Message] {
        self.history.messages()
    }

    /// Number of completed turns recorded so far.
    pub fn turns(&self) -> u64 {
        self.turns
    }

    /// Update history after a turn.
    ///
    /// Only completed turns with recognized speech are remembered.
    pub fn record(&mut self, outcome: &TurnOutcome) {
        if let TurnOutcome::Completed {
            user_text,
            assistant_text,
        } = outcome
            && !user_text.is_empty()
        {
            self.history.push_turn(user_text.as_str(), assistant_text.as_str());
            self.turns += 1;
        }
    }

    /// Forget the conversation.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::Role;

    fn completed(user: &str, assistant: &str) -> TurnOutcome {
        TurnOutcome::Completed {
            user_text: user.to_string(),
            assistant_text: assistant.to_string(),
        }
    }

    #[test]
    fn test_record_appends_pair() {
        let mut session = Session::default();
        session.record(&completed("Hi", "Hello!"));

        assert_eq!(
            session.history(),
            [Message::user("Hi"), Message::assistant("Hello!")]
        );
        assert_eq!(session.turns(), 1);
    }

    #[test]
    fn test_history_bounded_after_many_turns() {
        let mut session = Session::default();
        for i in 0..21 {
            session.record(&completed(&format!("q{i}"), &format!("a{i}")));
        }

        assert!(session.history().len() <= MAX_HISTORY_MESSAGES);
        assert_eq!(session.history().len(), 40);
        // The first turn was evicted; the window starts with a user message.
        assert_eq!(session.history()[0], Message::user("q1"));
        assert_eq!(session.history()[39], Message::assistant("a20"));
    }

    #[test]
    fn test_history_keeps_roles_alternating() {
        let mut history = History::new(4);
        for i in 0..5 {
            history.push_turn(format!("q{i}"), format!("a{i}"));
        }
        let roles: Vec<Role> = history.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(history.messages()[0].content, "q3");
    }

    #[test]
    fn test_odd_limit_evicts_whole_exchanges() {
        let mut history = History::new(5);
        for i in 0..4 {
            history.push_turn(format!("q{i}"), format!("a{i}"));
        }
        assert_eq!(history.len(), 4);
        assert_eq!(history.messages()[0], Message::user("q2"));
        assert_eq!(history.messages()[3], Message::assistant("a3"));
    }

    #[test]
    fn test_zero_limit_keeps_nothing() {
        let mut history = History::new(0);
        history.push_turn("q", "a");
        assert!(history.is_empty());
    }

    #[test]
    fn test_non_completed_turns_are_not_recorded() {
        let mut session = Session::default();
        session.record(&TurnOutcome::Empty);
        session.record(&TurnOutcome::Failed);
        session.record(&completed("", "stray"));

        assert!(session.history().is_empty());
        assert_eq!(session.turns(), 0);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut session = Session::new(10);
        session.record(&completed("Hi", "Hello!"));
        session.reset();
        assert!(session.history().is_empty());
    }
}
