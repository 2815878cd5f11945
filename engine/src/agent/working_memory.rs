//! Working Memory for Agent Loop
//!
//! Conversation history for one session. Messages are only ever appended
//! (user messages, assistant responses, tool calls, tool results) until an
//! explicit `clear`. The system prompt and context prefix are not stored
//! here; the orchestrator prepends them to every request.

use crate::llm::Message;
use crate::tokens::TokenCounter;

/// Append-only conversation history
#[derive(Debug, Clone, Default)]
pub struct WorkingMemory {
    messages: Vec<Message>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the history
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Get all messages in the conversation history
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Tokens of message text and tool-call payloads in the history.
    ///
    /// Role and framing overhead is provider specific and not included.
    pub fn token_count(&self, counter: &TokenCounter) -> usize {
        self.messages
            .iter()
            .map(|m| {
                let calls: usize = m
                    .tool_calls()
                    .iter()
                    .map(|c| counter.count(c.name()) + counter.count(c.arguments()))
                    .sum();
                counter.count(m.content_str()) + calls
            })
            .sum()
    }

    /// Clear all messages from working memory
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MessageRole, ToolCall};

    #[test]
    fn test_new_working_memory() {
        let memory = WorkingMemory::new();
        assert!(memory.is_empty());
        assert_eq!(memory.token_count(&TokenCounter::cl100k().unwrap()), 0);
    }

    #[test]
    fn test_add_message_preserves_order() {
        let mut memory = WorkingMemory::new();
        memory.add_message(Message::user("Hello"));
        memory.add_message(Message::assistant_tool_calls(
            None,
            vec![ToolCall::new("c1", "read_file", r#"{"path":"a"}"#)],
        ));
        memory.add_message(Message::tool_result("contents", "c1"));
        memory.add_message(Message::assistant("Done"));

        let roles: Vec<MessageRole> = memory.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::Tool,
                MessageRole::Assistant
            ]
        );
    }

    #[test]
    fn test_no_trimming() {
        let mut memory = WorkingMemory::new();
        for i in 0..500 {
            memory.add_message(Message::user(format!("This is message number {}", i)));
        }
        assert_eq!(memory.len(), 500);
        assert_eq!(memory.messages()[0].content_str(), "This is message number 0");
    }

    #[test]
    fn test_clear() {
        let mut memory = WorkingMemory::new();
        memory.add_message(Message::user("Hello"));
        memory.add_message(Message::assistant("Hi"));

        memory.clear();
        assert_eq!(memory.len(), 0);
    }

    #[test]
    fn test_token_count_uses_counter() {
        let counter = TokenCounter::cl100k().unwrap();
        let mut memory = WorkingMemory::new();

        memory.add_message(Message::user("Summarize the README"));
        let user_only = counter.count("Summarize the README");
        assert_eq!(memory.token_count(&counter), user_only);

        let args = r#"{"path":"README.md"}"#;
        memory.add_message(Message::assistant_tool_calls(
            None,
            vec![ToolCall::new("c1", "read_file", args)],
        ));
        memory.add_message(Message::tool_result("# Clio", "c1"));

        assert_eq!(
            memory.token_count(&counter),
            user_only
                + counter.count("read_file")
                + counter.count(args)
                + counter.count("# Clio")
        );
    }
}
