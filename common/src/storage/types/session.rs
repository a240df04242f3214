use crate::stored_object;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One turn in a session. Append-only; `timestamp` is assigned by the server, never the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

impl Message {
    #[must_use]
    pub fn new(role: MessageRole, content: String, metadata: Value) -> Self {
        Self {
            role,
            content,
            timestamp: Utc::now(),
            metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionMetadata {
    pub last_activity: Option<DateTime<Utc>>,
    pub message_count: usize,
}

stored_object!(Session, "chat_sessions", {
    messages: Vec<Message>,
    metadata: SessionMetadata
});

impl Session {
    #[must_use]
    pub fn empty(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            metadata: SessionMetadata {
                last_activity: Some(now),
                message_count: 0,
            },
        }
    }

    pub fn push_message(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.metadata.last_activity = Some(self.updated_at);
        self.messages.push(message);
        self.metadata.message_count = self.messages.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_message_updates_count_and_activity() {
        let mut session = Session::empty("session-1".to_string());
        assert_eq!(session.metadata.message_count, 0);

        session.push_message(Message::new(
            MessageRole::User,
            "hello".to_string(),
            Value::Null,
        ));

        assert_eq!(session.metadata.message_count, 1);
        assert_eq!(session.messages[0].content, "hello");
        assert!(session.metadata.last_activity.is_some());
    }
}
