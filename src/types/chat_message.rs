use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{MessageId, MessageRole};
use crate::utils::time::now;

/// One turn in the chat transcript.
///
/// Assistant messages start life as an empty placeholder with `is_streaming` set and grow as
/// deltas arrive; once the reply completes the flag is cleared and the text is final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Identifier, unique within the session.
    pub id: MessageId,

    /// Who wrote the message.
    pub role: MessageRole,

    /// The message text.
    pub content: String,

    /// Creation time, refreshed when a streamed reply is finalized.
    #[serde(with = "crate::utils::time")]
    pub timestamp: OffsetDateTime,

    /// True while the reply is still arriving.
    #[serde(default)]
    pub is_streaming: bool,
}

impl ChatMessage {
    /// Create a finished message with a fresh id and the current time.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content: content.into(),
            timestamp: now(),
            is_streaming: false,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create a finished assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create an empty assistant message that is still streaming.
    pub fn placeholder() -> Self {
        Self {
            is_streaming: true,
            ..Self::assistant(String::new())
        }
    }

    /// Returns true if the message was written by the user.
    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    /// Returns true if the message was written by the assistant.
    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }
}
