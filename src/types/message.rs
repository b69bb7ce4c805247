use serde::{Deserialize, Serialize};

use crate::types::{ContentBlock, MessageRole, Model, StopReason, Usage};

/// A complete message returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Provider-assigned message id.
    pub id: String,

    /// Content blocks in generation order.
    #[serde(default)]
    pub content: Vec<ContentBlock>,

    /// The model that produced the message.
    pub model: Model,

    /// Always `assistant`.
    pub role: MessageRole,

    /// Why generation stopped, once known.
    #[serde(default)]
    pub stop_reason: Option<StopReason>,

    /// Token usage.
    #[serde(default)]
    pub usage: Usage,
}

impl Message {
    /// The text of the first content block, if it is a text block.
    pub fn first_text(&self) -> Option<&str> {
        self.content
            .first()
            .and_then(ContentBlock::as_text)
            .map(|block| block.text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_provider_response() {
        let message: Message = serde_json::from_value(json!({
            "id": "msg_01XFDUDYJgAACzvnptvVoYEL",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Hello!"}],
            "model": "claude-sonnet-4-5-20250929",
            "stop_reason": "end_turn",
            "stop_sequence": null,
            "usage": {"input_tokens": 12, "output_tokens": 6}
        }))
        .unwrap();
        assert_eq!(message.first_text(), Some("Hello!"));
        assert_eq!(message.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(message.usage, Usage::new(12, 6));
    }

    #[test]
    fn first_text_requires_text_block_first() {
        let message: Message = serde_json::from_value(json!({
            "id": "msg_01",
            "role": "assistant",
            "content": [{"type": "tool_use", "id": "t", "name": "n", "input": {}}],
            "model": "claude-haiku-4-5"
        }))
        .unwrap();
        assert_eq!(message.first_text(), None);
    }
}
