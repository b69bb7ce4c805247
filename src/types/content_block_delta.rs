use serde::{Deserialize, Serialize};

/// An incremental update to a content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlockDelta {
    /// More text for a text block.
    #[serde(rename = "text_delta")]
    TextDelta(TextDelta),

    /// Deltas for block kinds the chat does not render (tool input, thinking, citations).
    #[serde(other)]
    Unsupported,
}

/// A piece of text in a streaming response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDelta {
    /// The text content.
    pub text: String,
}

impl TextDelta {
    /// Create a new `TextDelta` with the given text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl ContentBlockDelta {
    /// Returns the text carried by this delta, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            ContentBlockDelta::TextDelta(delta) => Some(&delta.text),
            ContentBlockDelta::Unsupported => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{from_value, json, to_value};

    #[test]
    fn text_delta_serialization() {
        let delta = ContentBlockDelta::TextDelta(TextDelta::new("Hello world"));
        assert_eq!(
            to_value(&delta).unwrap(),
            json!({
                "type": "text_delta",
                "text": "Hello world"
            })
        );
    }

    #[test]
    fn other_deltas_carry_no_text() {
        let delta: ContentBlockDelta = from_value(json!({
            "type": "input_json_delta",
            "partial_json": "{\"q\":"
        }))
        .unwrap();
        assert_eq!(delta, ContentBlockDelta::Unsupported);
        assert_eq!(delta.text(), None);
    }
}
