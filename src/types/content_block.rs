use serde::{Deserialize, Serialize};

/// A block of content in a provider message.
///
/// The chat only renders text; other block kinds deserialize to [`ContentBlock::Unsupported`]
/// so a reply containing them still parses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentBlock {
    /// A block of text content
    #[serde(rename = "text")]
    Text(TextBlock),

    /// Any block kind the chat does not render
    #[serde(other)]
    Unsupported,
}

/// A block of text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextBlock {
    /// The text content.
    #[serde(default)]
    pub text: String,
}

impl TextBlock {
    /// Create a new `TextBlock` with the given text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl ContentBlock {
    /// Returns the text block, if this is one.
    pub fn as_text(&self) -> Option<&TextBlock> {
        match self {
            ContentBlock::Text(text) => Some(text),
            ContentBlock::Unsupported => None,
        }
    }
}
