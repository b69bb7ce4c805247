use serde::{Deserialize, Serialize};

use crate::types::{ApiErrorObject, ContentBlock, ContentBlockDelta, Message, StopReason};

/// An event in a message stream.
///
/// A successful stream is `message_start`, then for each content block a `content_block_start`,
/// any number of `content_block_delta` and a `content_block_stop`, then `message_delta` and
/// finally `message_stop`.  `ping` may appear anywhere; `error` ends the stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum MessageStreamEvent {
    /// Keep-alive with no payload.
    #[serde(rename = "ping")]
    Ping,

    /// The message envelope: id, model, role and initial usage.
    #[serde(rename = "message_start")]
    MessageStart(MessageStartEvent),

    /// Top-level changes such as the stop reason and final usage.
    #[serde(rename = "message_delta")]
    MessageDelta(MessageDeltaEvent),

    /// A new content block begins.
    #[serde(rename = "content_block_start")]
    ContentBlockStart(ContentBlockStartEvent),

    /// More content for an open block.
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta(ContentBlockDeltaEvent),

    /// A content block is complete.
    #[serde(rename = "content_block_stop")]
    ContentBlockStop(ContentBlockStopEvent),

    /// The stream is complete.
    #[serde(rename = "message_stop")]
    MessageStop,

    /// The provider failed mid-stream.
    #[serde(rename = "error")]
    Error {
        /// What went wrong.
        error: ApiErrorObject,
    },
}

/// Payload of `message_start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageStartEvent {
    /// The message envelope with empty content.
    pub message: Message,
}

/// Payload of `content_block_start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentBlockStartEvent {
    /// Position of the block within the message.
    pub index: usize,

    /// The initial block, usually with empty text.
    pub content_block: ContentBlock,
}

/// Payload of `content_block_delta`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentBlockDeltaEvent {
    /// Position of the block within the message.
    pub index: usize,

    /// The increment.
    pub delta: ContentBlockDelta,
}

/// Payload of `content_block_stop`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentBlockStopEvent {
    /// Position of the block within the message.
    pub index: usize,
}

/// Payload of `message_delta`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageDeltaEvent {
    /// Changed top-level fields.
    pub delta: MessageDelta,

    /// Cumulative usage.
    #[serde(default)]
    pub usage: MessageDeltaUsage,
}

/// Top-level fields that change at the end of a stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageDelta {
    /// Why generation stopped.
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
}

/// Usage as reported by `message_delta`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageDeltaUsage {
    /// Cumulative output tokens.
    #[serde(default)]
    pub output_tokens: u32,
}
