use serde::{Deserialize, Serialize};
use std::fmt;

/// Reasons why the model stopped generating a response.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model reached the end of a generated turn
    EndTurn,

    /// The response reached the maximum token limit for the response
    MaxTokens,

    /// The model reached a specified stop sequence
    StopSequence,

    /// The model indicated it wants to use a tool
    ToolUse,

    /// The model paused in the middle of a turn
    PauseTurn,

    /// The model refused to respond
    Refusal,

    /// A reason this crate does not know about yet
    #[serde(other)]
    Other,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EndTurn => write!(f, "end_turn"),
            StopReason::MaxTokens => write!(f, "max_tokens"),
            StopReason::StopSequence => write!(f, "stop_sequence"),
            StopReason::ToolUse => write!(f, "tool_use"),
            StopReason::PauseTurn => write!(f, "pause_turn"),
            StopReason::Refusal => write!(f, "refusal"),
            StopReason::Other => write!(f, "other"),
        }
    }
}
