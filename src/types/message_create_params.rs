use serde::{Deserialize, Serialize};

use crate::types::{MessageParam, Model};

/// Request body for the Messages endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageCreateParams {
    /// The model to use.
    pub model: Model,

    /// Upper bound on generated tokens.
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// The conversation so far, oldest first.
    pub messages: Vec<MessageParam>,

    /// Whether the response is delivered as server-sent events.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl MessageCreateParams {
    /// Create non-streaming parameters.
    pub fn new(model: Model, max_tokens: u32, messages: Vec<MessageParam>) -> Self {
        Self {
            model,
            max_tokens,
            temperature: None,
            messages,
            stream: false,
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Request a streaming response.
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}
