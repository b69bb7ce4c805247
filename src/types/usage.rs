use serde::{Deserialize, Serialize};

/// Token usage reported by the provider.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    /// The number of input tokens which were used.
    #[serde(default)]
    pub input_tokens: u32,

    /// The number of output tokens which were used.
    #[serde(default)]
    pub output_tokens: u32,
}

impl Usage {
    /// Create a new `Usage` with the given input and output tokens.
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

impl std::ops::Add for Usage {
    type Output = Usage;

    fn add(self, rhs: Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens.saturating_add(rhs.input_tokens),
            output_tokens: self.output_tokens.saturating_add(rhs.output_tokens),
        }
    }
}
