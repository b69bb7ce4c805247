use serde::{Deserialize, Serialize};

/// The error object the provider returns in error bodies and `error` stream events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorObject {
    /// The type of error, such as `overloaded_error`.
    #[serde(rename = "type")]
    pub error_type: String,

    /// A human-readable error message.
    #[serde(default)]
    pub message: String,
}

/// Envelope around [`ApiErrorObject`]: `{"type": "error", "error": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// The error details.
    pub error: ApiErrorObject,
}
