//! Logging trait for chat client operations.
//!
//! This module provides the [`ClientLogger`] trait that allows users to capture
//! and record every provider interaction passing through a [`ChatClient`](crate::ChatClient).

use crate::{ChatMessage, Message, MessageStreamEvent};

/// A trait for logging chat client operations.
///
/// # Example
///
/// ```rust,ignore
/// use chatfolio::{ChatMessage, ClientLogger, Message, MessageStreamEvent};
/// use std::sync::Mutex;
///
/// struct Transcript(Mutex<Vec<String>>);
///
/// impl ClientLogger for Transcript {
///     fn log_response(&self, message: &Message) {
///         self.0.lock().unwrap().push(serde_json::to_string(message).unwrap());
///     }
///
///     fn log_stream_event(&self, event: &MessageStreamEvent) {
///         self.0.lock().unwrap().push(serde_json::to_string(event).unwrap());
///     }
///
///     fn log_stream_message(&self, message: &ChatMessage) {
///         self.0.lock().unwrap().push(message.content.clone());
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log a complete response from a non-streaming call.
    fn log_response(&self, message: &Message);

    /// Log an individual streaming event, in arrival order.
    fn log_stream_event(&self, event: &MessageStreamEvent);

    /// Log the finished chat message reconstructed from a completed stream.
    fn log_stream_message(&self, message: &ChatMessage);
}
