// Public modules
pub mod accumulating_stream;
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod config;
pub mod controller;
pub mod error;
pub mod sse;
pub mod transport;
pub mod types;
pub mod utils;

mod observability;

// Re-exports
pub use accumulating_stream::{ReplyEvent, ReplyStream};
pub use client::{ChatClient, ReplyHandler};
pub use client_logger::ClientLogger;
pub use config::{ApiKey, ClientConfig, ConfigUpdate};
pub use controller::{ChatController, ChatState, GENERIC_ERROR, MAX_INPUT_CHARS, SendOutcome};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use transport::{EventStream, HttpTransport, Transport};
pub use types::*;
