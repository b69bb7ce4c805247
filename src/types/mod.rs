// Public modules
pub mod api_error_object;
pub mod chat_message;
pub mod content_block;
pub mod content_block_delta;
pub mod message;
pub mod message_create_params;
pub mod message_id;
pub mod message_param;
pub mod message_stream_event;
pub mod model;
pub mod stop_reason;
pub mod usage;

// Re-exports
pub use api_error_object::{ApiErrorObject, ErrorResponse};
pub use chat_message::ChatMessage;
pub use content_block::{ContentBlock, TextBlock};
pub use content_block_delta::{ContentBlockDelta, TextDelta};
pub use message::Message;
pub use message_create_params::MessageCreateParams;
pub use message_id::MessageId;
pub use message_param::{MessageParam, MessageRole};
pub use message_stream_event::{
    ContentBlockDeltaEvent, ContentBlockStartEvent, ContentBlockStopEvent, MessageDelta,
    MessageDeltaEvent, MessageDeltaUsage, MessageStartEvent, MessageStreamEvent,
};
pub use model::{KnownModel, Model};
pub use stop_reason::StopReason;
pub use usage::Usage;
