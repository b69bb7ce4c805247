//! Core chat session management.
//!
//! [`ChatSession`] drives a [`ChatController`] from a line-oriented front-end: it sends a line,
//! watches the controller's state while the reply streams, and renders the new text as it
//! arrives.

use std::sync::Arc;

use crate::chat::render::Renderer;
use crate::controller::{ChatController, ChatState, SendOutcome};
use crate::transport::{HttpTransport, Transport};

/// Greeting shown before the first message.
pub const WELCOME_MESSAGE: &str = "Hi! I'm your AI assistant. Ask me anything about web development, technology, or this portfolio.";

/// Prompts offered while the conversation is empty.
pub const SUGGESTED_PROMPTS: [&str; 3] = [
    "Tell me about your experience",
    "What technologies do you use?",
    "Show me your projects",
];

/// A terminal chat session over a shared controller.
pub struct ChatSession<T: Transport = HttpTransport> {
    controller: Arc<ChatController<T>>,
}

impl<T: Transport> ChatSession<T> {
    /// Creates a session over `controller`.
    pub fn new(controller: Arc<ChatController<T>>) -> Self {
        Self { controller }
    }

    /// The controller this session drives.
    pub fn controller(&self) -> &Arc<ChatController<T>> {
        &self.controller
    }

    /// Sends `text` and renders the reply as it streams.
    pub async fn send(&self, text: &str, renderer: &mut dyn Renderer) -> SendOutcome {
        let mut watcher = self.controller.subscribe();
        let _ = watcher.borrow_and_update();
        let send = self.controller.send_message(text);
        tokio::pin!(send);

        let mut shown = String::new();
        let outcome = loop {
            tokio::select! {
                outcome = &mut send => break outcome,
                changed = watcher.changed() => {
                    if changed.is_err() {
                        break send.await;
                    }
                    let content = streaming_content(&watcher.borrow_and_update());
                    if let Some(content) = content {
                        render_progress(&mut shown, &content, renderer);
                    }
                }
            }
        };

        match &outcome {
            SendOutcome::Completed(id) => {
                let state = self.controller.state();
                if let Some(reply) = state.messages.iter().find(|message| &message.id == id) {
                    render_progress(&mut shown, &reply.content, renderer);
                }
                renderer.finish_response();
            }
            SendOutcome::Failed(message) | SendOutcome::Rejected(message) => {
                renderer.print_error(message);
            }
            SendOutcome::Cancelled => renderer.print_interrupted(),
            SendOutcome::Superseded => renderer.print_info("\nConversation cleared."),
            SendOutcome::Busy => renderer.print_error("A reply is still in progress."),
            SendOutcome::Ignored => {}
        }
        outcome
    }

    /// Sends the last user message again.
    pub async fn retry(&self, renderer: &mut dyn Renderer) -> Option<SendOutcome> {
        let text = self.controller.state().last_user_text()?.to_string();
        Some(self.send(&text, renderer).await)
    }

    /// Clears the conversation.
    pub fn clear(&self) {
        self.controller.clear_messages();
    }

    /// Dismisses the current error.  Returns false if there was none.
    pub fn dismiss(&self) -> bool {
        let had_error = self.controller.state().error.is_some();
        self.controller.clear_error();
        had_error
    }

    /// Number of messages in the conversation.
    pub fn message_count(&self) -> usize {
        self.controller.state().messages.len()
    }
}

fn streaming_content(state: &ChatState) -> Option<String> {
    state
        .streaming_message()
        .map(|message| message.content.clone())
}

/// What to print so the terminal shows `content`, given that `shown` is already printed.
#[derive(Debug, PartialEq, Eq)]
enum Progress<'a> {
    Nothing,
    Append(&'a str),
    Restart(&'a str),
}

fn progress<'a>(shown: &str, content: &'a str) -> Progress<'a> {
    match content.strip_prefix(shown) {
        Some("") => Progress::Nothing,
        Some(suffix) => Progress::Append(suffix),
        None => Progress::Restart(content),
    }
}

fn render_progress(shown: &mut String, content: &str, renderer: &mut dyn Renderer) {
    match progress(shown, content) {
        Progress::Nothing => {}
        Progress::Append(suffix) => {
            renderer.print_text(suffix);
            shown.push_str(suffix);
        }
        Progress::Restart(content) => {
            renderer.print_restart();
            renderer.print_text(content);
            *shown = content.to_string();
        }
    }
}
