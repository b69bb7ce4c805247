//! The chat controller owns the transcript and runs one turn at a time.
//!
//! A send appends the user's message and an empty streaming placeholder, then grows the
//! placeholder as fragments arrive.  On completion the placeholder becomes the final reply; on
//! failure or cancellation it is removed.  Presentation layers read the state through
//! [`ChatController::state`] or watch it through [`ChatController::subscribe`].
//!
//! Every mutation a send makes is tagged with the generation it started in.
//! [`ChatController::clear_messages`] bumps the generation, so updates from a reply that was
//! in flight when the transcript was cleared are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::client::{ChatClient, ReplyHandler};
use crate::error::Error;
use crate::observability::{
    CONTROLLER_CANCELLATIONS, CONTROLLER_FAILURES, CONTROLLER_SENDS, CONTROLLER_STALE_UPDATES,
};
use crate::transport::{HttpTransport, Transport};
use crate::types::{ChatMessage, MessageId};

/// Longest accepted input, in characters.
pub const MAX_INPUT_CHARS: usize = 4000;

/// Shown when a failure carries no message of its own.
pub const GENERIC_ERROR: &str = "Failed to send message. Please try again.";

///////////////////////////////////////////// ChatState ////////////////////////////////////////////

/// The transcript and its status.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatState {
    /// Messages in insertion order.
    pub messages: Vec<ChatMessage>,
    /// True from the start of a send until it completes or fails.
    pub is_loading: bool,
    /// The last user-visible error.
    pub error: Option<String>,
    generation: u64,
}

impl ChatState {
    /// The message that is still streaming, if any.
    pub fn streaming_message(&self) -> Option<&ChatMessage> {
        self.messages.iter().find(|message| message.is_streaming)
    }

    /// The text of the most recent user message.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.is_user())
            .map(|message| message.content.as_str())
    }
}

//////////////////////////////////////////// SendOutcome ///////////////////////////////////////////

/// How a call to [`ChatController::send_message`] ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The input was blank; nothing changed.
    Ignored,
    /// Another reply is still in flight; nothing changed.
    Busy,
    /// The input was refused.  The reason is also stored as the state's error.
    Rejected(String),
    /// The reply was stored under this id.
    Completed(MessageId),
    /// The send failed after retries.  The message is also stored as the state's error.
    Failed(String),
    /// The send was cancelled and its placeholder removed.
    Cancelled,
    /// The transcript was cleared while the reply was in flight.
    Superseded,
}

////////////////////////////////////////// ChatController //////////////////////////////////////////

struct InFlight {
    ticket: u64,
    cancel: CancellationToken,
}

/// Mediates between user input and a [`ChatClient`].
///
/// # Example
///
/// ```no_run
/// # tokio_test::block_on(async {
/// use std::sync::Arc;
/// use chatfolio::{ChatClient, ChatController, SendOutcome};
///
/// let client = ChatClient::from_env()?;
/// let controller = ChatController::new(Arc::new(client));
/// match controller.send_message("Show me your projects").await {
///     SendOutcome::Completed(_) => {
///         let state = controller.state();
///         println!("{}", state.messages[1].content);
///     }
///     SendOutcome::Failed(message) => eprintln!("{message}"),
///     _ => {}
/// }
/// # Ok::<(), chatfolio::Error>(())
/// # }).unwrap();
/// ```
pub struct ChatController<T: Transport = HttpTransport> {
    client: Arc<ChatClient<T>>,
    state: watch::Sender<ChatState>,
    in_flight: Mutex<Option<InFlight>>,
    tickets: AtomicU64,
}

impl<T: Transport> ChatController<T> {
    /// Create a controller with an empty transcript.
    pub fn new(client: Arc<ChatClient<T>>) -> Self {
        let (state, _) = watch::channel(ChatState::default());
        Self {
            client,
            state,
            in_flight: Mutex::new(None),
            tickets: AtomicU64::new(0),
        }
    }

    /// The client replies are requested from.
    pub fn client(&self) -> &Arc<ChatClient<T>> {
        &self.client
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> ChatState {
        self.state.borrow().clone()
    }

    /// A receiver notified after every change to the state.
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    /// Sends `text` and waits for the reply.
    ///
    /// Blank input is ignored.  Only one send runs at a time; a second concurrent call returns
    /// [`SendOutcome::Busy`] without touching the state.
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored;
        }
        let cancel = CancellationToken::new();
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        {
            let mut in_flight = self.in_flight();
            if in_flight.is_some() {
                return SendOutcome::Busy;
            }
            let chars = text.chars().count();
            if chars > MAX_INPUT_CHARS {
                let reason = format!(
                    "Message is too long ({chars} characters); the limit is {MAX_INPUT_CHARS}."
                );
                self.state
                    .send_modify(|state| state.error = Some(reason.clone()));
                return SendOutcome::Rejected(reason);
            }
            *in_flight = Some(InFlight {
                ticket,
                cancel: cancel.clone(),
            });
        }
        CONTROLLER_SENDS.click();

        let placeholder = ChatMessage::placeholder();
        let placeholder_id = placeholder.id.clone();
        let mut generation = 0;
        let mut history = Vec::new();
        self.state.send_modify(|state| {
            state.error = None;
            state.messages.push(ChatMessage::user(text));
            history = state.messages.clone();
            state.messages.push(placeholder);
            state.is_loading = true;
            generation = state.generation;
        });
        tracing::debug!(generation, history = history.len(), "sending chat message");

        let mut guard = SendGuard {
            controller: self,
            ticket,
            cancel: cancel.clone(),
            generation,
            placeholder: &placeholder_id,
            finished: false,
        };
        let mut writer = PlaceholderWriter {
            state: &self.state,
            id: &placeholder_id,
            generation,
        };
        let result = self
            .client
            .send_message_with_retry(&history, &mut writer, &cancel)
            .await;
        guard.finished = true;
        drop(guard);

        match result {
            Ok(reply) => {
                let applied = update_if_current(&self.state, generation, |state| {
                    if let Some(message) = find(state, &placeholder_id) {
                        message.content = reply.content;
                        message.timestamp = reply.timestamp;
                        message.is_streaming = false;
                    }
                    state.is_loading = false;
                });
                if applied {
                    SendOutcome::Completed(placeholder_id)
                } else {
                    SendOutcome::Superseded
                }
            }
            Err(err) if err.is_abort() => {
                CONTROLLER_CANCELLATIONS.click();
                let applied = update_if_current(&self.state, generation, |state| {
                    state.messages.retain(|message| message.id != placeholder_id);
                    state.is_loading = false;
                });
                if applied {
                    SendOutcome::Cancelled
                } else {
                    SendOutcome::Superseded
                }
            }
            Err(err) => {
                CONTROLLER_FAILURES.click();
                tracing::warn!(error = %err, "chat message failed");
                let shown = user_visible(&err);
                let applied = update_if_current(&self.state, generation, |state| {
                    state.messages.retain(|message| message.id != placeholder_id);
                    state.error = Some(shown.clone());
                    state.is_loading = false;
                });
                if applied {
                    SendOutcome::Failed(shown)
                } else {
                    SendOutcome::Superseded
                }
            }
        }
    }

    /// Empties the transcript and the error, abandoning any reply in flight.
    pub fn clear_messages(&self) {
        if let Some(in_flight) = self.in_flight().take() {
            in_flight.cancel.cancel();
        }
        self.state.send_modify(|state| {
            *state = ChatState {
                generation: state.generation.wrapping_add(1),
                ..ChatState::default()
            };
        });
    }

    /// Dismisses the error.
    pub fn clear_error(&self) {
        self.state.send_if_modified(|state| state.error.take().is_some());
    }

    /// Cancels the reply in flight.  Returns false if there was none.
    pub fn cancel(&self) -> bool {
        match self.in_flight().as_ref() {
            Some(in_flight) => {
                in_flight.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases a send's in-flight slot however the send ends.
///
/// A send whose future is dropped before the reply settles is treated as cancelled: the
/// token fires and the placeholder is removed.
struct SendGuard<'a, T: Transport> {
    controller: &'a ChatController<T>,
    ticket: u64,
    cancel: CancellationToken,
    generation: u64,
    placeholder: &'a MessageId,
    finished: bool,
}

impl<T: Transport> Drop for SendGuard<'_, T> {
    fn drop(&mut self) {
        {
            let mut in_flight = self.controller.in_flight();
            if in_flight.as_ref().is_some_and(|f| f.ticket == self.ticket) {
                *in_flight = None;
            }
        }
        if self.finished {
            return;
        }
        self.cancel.cancel();
        CONTROLLER_CANCELLATIONS.click();
        tracing::debug!(generation = self.generation, "chat message dropped before it settled");
        let id = self.placeholder;
        update_if_current(&self.controller.state, self.generation, |state| {
            state.messages.retain(|message| &message.id != id);
            state.is_loading = false;
        });
    }
}

/// Applies a send's updates to its placeholder.
struct PlaceholderWriter<'a> {
    state: &'a watch::Sender<ChatState>,
    id: &'a MessageId,
    generation: u64,
}

impl ReplyHandler for PlaceholderWriter<'_> {
    fn on_stream(&mut self, delta: &str) {
        let id = self.id;
        update_if_current(self.state, self.generation, |state| {
            if let Some(message) = find(state, id) {
                message.content.push_str(delta);
            }
        });
    }

    fn on_retry(&mut self, attempt: u32, delay: Duration, error: &Error) {
        tracing::debug!(attempt, ?delay, error = %error, "discarding partial reply");
        let id = self.id;
        update_if_current(self.state, self.generation, |state| {
            if let Some(message) = find(state, id) {
                message.content.clear();
            }
        });
    }
}

fn find<'a>(state: &'a mut ChatState, id: &MessageId) -> Option<&'a mut ChatMessage> {
    state.messages.iter_mut().find(|message| &message.id == id)
}

/// Runs `apply` unless the transcript was cleared since `generation`.
fn update_if_current(
    state: &watch::Sender<ChatState>,
    generation: u64,
    apply: impl FnOnce(&mut ChatState),
) -> bool {
    let applied = state.send_if_modified(|state| {
        if state.generation != generation {
            return false;
        }
        apply(state);
        true
    });
    if !applied {
        CONTROLLER_STALE_UPDATES.click();
    }
    applied
}

fn user_visible(err: &Error) -> String {
    let message = err.message().trim();
    if message.is_empty() {
        GENERIC_ERROR.to_string()
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::transport::scripted::{ScriptedTransport, Step, closing, fragment, opening};
    use crate::types::MessageRole;
    use tokio::sync::mpsc;

    const KEY: &str = "sk-ant-REDACTED";

    fn controller(steps: Vec<Step>) -> Arc<ChatController<ScriptedTransport>> {
        let client =
            ChatClient::with_transport(ClientConfig::new(KEY), ScriptedTransport::new(steps))
                .unwrap();
        Arc::new(ChatController::new(Arc::new(client)))
    }

    fn failing(n: usize, message: &str) -> Vec<Step> {
        (0..n)
            .map(|_| Step::Fail(Error::service_unavailable(message, None)))
            .collect()
    }

    #[tokio::test]
    async fn send_appends_user_then_reply() {
        let controller = controller(vec![Step::Reply(vec!["Hi", " there"])]);
        let outcome = controller.send_message("  Hello \n").await;
        let state = controller.state();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].role, MessageRole::User);
        assert_eq!(state.messages[0].content, "Hello");
        assert_eq!(state.messages[1].role, MessageRole::Assistant);
        assert_eq!(state.messages[1].content, "Hi there");
        assert!(!state.messages[1].is_streaming);
        assert_eq!(outcome, SendOutcome::Completed(state.messages[1].id.clone()));
        assert!(!state.is_loading);
        assert_eq!(state.error, None);

        let requests = controller.client().transport().requests();
        assert_eq!(requests[0].messages.len(), 1);
        assert_eq!(requests[0].messages[0].content, "Hello");
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let controller = controller(vec![]);
        assert_eq!(controller.send_message("").await, SendOutcome::Ignored);
        assert_eq!(controller.send_message(" \t\n").await, SendOutcome::Ignored);
        assert_eq!(controller.state(), ChatState::default());
        assert!(controller.client().transport().requests().is_empty());
    }

    #[tokio::test]
    async fn long_input_is_rejected() {
        let controller = controller(vec![]);
        let text = "x".repeat(MAX_INPUT_CHARS + 1);
        let outcome = controller.send_message(&text).await;
        assert!(matches!(outcome, SendOutcome::Rejected(_)));
        let state = controller.state();
        assert!(state.messages.is_empty());
        assert!(state.error.is_some());

        let controller = self::controller(vec![Step::Reply(vec!["ok"])]);
        let text = "é".repeat(MAX_INPUT_CHARS);
        assert!(matches!(
            controller.send_message(&text).await,
            SendOutcome::Completed(_)
        ));
    }

    #[tokio::test]
    async fn placeholder_streams_while_loading() {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = controller(vec![Step::Channel(rx)]);
        let mut watcher = controller.subscribe();
        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.send_message("Hello").await })
        };

        let state = watcher.wait_for(|state| state.is_loading).await.unwrap().clone();
        assert_eq!(state.messages.len(), 2);
        let placeholder = state.streaming_message().unwrap();
        assert!(placeholder.is_assistant());
        assert!(placeholder.content.is_empty());

        for event in opening() {
            tx.send(Ok(event)).unwrap();
        }
        tx.send(Ok(fragment("Hi"))).unwrap();
        let state = watcher
            .wait_for(|state| state.messages[1].content == "Hi")
            .await
            .unwrap()
            .clone();
        assert!(state.is_loading);
        assert!(state.messages[1].is_streaming);

        tx.send(Ok(fragment(" there"))).unwrap();
        for event in closing() {
            tx.send(Ok(event)).unwrap();
        }
        assert!(matches!(task.await.unwrap(), SendOutcome::Completed(_)));
        let state = controller.state();
        assert!(!state.is_loading);
        assert_eq!(state.messages[1].content, "Hi there");
        assert!(state.streaming_message().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_remove_placeholder() {
        let controller = controller(failing(3, "Overloaded"));
        let outcome = controller.send_message("Hello").await;
        assert_eq!(outcome, SendOutcome::Failed("Overloaded".to_string()));
        let state = controller.state();
        assert_eq!(state.messages.len(), 1);
        assert!(state.messages[0].is_user());
        assert_eq!(state.error.as_deref(), Some("Overloaded"));
        assert!(!state.is_loading);
        assert_eq!(controller.client().transport().requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_error_message_falls_back() {
        let controller = controller(failing(3, ""));
        let outcome = controller.send_message("Hello").await;
        assert_eq!(outcome, SendOutcome::Failed(GENERIC_ERROR.to_string()));
        assert_eq!(controller.state().error.as_deref(), Some(GENERIC_ERROR));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_resets_placeholder() {
        let controller = controller(vec![
            Step::FailAfter(vec!["Partial"], Error::streaming("ended early", None)),
            Step::Reply(vec!["Whole"]),
        ]);
        let outcome = controller.send_message("Hello").await;
        assert!(matches!(outcome, SendOutcome::Completed(_)));
        assert_eq!(controller.state().messages[1].content, "Whole");
    }

    #[tokio::test(start_paused = true)]
    async fn next_send_clears_previous_error() {
        let mut steps = failing(3, "Overloaded");
        steps.push(Step::Reply(vec!["Back"]));
        let controller = controller(steps);
        controller.send_message("Hello").await;
        assert!(controller.state().error.is_some());
        let outcome = controller.send_message("Again").await;
        assert!(matches!(outcome, SendOutcome::Completed(_)));
        let state = controller.state();
        assert_eq!(state.error, None);
        assert_eq!(state.messages.len(), 3);
        let history = &controller.client().transport().requests()[3].messages;
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn second_send_while_busy() {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = controller(vec![Step::Channel(rx)]);
        let mut watcher = controller.subscribe();
        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.send_message("Hello").await })
        };
        watcher.wait_for(|state| state.is_loading).await.unwrap();

        assert_eq!(controller.send_message("Again").await, SendOutcome::Busy);
        assert_eq!(controller.state().messages.len(), 2);

        for event in opening() {
            tx.send(Ok(event)).unwrap();
        }
        for event in closing() {
            tx.send(Ok(event)).unwrap();
        }
        assert!(matches!(task.await.unwrap(), SendOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn long_input_while_busy_leaves_state_alone() {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = controller(vec![Step::Channel(rx)]);
        let mut watcher = controller.subscribe();
        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.send_message("Hello").await })
        };
        watcher.wait_for(|state| state.is_loading).await.unwrap();

        let text = "x".repeat(MAX_INPUT_CHARS + 1);
        assert_eq!(controller.send_message(&text).await, SendOutcome::Busy);
        assert_eq!(controller.state().error, None);

        for event in opening().into_iter().chain(closing()) {
            tx.send(Ok(event)).unwrap();
        }
        assert!(matches!(task.await.unwrap(), SendOutcome::Completed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_send_releases_the_controller() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let controller = controller(vec![Step::Channel(rx), Step::Reply(vec!["Back"])]);
        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), controller.send_message("Hello")).await;
        assert!(timed_out.is_err());

        let state = controller.state();
        assert!(!state.is_loading);
        assert!(state.streaming_message().is_none());
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.error, None);
        assert!(!controller.cancel());

        let outcome = controller.send_message("Again").await;
        assert!(matches!(outcome, SendOutcome::Completed(_)), "{outcome:?}");
        let state = controller.state();
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[2].content, "Back");
    }

    #[tokio::test]
    async fn cancel_removes_placeholder_without_error() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let controller = controller(vec![Step::Channel(rx)]);
        assert!(!controller.cancel());
        let mut watcher = controller.subscribe();
        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.send_message("Hello").await })
        };
        watcher.wait_for(|state| state.is_loading).await.unwrap();

        assert!(controller.cancel());
        assert_eq!(task.await.unwrap(), SendOutcome::Cancelled);
        let state = controller.state();
        assert_eq!(state.messages.len(), 1);
        assert!(state.messages[0].is_user());
        assert_eq!(state.error, None);
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn clear_during_stream_drops_late_updates() {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = controller(vec![Step::Channel(rx), Step::Reply(vec!["Fresh"])]);
        let mut watcher = controller.subscribe();
        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.send_message("Hello").await })
        };
        for event in opening() {
            tx.send(Ok(event)).unwrap();
        }
        tx.send(Ok(fragment("Stale"))).unwrap();
        watcher
            .wait_for(|state| state.messages.len() == 2 && state.messages[1].content == "Stale")
            .await
            .unwrap();

        controller.clear_messages();
        let _ = tx.send(Ok(fragment(" more")));
        assert_eq!(task.await.unwrap(), SendOutcome::Superseded);
        let state = controller.state();
        assert!(state.messages.is_empty());
        assert!(!state.is_loading);
        assert_eq!(state.error, None);

        assert!(matches!(
            controller.send_message("Hello").await,
            SendOutcome::Completed(_)
        ));
        assert_eq!(controller.state().messages[1].content, "Fresh");
    }

    #[tokio::test(start_paused = true)]
    async fn clear_resets_error_and_messages() {
        let controller = controller(failing(3, "Overloaded"));
        controller.send_message("Hello").await;
        assert!(controller.state().error.is_some());
        controller.clear_messages();
        let state = controller.state();
        assert!(state.messages.is_empty());
        assert_eq!(state.error, None);
        assert!(!state.is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_error_keeps_messages() {
        let controller = controller(failing(3, "Overloaded"));
        controller.send_message("Hello").await;
        controller.clear_error();
        let state = controller.state();
        assert_eq!(state.error, None);
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.last_user_text(), Some("Hello"));
    }
}
