//! The chat client: one conversation turn against the Messages API.
//!
//! [`ChatClient`] turns a chat history into a provider request and delivers the reply either
//! as a [`ReplyStream`], through a [`ReplyHandler`], or as a single [`ChatMessage`].  Retried
//! sends back off exponentially between attempts.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::accumulating_stream::{ReplyEvent, ReplyStream};
use crate::client_logger::ClientLogger;
use crate::config::{ApiKey, ClientConfig, ConfigUpdate};
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUEST_RETRIES, CLIENT_REQUESTS,
    CLIENT_RETRY_BACKOFF,
};
use crate::transport::{HttpTransport, Transport};
use crate::types::{ChatMessage, MessageCreateParams, MessageParam};

/////////////////////////////////////////// ReplyHandler ///////////////////////////////////////////

/// Receives the progress of a reply.
///
/// Every method defaults to doing nothing, so implementors override only what they render.
pub trait ReplyHandler: Send {
    /// A new fragment of text arrived.  Only the fragment is passed, never the accumulated text.
    fn on_stream(&mut self, _delta: &str) {}

    /// The reply is complete.
    fn on_complete(&mut self, _message: &ChatMessage) {}

    /// The send failed for good.
    fn on_error(&mut self, _error: &Error) {}

    /// Attempt `attempt` failed and another attempt starts after `delay`.  Text streamed by the
    /// failed attempt is void.
    fn on_retry(&mut self, _attempt: u32, _delay: Duration, _error: &Error) {}
}

impl ReplyHandler for () {}

//////////////////////////////////////////// ChatClient ////////////////////////////////////////////

#[derive(Debug)]
struct Settings {
    config: ClientConfig,
    api_key: ApiKey,
}

/// Client for chat turns against the Messages API.
///
/// The client holds no conversation state; callers pass the full history with every send.
pub struct ChatClient<T: Transport = HttpTransport> {
    transport: T,
    settings: RwLock<Settings>,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl ChatClient<HttpTransport> {
    /// Create a client for the public API.
    ///
    /// Fails with [`Error::Configuration`] if the credential is malformed.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_options(config, None, None)
    }

    /// Create a client with a custom base URL and/or request timeout.
    pub fn with_options(
        config: ClientConfig,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        // Reject a bad credential before building anything network-facing.
        config.validate()?;
        Self::with_transport(config, HttpTransport::with_options(base_url, timeout)?)
    }

    /// Create a client configured from the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Checks an API key's shape without touching the network.
    pub fn is_valid_api_key(key: &str) -> bool {
        ApiKey::is_valid(key)
    }
}

impl<T: Transport> ChatClient<T> {
    /// Create a client over an arbitrary transport.
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        let api_key = config.validate()?;
        Ok(Self {
            transport,
            settings: RwLock::new(Settings { config, api_key }),
            logger: None,
        })
    }

    /// Set a logger that observes every response and stream event.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> ClientConfig {
        self.settings().config.clone()
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Overrides part of the configuration.
    ///
    /// The result is validated as a whole; on error the previous configuration stays in effect.
    pub fn update_config(&self, update: ConfigUpdate) -> Result<()> {
        let mut config = self.config();
        config.apply(update);
        let api_key = config.validate()?;
        let mut settings = self
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *settings = Settings { config, api_key };
        Ok(())
    }

    /// Opens a streaming reply to `history`.
    ///
    /// Messages that are still streaming or have no text are left out of the request.  The
    /// returned stream ends with [`Error::Abort`] once `cancel` fires.
    pub async fn open_reply(
        &self,
        history: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<ReplyStream> {
        let (api_key, params) = self.prepare(history, true)?;
        CLIENT_REQUESTS.click();
        tracing::debug!(
            model = %params.model,
            messages = params.messages.len(),
            "opening chat reply"
        );
        let start = Instant::now();
        let events = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::abort("request cancelled")),
            events = self.transport.stream(&api_key, params) => events,
        };
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        match events {
            Ok(events) => Ok(ReplyStream::new(events, cancel.clone(), self.logger.clone())),
            Err(err) => {
                CLIENT_REQUEST_ERRORS.click();
                Err(err)
            }
        }
    }

    /// Streams one reply through `handler`.
    ///
    /// `on_stream` fires once per fragment, then exactly one of `on_complete` or `on_error`.
    pub async fn send_message(
        &self,
        history: &[ChatMessage],
        handler: &mut dyn ReplyHandler,
        cancel: &CancellationToken,
    ) -> Result<ChatMessage> {
        match self.attempt(history, handler, cancel).await {
            Ok(message) => {
                handler.on_complete(&message);
                Ok(message)
            }
            Err(err) => {
                handler.on_error(&err);
                Err(err)
            }
        }
    }

    /// Like [`send_message`](Self::send_message), but retries failed attempts.
    ///
    /// Up to `max_retry_attempts` fresh requests are made, sleeping `retry_base_delay * 2^(n-1)`
    /// after failed attempt `n`.  `on_retry` announces each retry and `on_error` fires only for
    /// the final failure.  Cancellation and configuration errors are never retried.
    pub async fn send_message_with_retry(
        &self,
        history: &[ChatMessage],
        handler: &mut dyn ReplyHandler,
        cancel: &CancellationToken,
    ) -> Result<ChatMessage> {
        let config = self.config();
        let mut attempt = 1;
        loop {
            let err = match self.attempt(history, handler, cancel).await {
                Ok(message) => {
                    handler.on_complete(&message);
                    return Ok(message);
                }
                Err(err) => err,
            };
            if !err.is_retryable() || attempt >= config.max_retry_attempts {
                handler.on_error(&err);
                return Err(err);
            }
            let delay = config.backoff_delay(attempt);
            CLIENT_REQUEST_RETRIES.click();
            CLIENT_RETRY_BACKOFF.add(delay.as_secs_f64());
            tracing::warn!(attempt, ?delay, error = %err, "chat request failed; retrying");
            handler.on_retry(attempt, delay, &err);
            let cancelled = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                let err = Error::abort("request cancelled during retry backoff");
                handler.on_error(&err);
                return Err(err);
            }
            attempt += 1;
        }
    }

    /// Waits for the whole reply.
    ///
    /// The reply text is the first content block's text, or empty if that block is not text.
    pub async fn send_message_non_streaming(&self, history: &[ChatMessage]) -> Result<ChatMessage> {
        let (api_key, params) = self.prepare(history, false)?;
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let response = self.transport.create(&api_key, params).await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        let message = response.inspect_err(|_| CLIENT_REQUEST_ERRORS.click())?;
        if let Some(logger) = &self.logger {
            logger.log_response(&message);
        }
        Ok(ChatMessage::assistant(message.first_text().unwrap_or_default()))
    }

    async fn attempt(
        &self,
        history: &[ChatMessage],
        handler: &mut dyn ReplyHandler,
        cancel: &CancellationToken,
    ) -> Result<ChatMessage> {
        let mut reply = self.open_reply(history, cancel).await?;
        while let Some(event) = reply.next().await {
            match event? {
                ReplyEvent::Delta(text) => handler.on_stream(&text),
                ReplyEvent::Complete(message) => return Ok(message),
            }
        }
        Err(Error::streaming("reply ended without completing", None))
    }

    fn prepare(
        &self,
        history: &[ChatMessage],
        stream: bool,
    ) -> Result<(ApiKey, MessageCreateParams)> {
        let messages: Vec<MessageParam> = history
            .iter()
            .filter(|message| !message.is_streaming && !message.content.is_empty())
            .map(MessageParam::from)
            .collect();
        if messages.is_empty() {
            return Err(Error::validation(
                "there is no message to send",
                Some("messages".to_string()),
            ));
        }
        let settings = self.settings();
        let mut params = MessageCreateParams::new(
            settings.config.model.clone(),
            settings.config.max_tokens,
            messages,
        )
        .with_temperature(settings.config.temperature);
        params.stream = stream;
        Ok((settings.api_key.clone(), params))
    }

    fn settings(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::scripted::{ScriptedTransport, Step, closing, fragment, opening};
    use crate::types::{KnownModel, MessageRole, Model};
    use tokio::sync::mpsc;

    const KEY: &str = "sk-ant-REDACTED";

    fn client(steps: Vec<Step>) -> ChatClient<ScriptedTransport> {
        ChatClient::with_transport(ClientConfig::new(KEY), ScriptedTransport::new(steps)).unwrap()
    }

    fn hello() -> Vec<ChatMessage> {
        vec![ChatMessage::user("Hello")]
    }

    #[derive(Default)]
    struct Recorder {
        fragments: Vec<String>,
        completed: Vec<String>,
        errors: Vec<String>,
        retries: Vec<(u32, Duration)>,
    }

    impl ReplyHandler for Recorder {
        fn on_stream(&mut self, delta: &str) {
            self.fragments.push(delta.to_string());
        }

        fn on_complete(&mut self, message: &ChatMessage) {
            self.completed.push(message.content.clone());
        }

        fn on_error(&mut self, error: &Error) {
            self.errors.push(error.message().to_string());
        }

        fn on_retry(&mut self, attempt: u32, delay: Duration, _: &Error) {
            self.retries.push((attempt, delay));
        }
    }

    #[test]
    fn rejects_malformed_credential() {
        let err = ChatClient::new(ClientConfig::new("sk-live-123")).err().unwrap();
        assert!(err.is_configuration());
        let err = ChatClient::with_transport(
            ClientConfig::new("sk-ant-short"),
            ScriptedTransport::default(),
        )
        .err()
        .unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn api_key_check_is_static() {
        assert!(ChatClient::is_valid_api_key(KEY));
        assert!(!ChatClient::is_valid_api_key("sk-ant-"));
    }

    #[tokio::test]
    async fn streams_fragments_then_completes() {
        let client = client(vec![Step::Reply(vec!["Hi", " there"])]);
        let mut recorder = Recorder::default();
        let message = client
            .send_message(&hello(), &mut recorder, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(message.content, "Hi there");
        assert_eq!(message.role, MessageRole::Assistant);
        assert!(!message.is_streaming);
        assert_eq!(recorder.fragments, vec!["Hi", " there"]);
        assert_eq!(recorder.completed, vec!["Hi there"]);
        assert!(recorder.errors.is_empty());
    }

    #[tokio::test]
    async fn request_carries_config_and_filtered_history() {
        let client = client(vec![Step::Reply(vec!["ok"])]);
        let history = vec![
            ChatMessage::user("Hello"),
            ChatMessage::assistant(""),
            ChatMessage::assistant("Hi"),
            ChatMessage::user("More"),
            ChatMessage::placeholder(),
        ];
        client
            .send_message(&history, &mut (), &CancellationToken::new())
            .await
            .unwrap();
        let requests = client.transport().requests();
        assert_eq!(requests.len(), 1);
        let params = &requests[0];
        assert_eq!(params.model, Model::Known(KnownModel::ClaudeSonnet4520250929));
        assert_eq!(params.max_tokens, 1024);
        assert_eq!(params.temperature, Some(1.0));
        assert!(params.stream);
        assert_eq!(
            params.messages,
            vec![
                MessageParam::user("Hello"),
                MessageParam::assistant("Hi"),
                MessageParam::user("More"),
            ]
        );
    }

    #[tokio::test]
    async fn empty_history_is_a_validation_error() {
        let client = client(vec![]);
        let err = client
            .send_message(&[ChatMessage::placeholder()], &mut (), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(client.transport().requests().is_empty());
    }

    #[tokio::test]
    async fn single_attempt_reports_error_once() {
        let client = client(vec![Step::FailAfter(
            vec!["Hi"],
            Error::connection("connection reset", None),
        )]);
        let mut recorder = Recorder::default();
        let err = client
            .send_message(&hello(), &mut recorder, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.message(), "connection reset");
        assert_eq!(recorder.fragments, vec!["Hi"]);
        assert_eq!(recorder.errors, vec!["connection reset"]);
        assert!(recorder.completed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_transport_is_tried_three_times() {
        let client = client(vec![
            Step::Fail(Error::service_unavailable("overloaded", None)),
            Step::Fail(Error::service_unavailable("overloaded", None)),
            Step::Fail(Error::service_unavailable("overloaded", None)),
        ]);
        let mut recorder = Recorder::default();
        let start = tokio::time::Instant::now();
        let err = client
            .send_message_with_retry(&hello(), &mut recorder, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_server_error());
        assert_eq!(client.transport().requests().len(), 3);
        assert_eq!(
            recorder.retries,
            vec![
                (1, Duration::from_millis(1000)),
                (2, Duration::from_millis(2000)),
            ]
        );
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
        assert_eq!(recorder.errors.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_and_discards_partial_text() {
        let client = client(vec![
            Step::FailAfter(vec!["Hel"], Error::streaming("ended early", None)),
            Step::Reply(vec!["Hello", " again"]),
        ]);
        let mut recorder = Recorder::default();
        let message = client
            .send_message_with_retry(&hello(), &mut recorder, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(message.content, "Hello again");
        assert_eq!(recorder.retries.len(), 1);
        assert_eq!(recorder.fragments, vec!["Hel", "Hello", " again"]);
        assert!(recorder.errors.is_empty());
        assert_eq!(recorder.completed, vec!["Hello again"]);
    }

    #[tokio::test(start_paused = true)]
    async fn configuration_errors_are_not_retried() {
        let client = client(vec![
            Step::Fail(Error::configuration("bad header", None)),
            Step::Reply(vec!["unreachable"]),
        ]);
        let err = client
            .send_message_with_retry(&hello(), &mut (), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(client.transport().requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_stops_retrying() {
        let client = Arc::new(client(vec![
            Step::Fail(Error::timeout("slow", None)),
            Step::Reply(vec!["unreachable"]),
        ]));
        let cancel = CancellationToken::new();
        let task = {
            let client = Arc::clone(&client);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut recorder = Recorder::default();
                let result = client
                    .send_message_with_retry(&hello(), &mut recorder, &cancel)
                    .await;
                (result, recorder)
            })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();
        let (result, recorder) = task.await.unwrap();
        assert!(result.unwrap_err().is_abort());
        assert_eq!(recorder.retries.len(), 1);
        assert_eq!(recorder.errors.len(), 1);
        assert_eq!(client.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn cancel_mid_stream_aborts_reply() {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = client(vec![Step::Channel(rx)]);
        let cancel = CancellationToken::new();
        let mut reply = client.open_reply(&hello(), &cancel).await.unwrap();
        for event in opening() {
            tx.send(Ok(event)).unwrap();
        }
        tx.send(Ok(fragment("Hi"))).unwrap();
        assert!(matches!(
            reply.next().await,
            Some(Ok(ReplyEvent::Delta(text))) if text == "Hi"
        ));
        cancel.cancel();
        assert!(reply.next().await.unwrap().unwrap_err().is_abort());
        assert!(reply.next().await.is_none());
        for event in closing() {
            let _ = tx.send(Ok(event));
        }
    }

    #[tokio::test]
    async fn non_streaming_returns_first_text() {
        let client = client(vec![Step::Reply(vec!["Hi", " there"])]);
        let message = client.send_message_non_streaming(&hello()).await.unwrap();
        assert_eq!(message.content, "Hi there");
        assert!(message.is_assistant());
        assert!(!client.transport().requests()[0].stream);
    }

    #[test]
    fn update_config_revalidates() {
        let client = client(vec![]);
        client
            .update_config(ConfigUpdate {
                model: Some(Model::Known(KnownModel::ClaudeHaiku45)),
                max_tokens: Some(256),
                ..ConfigUpdate::default()
            })
            .unwrap();
        assert_eq!(client.config().model, Model::Known(KnownModel::ClaudeHaiku45));
        assert_eq!(client.config().max_tokens, 256);

        let err = client
            .update_config(ConfigUpdate {
                api_key: Some("bogus".to_string()),
                max_tokens: Some(1),
                ..ConfigUpdate::default()
            })
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(client.config().api_key, KEY);
        assert_eq!(client.config().max_tokens, 256);
    }
}
