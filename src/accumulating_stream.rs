//! Turns provider events into chat reply events while accumulating the final text.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::client_logger::ClientLogger;
use crate::observability::{STREAM_DURATION, STREAM_TTFB};
use crate::transport::EventStream;
use crate::{ChatMessage, ContentBlock, Error, MessageStreamEvent, Result};

/// One item of a streamed reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyEvent {
    /// A new fragment of text, not the accumulated text.
    Delta(String),

    /// The reply is complete.  Always the last item of a successful stream.
    Complete(ChatMessage),
}

/// A streamed reply: text fragments followed by exactly one terminal item, either
/// [`ReplyEvent::Complete`] or an error.  Nothing is yielded after the terminal item.
///
/// Cancelling the token the stream was opened with ends it with an [`Error::Abort`].
pub struct ReplyStream {
    inner: Pin<Box<dyn Stream<Item = Result<ReplyEvent>> + Send>>,
}

impl ReplyStream {
    pub(crate) fn new(
        events: EventStream,
        cancel: CancellationToken,
        logger: Option<Arc<dyn ClientLogger>>,
    ) -> Self {
        let state = ReplyState {
            events,
            accumulator: ReplyAccumulator::default(),
            cancel,
            logger,
            opened: Instant::now(),
            saw_event: false,
            done: false,
        };
        let inner = stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            let item = state.next_item().await;
            if !matches!(item, Ok(ReplyEvent::Delta(_))) {
                state.done = true;
            }
            Some((item, state))
        });
        Self {
            inner: Box::pin(inner),
        }
    }
}

impl Stream for ReplyStream {
    type Item = Result<ReplyEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

struct ReplyState {
    events: EventStream,
    accumulator: ReplyAccumulator,
    cancel: CancellationToken,
    logger: Option<Arc<dyn ClientLogger>>,
    opened: Instant,
    saw_event: bool,
    done: bool,
}

impl ReplyState {
    async fn next_item(&mut self) -> Result<ReplyEvent> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                next = self.events.next() => Some(next),
            };
            let Some(next) = next else {
                return Err(Error::abort("reply cancelled"));
            };
            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(err)) => return Err(err),
                None => {
                    return Err(Error::streaming("stream ended before message_stop", None));
                }
            };
            if !self.saw_event {
                self.saw_event = true;
                STREAM_TTFB.add(self.opened.elapsed().as_secs_f64());
            }
            if let Some(logger) = &self.logger {
                logger.log_stream_event(&event);
            }
            match self.accumulator.apply(event)? {
                Some(Progress::Delta(text)) => return Ok(ReplyEvent::Delta(text)),
                Some(Progress::Finished(message)) => {
                    STREAM_DURATION.add(self.opened.elapsed().as_secs_f64());
                    if let Some(logger) = &self.logger {
                        logger.log_stream_message(&message);
                    }
                    return Ok(ReplyEvent::Complete(message));
                }
                None => continue,
            }
        }
    }
}

/// What an event contributed to the reply.
#[derive(Debug, PartialEq)]
enum Progress {
    Delta(String),
    Finished(ChatMessage),
}

/// Accumulates text blocks by index until `message_stop`.
#[derive(Debug, Default)]
struct ReplyAccumulator {
    started: bool,
    blocks: Vec<Option<String>>,
}

impl ReplyAccumulator {
    fn apply(&mut self, event: MessageStreamEvent) -> Result<Option<Progress>> {
        match event {
            MessageStreamEvent::Ping => Ok(None),
            MessageStreamEvent::MessageStart(_) => {
                self.started = true;
                Ok(None)
            }
            MessageStreamEvent::ContentBlockStart(start) => {
                self.require_started()?;
                if self.blocks.len() <= start.index {
                    self.blocks.resize(start.index + 1, None);
                }
                self.blocks[start.index] = match start.content_block {
                    ContentBlock::Text(block) => Some(block.text),
                    ContentBlock::Unsupported => None,
                };
                Ok(None)
            }
            MessageStreamEvent::ContentBlockDelta(delta) => {
                self.require_started()?;
                let Some(text) = delta.delta.text() else {
                    return Ok(None);
                };
                let Some(Some(block)) = self.blocks.get_mut(delta.index) else {
                    return Err(Error::streaming(
                        format!("text delta for unopened block {}", delta.index),
                        None,
                    ));
                };
                if text.is_empty() {
                    return Ok(None);
                }
                block.push_str(text);
                Ok(Some(Progress::Delta(text.to_string())))
            }
            MessageStreamEvent::ContentBlockStop(_) | MessageStreamEvent::MessageDelta(_) => {
                Ok(None)
            }
            MessageStreamEvent::MessageStop => {
                self.require_started()?;
                Ok(Some(Progress::Finished(ChatMessage::assistant(
                    self.final_text(),
                ))))
            }
            MessageStreamEvent::Error { error } => Err(Error::from_provider(
                500,
                Some(&error.error_type),
                error.message,
                None,
                None,
            )),
        }
    }

    fn require_started(&self) -> Result<()> {
        if self.started {
            Ok(())
        } else {
            Err(Error::streaming(
                "stream event arrived before message_start",
                None,
            ))
        }
    }

    /// The first block's text when it is a text block, otherwise all text concatenated.
    fn final_text(&mut self) -> String {
        match self.blocks.first_mut() {
            Some(Some(first)) => std::mem::take(first),
            _ => self.blocks.iter().flatten().map(String::as_str).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ApiErrorObject, ContentBlockDelta, ContentBlockDeltaEvent, ContentBlockStartEvent,
        ContentBlockStopEvent, Message, MessageRole, Model, TextBlock, TextDelta, Usage,
    };

    fn start() -> MessageStreamEvent {
        MessageStreamEvent::MessageStart(crate::MessageStartEvent {
            message: Message {
                id: "msg_test".to_string(),
                content: vec![],
                model: Model::default(),
                role: MessageRole::Assistant,
                stop_reason: None,
                usage: Usage::default(),
            },
        })
    }

    fn block_start(index: usize) -> MessageStreamEvent {
        MessageStreamEvent::ContentBlockStart(ContentBlockStartEvent {
            index,
            content_block: ContentBlock::Text(TextBlock::new("")),
        })
    }

    fn text(index: usize, text: &str) -> MessageStreamEvent {
        MessageStreamEvent::ContentBlockDelta(ContentBlockDeltaEvent {
            index,
            delta: ContentBlockDelta::TextDelta(TextDelta::new(text)),
        })
    }

    fn events(items: Vec<Result<MessageStreamEvent>>) -> EventStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn yields_fragments_then_complete() {
        let reply = ReplyStream::new(
            events(vec![
                Ok(start()),
                Ok(block_start(0)),
                Ok(MessageStreamEvent::Ping),
                Ok(text(0, "Hi")),
                Ok(text(0, " there")),
                Ok(MessageStreamEvent::ContentBlockStop(ContentBlockStopEvent {
                    index: 0,
                })),
                Ok(MessageStreamEvent::MessageStop),
            ]),
            CancellationToken::new(),
            None,
        );
        let items: Vec<_> = reply.collect().await;
        assert_eq!(items.len(), 3);
        assert!(matches!(&items[0], Ok(ReplyEvent::Delta(text)) if text == "Hi"));
        assert!(matches!(&items[1], Ok(ReplyEvent::Delta(text)) if text == " there"));
        match &items[2] {
            Ok(ReplyEvent::Complete(message)) => {
                assert_eq!(message.content, "Hi there");
                assert!(message.is_assistant());
                assert!(!message.is_streaming);
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn early_end_is_an_error() {
        let reply = ReplyStream::new(
            events(vec![Ok(start()), Ok(block_start(0)), Ok(text(0, "Hi"))]),
            CancellationToken::new(),
            None,
        );
        let items: Vec<_> = reply.collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(Error::Streaming { .. })));
    }

    #[tokio::test]
    async fn provider_error_event_terminates() {
        let reply = ReplyStream::new(
            events(vec![
                Ok(start()),
                Ok(MessageStreamEvent::Error {
                    error: ApiErrorObject {
                        error_type: "overloaded_error".to_string(),
                        message: "Overloaded".to_string(),
                    },
                }),
                Ok(MessageStreamEvent::MessageStop),
            ]),
            CancellationToken::new(),
            None,
        );
        let items: Vec<_> = reply.collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::ServiceUnavailable { .. })));
    }

    #[tokio::test]
    async fn cancelled_token_aborts() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let events: EventStream = Box::pin(stream::pending::<Result<MessageStreamEvent>>());
        let reply = ReplyStream::new(events, cancel, None);
        let items: Vec<_> = reply.collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].as_ref().unwrap_err().is_abort());
    }

    #[test]
    fn delta_before_start_is_rejected() {
        let mut acc = ReplyAccumulator::default();
        assert!(acc.apply(text(0, "Hi")).is_err());
    }

    #[test]
    fn final_text_falls_back_to_concatenation() {
        let mut acc = ReplyAccumulator::default();
        acc.apply(start()).unwrap();
        acc.apply(MessageStreamEvent::ContentBlockStart(ContentBlockStartEvent {
            index: 0,
            content_block: ContentBlock::Unsupported,
        }))
        .unwrap();
        acc.apply(block_start(1)).unwrap();
        acc.apply(text(1, "after tool")).unwrap();
        match acc.apply(MessageStreamEvent::MessageStop).unwrap() {
            Some(Progress::Finished(message)) => assert_eq!(message.content, "after tool"),
            other => panic!("unexpected progress: {other:?}"),
        }
    }
}
