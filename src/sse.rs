//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! This module turns the raw byte stream of an HTTP response into a stream of parsed
//! [`MessageStreamEvent`]s.  Bytes are buffered until a complete event (terminated by a blank
//! line) is available, so events and multi-byte characters may be split across chunks.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::observability::{STREAM_BYTES, STREAM_ERRORS, STREAM_EVENTS};
use crate::{Error, MessageStreamEvent, Result};

/// Process a stream of bytes into a stream of server-sent events.
///
/// Comment-only and empty events are skipped.  A trailing event without its terminating blank
/// line is still parsed when the byte stream ends.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<MessageStreamEvent>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    stream::unfold(
        (stream, Vec::<u8>::new(), 0, false),
        move |(mut stream, mut buffer, mut scanned, mut finished)| async move {
            loop {
                if let Some((end, delimiter)) = find_event_end(&buffer, scanned) {
                    let raw: Vec<u8> = buffer.drain(..end + delimiter).take(end).collect();
                    scanned = 0;
                    if let Some(event) = parse_event(&raw) {
                        count_event(&event);
                        return Some((event, (stream, buffer, scanned, finished)));
                    }
                    continue;
                }
                // A delimiter may straddle the next chunk, so rescan the last three bytes.
                scanned = buffer.len().saturating_sub(3);

                if finished {
                    if buffer.iter().all(u8::is_ascii_whitespace) {
                        return None;
                    }
                    let raw = std::mem::take(&mut buffer);
                    if let Some(event) = parse_event(&raw) {
                        count_event(&event);
                        return Some((event, (stream, buffer, scanned, finished)));
                    }
                    return None;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        buffer.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => {
                        STREAM_ERRORS.click();
                        return Some((Err(e), (stream, buffer, scanned, finished)));
                    }
                    None => finished = true,
                }
            }
        },
    )
}

fn count_event(event: &Result<MessageStreamEvent>) {
    match event {
        Ok(_) => STREAM_EVENTS.click(),
        Err(_) => STREAM_ERRORS.click(),
    }
}

/// Finds the end of the first complete event, returning its length and the delimiter length.
///
/// Bytes before `from` are known to hold no delimiter.
fn find_event_end(buffer: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i < buffer.len() {
        if buffer[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
        if buffer[i..].starts_with(b"\n\n") || buffer[i..].starts_with(b"\r\r") {
            return Some((i, 2));
        }
        i += 1;
    }
    None
}

/// Parses one event block.  Returns `None` for blocks that carry no data.
fn parse_event(raw: &[u8]) -> Option<Result<MessageStreamEvent>> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => {
            return Some(Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            )));
        }
    };

    let mut event_type = None;
    let mut data = Vec::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event_type = Some(value),
            "data" => data.push(value),
            _ => {}
        }
    }

    if data.is_empty() {
        return match event_type {
            Some("ping") => Some(Ok(MessageStreamEvent::Ping)),
            Some(other) => Some(Err(Error::serialization(
                format!("Malformed SSE event: '{other}' has no data"),
                None,
            ))),
            None => None,
        };
    }

    let data = data.join("\n");
    match serde_json::from_str::<MessageStreamEvent>(&data) {
        Ok(event) => Some(Ok(event)),
        Err(e) => Some(Err(Error::serialization(
            format!(
                "Failed to parse SSE event {}: {e}",
                event_type.unwrap_or("(untyped)")
            ),
            Some(Box::new(e)),
        ))),
    }
}
