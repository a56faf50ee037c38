//! Server-Sent Events framing.
//!
//! [`SseReader`] turns a stream of byte chunks into discrete [`SseEvent`]s
//! following the `text/event-stream` grammar:
//!
//! ```text
//! : comment lines are ignored
//! event: update
//! id: 42
//! data: first line
//! data: second line
//!
//! ```
//!
//! produces one event `{event: "update", data: "first line\nsecond line", id: "42"}`.
//!
//! Chunks may split lines (or multi-byte characters) anywhere; bytes are
//! buffered until a full line is available. When the source ends, any event
//! still being accumulated is dropped and the reader reports end-of-stream.

use crate::{Error, Result};
use futures::{Stream, StreamExt};
use std::time::Duration;

/// Default limit on a single line; see [`SseReader::max_line_bytes`].
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// One dispatched event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name, empty when the server did not send an `event:` field
    pub event: String,
    /// Data lines joined with `\n`
    pub data: String,
    /// Last event id seen on the stream at dispatch time
    pub id: String,
}

/// Incremental event reader over a byte-chunk stream.
///
/// Not restartable: once [`next_event`](SseReader::next_event) returns
/// `Ok(None)` the reader is exhausted.
pub struct SseReader<S> {
    source: S,
    buffer: Vec<u8>,
    /// Start of the unread part of `buffer`
    consumed: usize,
    /// Everything in `buffer[consumed..scanned]` is known to hold no `\n`
    scanned: usize,
    max_line: usize,
    exhausted: bool,

    event: String,
    data: String,
    last_event_id: String,
    reconnect_time: Option<Duration>,
}

impl<S, B> SseReader<S>
where
    S: Stream<Item = Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    pub fn new(source: S) -> Self {
        Self {
            source,
            buffer: Vec::new(),
            consumed: 0,
            scanned: 0,
            max_line: MAX_LINE_BYTES,
            exhausted: false,
            event: String::new(),
            data: String::new(),
            last_event_id: String::new(),
            reconnect_time: None,
        }
    }

    /// Fail with a protocol error once a single line grows past `limit`
    /// bytes without a terminator. Defaults to [`MAX_LINE_BYTES`].
    pub fn max_line_bytes(mut self, limit: usize) -> Self {
        self.max_line = limit;
        self
    }

    /// Last `retry:` hint received, if any.
    pub fn reconnect_time(&self) -> Option<Duration> {
        self.reconnect_time
    }

    /// Last event id received.
    pub fn last_event_id(&self) -> &str {
        &self.last_event_id
    }

    /// Read until the next dispatch boundary.
    ///
    /// Returns `Ok(None)` at end of input. Errors from the source are
    /// returned as-is.
    pub async fn next_event(&mut self) -> Result<Option<SseEvent>> {
        while let Some(line) = self.next_line().await? {
            let line = line.trim_end();

            if line.is_empty() {
                if self.event.is_empty() && self.data.is_empty() {
                    continue;
                }
                return Ok(Some(self.dispatch()));
            }

            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            self.apply(field, value);
        }

        // Truncated events are never emitted.
        self.event.clear();
        self.data.clear();
        Ok(None)
    }

    fn apply(&mut self, field: &str, value: &str) {
        match field {
            "event" => self.event = value.to_string(),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = value.to_string();
                }
            }
            "retry" => {
                if let Ok(millis) = value.parse::<u64>() {
                    self.reconnect_time = Some(Duration::from_millis(millis));
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self) -> SseEvent {
        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }

        SseEvent {
            event: std::mem::take(&mut self.event),
            data,
            id: self.last_event_id.clone(),
        }
    }

    /// Next `\n`-terminated line, without the terminator. A final line with
    /// no terminator is dropped along with the end of input.
    ///
    /// Each byte is scanned once. Consumed lines are compacted away only
    /// when more input is needed.
    async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
                let end = self.scanned + offset;
                let line = String::from_utf8_lossy(&self.buffer[self.consumed..end]).into_owned();
                self.consumed = end + 1;
                self.scanned = self.consumed;
                return Ok(Some(line));
            }
            self.scanned = self.buffer.len();

            if self.scanned - self.consumed > self.max_line {
                self.buffer.clear();
                self.consumed = 0;
                self.scanned = 0;
                return Err(Error::protocol(format!(
                    "SSE line exceeds {} bytes",
                    self.max_line
                )));
            }

            if self.exhausted {
                return Ok(None);
            }

            if self.consumed > 0 {
                self.buffer.drain(..self.consumed);
                self.scanned -= self.consumed;
                self.consumed = 0;
            }

            match self.source.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => return Err(e),
                None => self.exhausted = true,
            }
        }
    }
}
