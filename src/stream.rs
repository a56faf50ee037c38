//! Streaming pump: byte stream in, merged response out.
//!
//! ```text
//! ByteStream -> SseReader -> serde_json -> merge_response -> accumulated Response
//!                                              |
//!                                              +-> first-choice delta text -> mpsc::Sender
//! ```
//!
//! Runs as a single spawned task per streaming request. The task owns the
//! body for its whole life; the engine only sees the final result.

use crate::logger::{ExchangeLogger, LogKind};
use crate::merge::merge_response;
use crate::sse::SseReader;
use crate::transport::ByteStream;
use crate::types::Response;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Data payload that ends a completion stream.
pub const DONE: &str = "[DONE]";

/// Drain `body` and return the merged response.
///
/// - `[DONE]` or end of input stops reading; whatever was merged so far is
///   returned (`None` if nothing was).
/// - A fragment that is not valid JSON aborts with a protocol error.
/// - A fragment reporting an error aborts with that error.
/// - Named events other than `message` are skipped.
///
/// Non-empty first-choice delta text is sent on `deltas` in merge order. A
/// closed receiver does not stop the pump.
pub async fn pump(
    body: ByteStream,
    deltas: Option<mpsc::Sender<String>>,
    logger: Option<Arc<dyn ExchangeLogger>>,
) -> Result<Option<Response>> {
    let mut reader = SseReader::new(body);
    let mut accumulated: Option<Response> = None;

    while let Some(event) = reader.next_event().await? {
        if !event.event.is_empty() && event.event != "message" {
            log::debug!("Skipping '{}' event", event.event);
            continue;
        }

        if let Some(logger) = &logger {
            logger.log(LogKind::Chunk, &event.data);
        }

        if event.data == DONE {
            break;
        }
        if event.data.is_empty() {
            continue;
        }

        let fragment: Response = serde_json::from_str(&event.data)
            .map_err(|e| Error::protocol(format!("undecodable stream fragment: {}", e)))?;

        if let Some(err) = fragment.reported_error() {
            return Err(err);
        }

        let text = fragment
            .choices
            .first()
            .and_then(|choice| choice.delta.as_ref())
            .map(|delta| delta.content.clone())
            .filter(|text| !text.is_empty());

        accumulated = Some(merge_response(accumulated, fragment));

        if let (Some(sender), Some(text)) = (&deltas, text) {
            if sender.send(text).await.is_err() {
                log::debug!("Delta receiver dropped, continuing without forwarding");
            }
        }
    }

    Ok(accumulated)
}
