//! Exchange logging
//!
//! An [`ExchangeLogger`] sees every raw payload that crosses the transport
//! boundary: serialized requests, single response bodies and individual
//! stream chunks. Engines without a logger skip the calls entirely.

use std::fmt;

/// What a logged payload is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Request,
    Response,
    Chunk,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogKind::Request => write!(f, "Request"),
            LogKind::Response => write!(f, "Response"),
            LogKind::Chunk => write!(f, "Chunk"),
        }
    }
}

/// Receives raw payloads exchanged with the provider.
///
/// Called from the streaming task as well as the caller's task, hence
/// `Send + Sync`. Implementations must not block for long.
pub trait ExchangeLogger: Send + Sync {
    fn log(&self, kind: LogKind, payload: &str);
}

/// Forwards payloads to the `log` facade at debug level.
///
/// JSON payloads are pretty-printed; anything else is logged verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogExchangeLogger;

impl ExchangeLogger for LogExchangeLogger {
    fn log(&self, kind: LogKind, payload: &str) {
        log::debug!("{}: {}", kind, pretty(payload));
    }
}

fn pretty(payload: &str) -> String {
    serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| payload.to_string())
}
