//! Error types for the chat engine
//!
//! Every fallible operation in the crate returns [`Result<T>`]. The variants
//! follow the failure classes a conversation can hit:
//!
//! - configuration problems caught before any request is sent
//! - transport failures while talking to the provider
//! - protocol violations in what the provider sent back
//! - errors the model reports in-band
//! - tool dispatch failures
//!
//! None of these are retried by the engine.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (no model, duplicate tool names, ...)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport failure that did not originate in reqwest (bad status, broken body)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider answered with something the protocol does not allow,
    /// including an unexpected `Content-Type`
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error reported by the model inside an otherwise well-formed response
    #[error("Model error (code {code}): {message}")]
    Model { code: i64, message: String },

    /// Tool dispatch error
    #[error("Tool execution error: {0}")]
    Tool(String),
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Create a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Create a new model error
    pub fn model(code: i64, msg: impl Into<String>) -> Self {
        Error::Model {
            code,
            message: msg.into(),
        }
    }

    /// Create a new tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    /// True for failures while moving bytes to or from the provider.
    ///
    /// A non-2xx status counts; a 2xx answer with the wrong `Content-Type`
    /// does not (see [`is_protocol`](Self::is_protocol)).
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Transport(_))
    }

    /// True for responses that could not be understood.
    ///
    /// This includes a successful response whose `Content-Type` is not the
    /// one the request asked for (`application/json` for single requests,
    /// `text/event-stream` for streaming ones): the bytes arrived, but they
    /// are not a chat-completions payload.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::Json(_))
    }
}
