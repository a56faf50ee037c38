//! # Chat Engine
//!
//! A conversational completion engine for OpenAI-compatible chat APIs
//! (OpenRouter, OpenAI, and local servers such as LM Studio or Ollama).
//!
//! ## Overview
//!
//! The engine drives a multi-turn exchange with a model:
//!
//! - sends the transcript as a chat-completions request, either as a single
//!   JSON exchange or as a Server-Sent Events stream
//! - folds streamed fragments back into one complete response
//! - runs registered tools whenever the model finishes with `tool_calls`,
//!   appends their results, and asks again
//! - decodes the final answer as text, as a JSON object, or as a typed value
//!   whose JSON Schema is derived from an explicit shape description
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chat_engine::{ConversationEngine, EngineOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = EngineOptions::builder()
//!         .model("openai/gpt-4o-mini")
//!         .api_key(std::env::var("OPENROUTER_API_KEY")?)
//!         .build()?;
//!
//!     let mut engine = ConversationEngine::new(options)?;
//!     engine.system("You are a terse calculator.");
//!     engine.user("What's 2+2?");
//!
//!     let answer = engine.advance_turn().await?;
//!     println!("{}", answer);
//!     Ok(())
//! }
//! ```
//!
//! ## Structured Results
//!
//! ```rust,no_run
//! use chat_engine::schema::{Described, Field, Shape};
//! use chat_engine::{ConversationEngine, EngineOptions, SchemaDecoder};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Person {
//!     name: String,
//!     age: Option<u32>,
//! }
//!
//! impl Described for Person {
//!     fn shape() -> Shape {
//!         Shape::record([
//!             Field::required("name", Shape::String),
//!             Field::optional("age", Shape::Integer),
//!         ])
//!     }
//! }
//!
//! # async fn run() -> chat_engine::Result<()> {
//! let options = EngineOptions::builder().model("openai/gpt-4o-mini").build()?;
//! let mut engine = ConversationEngine::with_decoder(options, SchemaDecoder::<Person>::new())?;
//! engine.user("Who wrote the first published algorithm?");
//! let person: Person = engine.advance_turn().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **engine**: the turn loop and transcript ([`ConversationEngine`])
//! - **tools**: tool definitions and the dispatcher that runs them
//! - **schema**: shape descriptions and JSON Schema derivation
//! - **decode**: result decoders (text, object, schema-constrained)
//! - **sse**: Server-Sent Events framing
//! - **merge**: folding stream fragments into one response
//! - **stream**: the per-request task that ties `sse` and `merge` together
//! - **transport**: the request boundary and its HTTP implementation
//! - **types**: options and wire types
//! - **logger**: optional capture of raw payloads
//! - **error**: the error type shared by everything above

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// Result decoders choosing the requested response format.
mod decode;

/// The conversation state machine.
mod engine;

/// Error types and the crate-wide `Result<T>` alias.
mod error;

/// Injected diagnostic capture of request and response payloads.
mod logger;

/// Streaming task combining the SSE reader with the merger.
mod stream;

/// Tool definitions, builder and dispatcher.
mod tools;

/// Engine options and chat-completions wire types.
mod types;

/// Transport trait and the `reqwest` implementation.
mod transport;

// ============================================================================
// PUBLIC MODULES
// ============================================================================

/// Fragment merging, usable on its own for custom stream handling.
pub mod merge;

/// Shape descriptions and schema derivation.
pub mod schema;

/// Server-Sent Events reader.
pub mod sse;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

// --- Engine ---

pub use engine::{ConversationEngine, EngineState};

// --- Results ---

pub use decode::{ObjectDecoder, ResultDecoder, SchemaDecoder, TextDecoder};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Logging ---

pub use logger::{ExchangeLogger, LogExchangeLogger, LogKind};

// --- Streaming ---

pub use stream::{DONE, pump};

// --- Tool System ---

pub use tools::{
    INVALID_ARGUMENTS, Tool, ToolBuilder, ToolDispatcher, ToolFuture, ToolHandler, tool,
};

// --- Transport ---

pub use transport::{ByteStream, HttpTransport, Transport};

// --- Core Types ---

pub use types::{
    Choice, DEFAULT_BASE_URL, EngineOptions, EngineOptionsBuilder, ErrorDef, FunctionCall,
    JsonSchemaFormat, Message, ProviderPreferences, Request, Response, ResponseFormat, Role,
    SamplingParams, ToolCall, ToolChoice, Usage,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// Commonly used items. Import with `use chat_engine::prelude::*;`.
pub mod prelude {
    pub use crate::schema::{Described, Field, Shape};
    pub use crate::{
        ConversationEngine, EngineOptions, Error, Message, Result, Role, SchemaDecoder, Tool,
        tool,
    };
}
