//! # Conversation Engine
//!
//! [`ConversationEngine`] owns one conversation: the transcript, the tool
//! registry and the decoder for the final answer. Each call to
//! [`advance_turn`](ConversationEngine::advance_turn) runs the turn loop until
//! the model stops:
//!
//! ```text
//!            +-------------------------------------------+
//!            v                                           |
//! Idle -> AwaitingModel --response--> Evaluating --tool_calls--> dispatch
//!                                        |
//!                                        +-- stop / "" --> Done (decoded result)
//!                                        +-- anything else --> Failed
//! ```
//!
//! Every assistant message is appended to the transcript before its finish
//! reason is looked at, so a failed exchange still leaves the model's last
//! turn in place for inspection.
//!
//! ## Example
//!
//! ```rust,no_run
//! use chat_engine::{ConversationEngine, EngineOptions};
//!
//! #[tokio::main]
//! async fn main() -> chat_engine::Result<()> {
//!     let options = EngineOptions::builder()
//!         .model("openai/gpt-4o-mini")
//!         .api_key("sk-...")
//!         .build()?;
//!
//!     let mut engine = ConversationEngine::new(options)?;
//!     engine.user("What's 2+2?");
//!     let answer = engine.advance_turn().await?;
//!     println!("{}", answer);
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming
//!
//! [`advance_turn_streaming`](ConversationEngine::advance_turn_streaming)
//! forwards text deltas to a bounded channel while the response is merged in
//! a background task. The receiver has to be drained concurrently, otherwise
//! the pump stalls once the channel is full:
//!
//! ```rust,no_run
//! # use chat_engine::{ConversationEngine, EngineOptions};
//! # async fn run(mut engine: ConversationEngine) -> chat_engine::Result<()> {
//! let (tx, mut rx) = tokio::sync::mpsc::channel(32);
//! let printer = tokio::spawn(async move {
//!     while let Some(text) = rx.recv().await {
//!         print!("{}", text);
//!     }
//! });
//! let answer = engine.advance_turn_streaming(tx).await?;
//! let _ = printer.await;
//! # Ok(())
//! # }
//! ```

use crate::decode::{ResultDecoder, TextDecoder};
use crate::logger::LogKind;
use crate::stream::pump;
use crate::tools::ToolDispatcher;
use crate::transport::{HttpTransport, Transport, media_type};
use crate::types::{
    EngineOptions, Message, Request, Response, ResponseFormat, Role, ToolChoice,
};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Where the engine is in its turn loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// Nothing has run yet.
    #[default]
    Idle,
    /// A request is in flight.
    AwaitingModel,
    /// Inspecting the finish reason of a response.
    Evaluating,
    /// The last exchange produced a result.
    Done,
    /// The last exchange failed.
    Failed,
}

/// Drives a multi-turn exchange with a chat-completions model.
///
/// Generic over the [`ResultDecoder`] that picks the requested
/// `response_format` and decodes the final answer; plain text by default.
pub struct ConversationEngine<D: ResultDecoder = TextDecoder> {
    options: EngineOptions,
    transport: Arc<dyn Transport>,
    decoder: D,
    dispatcher: ToolDispatcher,
    transcript: Vec<Message>,
    state: EngineState,
    object_response: bool,
}

impl<D: ResultDecoder> std::fmt::Debug for ConversationEngine<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("options", &self.options)
            .field("tools", &self.dispatcher)
            .field("transcript", &format!("{} messages", self.transcript.len()))
            .field("state", &self.state)
            .finish()
    }
}

impl ConversationEngine<TextDecoder> {
    /// Text-result engine over HTTP.
    pub fn new(options: EngineOptions) -> Result<Self> {
        Self::with_decoder(options, TextDecoder)
    }
}

impl<D: ResultDecoder> ConversationEngine<D> {
    /// Engine over HTTP with a custom result decoder.
    pub fn with_decoder(options: EngineOptions, decoder: D) -> Result<Self> {
        let transport = Arc::new(HttpTransport::from_options(&options)?);
        Self::with_transport(options, transport, decoder)
    }

    /// Engine over an arbitrary transport.
    ///
    /// Fails if two registered tools share a name.
    pub fn with_transport(
        options: EngineOptions,
        transport: Arc<dyn Transport>,
        decoder: D,
    ) -> Result<Self> {
        let dispatcher = ToolDispatcher::new(options.tools.iter().cloned())?;

        Ok(Self {
            options,
            transport,
            decoder,
            dispatcher,
            transcript: Vec::new(),
            state: EngineState::Idle,
            object_response: false,
        })
    }

    /// Set or replace the model used by the next request.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.options.model = Some(model.into());
    }

    /// The configured model, if any.
    pub fn model(&self) -> Option<&str> {
        self.options.model.as_deref()
    }

    /// Ask for an unconstrained JSON object instead of a schema-constrained
    /// one, for models that mishandle `json_schema`. The result is still
    /// decoded by the engine's decoder.
    pub fn set_object_response(&mut self) {
        self.object_response = true;
    }

    /// Append a plain message with `role` to the transcript.
    pub fn add_message(&mut self, role: Role, content: impl Into<String>) {
        self.transcript.push(Message::new(role, content));
    }

    /// Append a fully built message, tool calls or ids included.
    pub fn push_message(&mut self, message: Message) {
        self.transcript.push(message);
    }

    /// Append a system message.
    pub fn system(&mut self, text: impl Into<String>) {
        self.add_message(Role::System, text);
    }

    /// Append a user message.
    pub fn user(&mut self, text: impl Into<String>) {
        self.add_message(Role::User, text);
    }

    /// Every message so far, in order, including assistant turns and tool
    /// results added by the turn loop.
    ///
    /// ```rust,no_run
    /// # use chat_engine::{ConversationEngine, EngineOptions};
    /// # async fn run(mut engine: ConversationEngine) -> chat_engine::Result<()> {
    /// engine.user("What's 2+2?");
    /// engine.advance_turn().await?;
    /// for message in engine.transcript() {
    ///     println!("{:?}: {}", message.role, message.content);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Drop the whole transcript and return to [`EngineState::Idle`].
    /// Model, tools and options are kept.
    pub fn clear_transcript(&mut self) {
        self.transcript.clear();
        self.state = EngineState::Idle;
    }

    /// Where the last call to the turn loop left the engine.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The registered tools.
    pub fn tools(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Run the turn loop until the model stops, and decode its answer.
    ///
    /// Streams under the hood when the options ask for it, without
    /// forwarding deltas anywhere.
    pub async fn advance_turn(&mut self) -> Result<D::Output> {
        let streaming = self.options.stream;
        self.run(streaming, None).await
    }

    /// Like [`advance_turn`](Self::advance_turn), always streaming, with
    /// every non-empty first-choice delta sent on `deltas` as it is merged.
    /// Nothing is sent after this returns.
    pub async fn advance_turn_streaming(
        &mut self,
        deltas: mpsc::Sender<String>,
    ) -> Result<D::Output> {
        self.run(true, Some(deltas)).await
    }

    async fn run(
        &mut self,
        streaming: bool,
        deltas: Option<mpsc::Sender<String>>,
    ) -> Result<D::Output> {
        let result = self.exchange(streaming, deltas).await;
        self.state = match result {
            Ok(_) => EngineState::Done,
            Err(_) => EngineState::Failed,
        };
        result
    }

    async fn exchange(
        &mut self,
        streaming: bool,
        deltas: Option<mpsc::Sender<String>>,
    ) -> Result<D::Output> {
        let model = self
            .options
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| Error::config("model not set"))?;

        let mut tool_rounds = 0u32;

        loop {
            self.state = EngineState::AwaitingModel;
            let request = self.build_request(&model, streaming);
            let response = if streaming {
                self.send_streaming(&request, deltas.clone()).await?
            } else {
                self.send_single(&request).await?
            };

            self.state = EngineState::Evaluating;
            let (finish_reason, message) = self.accept(response)?;

            match finish_reason.to_lowercase().as_str() {
                // Some providers leave the finish reason empty when streaming.
                "" | "stop" => return self.decoder.decode(&message.content),
                "tool_calls" => {
                    if let Some(max) = self.options.max_tool_rounds {
                        if tool_rounds >= max {
                            return Err(Error::tool(format!(
                                "tool call limit of {} rounds exceeded",
                                max
                            )));
                        }
                    }
                    tool_rounds += 1;
                    self.dispatcher
                        .dispatch(&message.tool_calls, &mut self.transcript)
                        .await?;
                }
                other => {
                    return Err(Error::protocol(format!("unknown finish reason: {}", other)));
                }
            }
        }
    }

    fn build_request(&self, model: &str, streaming: bool) -> Request {
        let response_format = match self.decoder.response_format() {
            ResponseFormat::JsonSchema { .. } if self.object_response => ResponseFormat::JsonObject,
            format => format,
        };

        let tool_choice = self.options.tool_choice.clone().or_else(|| {
            (!self.dispatcher.is_empty()).then_some(ToolChoice::Auto)
        });

        Request {
            messages: self.transcript.clone(),
            model: model.to_string(),
            response_format: Some(response_format),
            sampling: self.options.sampling.clone(),
            stream: streaming,
            tools: self.dispatcher.definitions(),
            tool_choice,
            transforms: self.options.transforms.clone(),
            models: self.options.models.clone(),
            route: self.options.route.clone(),
            provider: self.options.provider.clone(),
        }
    }

    /// Validate a response, append its first message, and hand back the
    /// finish reason with a copy of that message.
    fn accept(&mut self, response: Response) -> Result<(String, Message)> {
        if let Some(err) = response.reported_error() {
            return Err(err);
        }

        let mut choices = response.choices.into_iter();
        let choice = choices
            .next()
            .ok_or_else(|| Error::protocol("no choices"))?;

        let extra = choices.len();
        if extra > 0 {
            log::warn!(
                "Response has {} choices, only the first is used",
                extra + 1
            );
        }

        let message = choice
            .message
            .or(choice.delta)
            .ok_or_else(|| Error::protocol("no message"))?;

        self.transcript.push(message.clone());
        Ok((choice.finish_reason, message))
    }

    fn log(&self, kind: LogKind, payload: &str) {
        if let Some(logger) = &self.options.logger {
            logger.log(kind, payload);
        }
    }

    fn log_request(&self, request: &Request) {
        if self.options.logger.is_some() {
            match serde_json::to_string(request) {
                Ok(payload) => self.log(LogKind::Request, &payload),
                Err(e) => log::warn!("Failed to serialize request for logging: {}", e),
            }
        }
    }

    async fn send_single(&self, request: &Request) -> Result<Response> {
        self.log_request(request);

        let (body, content_type) = self.transport.send_single(request).await?;
        if media_type(&content_type) != "application/json" {
            return Err(Error::protocol(format!(
                "expected application/json, got {}",
                content_type
            )));
        }

        self.log(LogKind::Response, &body);
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_streaming(
        &self,
        request: &Request,
        deltas: Option<mpsc::Sender<String>>,
    ) -> Result<Response> {
        self.log_request(request);

        let (body, content_type) = self.transport.send_streaming(request).await?;
        if media_type(&content_type) != "text/event-stream" {
            return Err(Error::protocol(format!(
                "expected text/event-stream, got {}",
                content_type
            )));
        }

        let task = tokio::spawn(pump(body, deltas, self.options.logger.clone()));
        let accumulated = task
            .await
            .map_err(|e| Error::transport(format!("stream task failed: {}", e)))??;

        accumulated.ok_or_else(|| Error::protocol("stream ended without a response"))
    }
}
