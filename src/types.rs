//! Core types for the chat engine
//!
//! Two groups live here:
//!
//! - [`EngineOptions`] and its builder, the configuration a
//!   [`ConversationEngine`](crate::ConversationEngine) is created from.
//! - The chat-completions wire types ([`Request`], [`Response`], [`Message`],
//!   ...). They serialize to and from the OpenAI-compatible JSON format and
//!   double as the in-memory transcript representation.
//!
//! Every optional request field is omitted from the JSON when unset, so the
//! provider applies its own defaults.

use crate::logger::ExchangeLogger;
use crate::schema::ParamDescriptor;
use crate::tools::Tool;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// ENGINE OPTIONS
// ============================================================================

/// Endpoint used when no base URL is configured (OpenRouter).
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Options for configuring a conversation engine
#[derive(Clone)]
pub struct EngineOptions {
    /// Model identifier (e.g. "openai/gpt-4o-mini"). May be set later with
    /// [`ConversationEngine::set_model`](crate::ConversationEngine::set_model).
    pub model: Option<String>,

    /// OpenAI-compatible endpoint URL, without the `/chat/completions` suffix
    pub base_url: String,

    /// Bearer credential sent with every request
    pub api_key: String,

    /// Request timeout in seconds
    pub timeout: u64,

    /// Use the streaming endpoint for every turn
    pub stream: bool,

    /// Sampling knobs, all omitted from requests when unset
    pub sampling: SamplingParams,

    /// Explicit tool choice. Defaults to `auto` when tools are registered.
    pub tool_choice: Option<ToolChoice>,

    /// Provider routing preferences, passed through verbatim
    pub provider: Option<ProviderPreferences>,

    /// Prompt transforms applied by the provider
    pub transforms: Vec<String>,

    /// Fallback model list
    pub models: Vec<String>,

    /// Routing strategy for `models`
    pub route: Option<String>,

    /// Upper bound on tool-call rounds in a single exchange (unbounded when None)
    pub max_tool_rounds: Option<u32>,

    /// Tools the model may call
    pub tools: Vec<Tool>,

    /// Receives raw request and response payloads
    pub logger: Option<Arc<dyn ExchangeLogger>>,
}

impl std::fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineOptions")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .field("timeout", &self.timeout)
            .field("stream", &self.stream)
            .field("sampling", &self.sampling)
            .field("tool_choice", &self.tool_choice)
            .field("provider", &self.provider)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .field("tools", &format!("{} tools", self.tools.len()))
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            model: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            timeout: 60,
            stream: false,
            sampling: SamplingParams::default(),
            tool_choice: None,
            provider: None,
            transforms: Vec::new(),
            models: Vec::new(),
            route: None,
            max_tool_rounds: None,
            tools: Vec::new(),
            logger: None,
        }
    }
}

impl EngineOptions {
    /// Create a new builder for EngineOptions
    pub fn builder() -> EngineOptionsBuilder {
        EngineOptionsBuilder::default()
    }
}

/// Builder for EngineOptions
#[derive(Default)]
pub struct EngineOptionsBuilder {
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Option<u64>,
    stream: bool,
    sampling: SamplingParams,
    tool_choice: Option<ToolChoice>,
    provider: Option<ProviderPreferences>,
    transforms: Vec<String>,
    models: Vec<String>,
    route: Option<String>,
    max_tool_rounds: Option<u32>,
    tools: Vec<Tool>,
    logger: Option<Arc<dyn ExchangeLogger>>,
}

impl std::fmt::Debug for EngineOptionsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineOptionsBuilder")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("tools", &format!("{} tools", self.tools.len()))
            .finish()
    }
}

impl EngineOptionsBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.sampling.max_tokens = Some(tokens);
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.sampling.temperature = Some(temp);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.sampling.top_p = Some(top_p);
        self
    }

    pub fn top_k(mut self, top_k: u32) -> Self {
        self.sampling.top_k = Some(top_k);
        self
    }

    pub fn frequency_penalty(mut self, penalty: f32) -> Self {
        self.sampling.frequency_penalty = Some(penalty);
        self
    }

    pub fn presence_penalty(mut self, penalty: f32) -> Self {
        self.sampling.presence_penalty = Some(penalty);
        self
    }

    pub fn repetition_penalty(mut self, penalty: f32) -> Self {
        self.sampling.repetition_penalty = Some(penalty);
        self
    }

    pub fn seed(mut self, seed: i64) -> Self {
        self.sampling.seed = Some(seed);
        self
    }

    pub fn stop(mut self, sequence: impl Into<String>) -> Self {
        self.sampling.stop.push(sequence.into());
        self
    }

    pub fn logit_bias(mut self, token: impl Into<String>, bias: f32) -> Self {
        self.sampling
            .logit_bias
            .get_or_insert_with(HashMap::new)
            .insert(token.into(), bias);
        self
    }

    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn provider(mut self, provider: ProviderPreferences) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn transform(mut self, transform: impl Into<String>) -> Self {
        self.transforms.push(transform.into());
        self
    }

    pub fn fallback_model(mut self, model: impl Into<String>) -> Self {
        self.models.push(model.into());
        self
    }

    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = Some(rounds);
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn ExchangeLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> crate::Result<EngineOptions> {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if base_url.trim().is_empty() {
            return Err(crate::Error::config("base_url must not be empty"));
        }

        if let Some(model) = &self.model {
            if model.trim().is_empty() {
                return Err(crate::Error::config("model must not be empty"));
            }
        }

        let timeout = self.timeout.unwrap_or(60);
        if timeout == 0 {
            return Err(crate::Error::config("timeout must be greater than zero"));
        }

        if let Some(temperature) = self.sampling.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(crate::Error::config(format!(
                    "temperature must be between 0.0 and 2.0, got {}",
                    temperature
                )));
            }
        }

        if let Some(top_p) = self.sampling.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(crate::Error::config(format!(
                    "top_p must be between 0.0 and 1.0, got {}",
                    top_p
                )));
            }
        }

        if self.max_tool_rounds == Some(0) {
            return Err(crate::Error::config(
                "max_tool_rounds must be greater than zero",
            ));
        }

        Ok(EngineOptions {
            model: self.model,
            base_url,
            api_key: self.api_key.unwrap_or_default(),
            timeout,
            stream: self.stream,
            sampling: self.sampling,
            tool_choice: self.tool_choice,
            provider: self.provider,
            transforms: self.transforms,
            models: self.models,
            route: self.route,
            max_tool_rounds: self.max_tool_rounds,
            tools: self.tools,
            logger: self.logger,
        })
    }
}

// ============================================================================
// REQUEST
// ============================================================================

/// Sampling parameters. Unset values are left to the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SamplingParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<HashMap<String, f32>>,
}

/// Provider routing preferences
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderPreferences {
    /// Only route to providers that support every request parameter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_parameters: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_fallbacks: Option<bool>,
}

/// Requested output format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema { json_schema: JsonSchemaFormat },
}

impl ResponseFormat {
    /// Strict schema-constrained output described by `schema`.
    pub fn json_schema(schema: ParamDescriptor) -> Self {
        ResponseFormat::JsonSchema {
            json_schema: JsonSchemaFormat {
                name: "response".to_string(),
                strict: true,
                schema,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub strict: bool,
    pub schema: ParamDescriptor,
}

/// How the model may pick tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    /// Force a call to the named function
    Function(String),
}

impl Serialize for ToolChoice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ToolChoice::Auto => serializer.serialize_str("auto"),
            ToolChoice::None => serializer.serialize_str("none"),
            ToolChoice::Required => serializer.serialize_str("required"),
            ToolChoice::Function(name) => serde_json::json!({
                "type": "function",
                "function": {"name": name}
            })
            .serialize(serializer),
        }
    }
}

/// Chat-completions request body
#[derive(Debug, Clone, Default, Serialize)]
pub struct Request {
    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,

    #[serde(flatten)]
    pub sampling: SamplingParams,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,

    /// Tool advertisements in `{"type":"function","function":{...}}` form
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderPreferences>,
}

// ============================================================================
// MESSAGES
// ============================================================================

/// Message role in the conversation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    // Streaming deltas after the first omit the role.
    #[default]
    Assistant,
    Tool,
}

/// A message in the conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub role: Role,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Result of a tool invocation, answering the call with `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            ..Default::default()
        }
    }
}

/// A function call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Position within the message, used to merge streamed fragments
    #[serde(default, skip_serializing)]
    pub index: u32,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub id: String,

    #[serde(rename = "type", default = "function_type", deserialize_with = "null_as_function")]
    pub kind: String,

    #[serde(default)]
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            index: 0,
            id: id.into(),
            kind: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Function name plus raw argument text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,

    /// Opaque until decoded by the matching handler
    #[serde(default, deserialize_with = "null_as_empty")]
    pub arguments: String,
}

// ============================================================================
// RESPONSE
// ============================================================================

/// Chat-completions response, or one streamed fragment of it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub id: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub model: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub object: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub created: i64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<Choice>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDef>,

    /// Non-zero when the provider reports a failure in-band
    #[serde(default, skip_serializing_if = "is_zero", deserialize_with = "null_as_default")]
    pub code: i64,
}

impl Response {
    /// The failure the provider reported in-band, if any.
    ///
    /// A non-zero top-level `code` or a non-empty `error.message` counts; a
    /// numeric `error.code` is used when the top-level code is absent.
    pub fn reported_error(&self) -> Option<crate::Error> {
        let message = self
            .error
            .as_ref()
            .map(|e| e.message.as_str())
            .unwrap_or_default();
        let code = if self.code != 0 {
            self.code
        } else {
            self.error
                .as_ref()
                .and_then(|e| e.code.as_ref())
                .and_then(Value::as_i64)
                .unwrap_or(0)
        };

        if code == 0 && message.is_empty() {
            return None;
        }

        let message = if message.is_empty() {
            format!("error code {}", code)
        } else {
            message.to_string()
        };
        Some(crate::Error::model(code, message))
    }
}

/// One alternative completion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,

    /// Empty until the model signals completion
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "null_as_empty")]
    pub finish_reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Value>,
}

/// Token accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// In-band error object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDef {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub message: String,

    /// Numeric or symbolic, depending on the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
}

// ============================================================================
// SERDE HELPERS
// ============================================================================

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    null_as_default(deserializer)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_function<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(function_type))
}

fn function_type() -> String {
    "function".to_string()
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}
