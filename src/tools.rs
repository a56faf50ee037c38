//! # Tool System
//!
//! Tools are functions the model may ask to call. Each [`Tool`] carries a
//! name, a description, a [`ParamDescriptor`] advertising its arguments, and
//! an async handler. The [`ToolDispatcher`] owns the registered tools and
//! answers a model's `tool_calls` turn by running the matching handlers and
//! appending one `tool` message per call to the transcript.
//!
//! ## Handler Contract
//!
//! Handlers never fail the conversation. Whatever goes wrong inside one is
//! turned into a JSON error payload and sent back to the model as the tool
//! result, so the model can react to it:
//!
//! ```text
//! arguments do not decode  ->  {"error":"Invalid arguments"}
//! handler returns Err(e)   ->  {"error":"<e>"}
//! ```
//!
//! Only a call naming a tool that was never registered aborts the exchange.
//!
//! ## Defining Tools
//!
//! Untyped, with the builder:
//!
//! ```rust,no_run
//! use chat_engine::schema::Shape;
//! use chat_engine::tool;
//! use serde_json::json;
//!
//! let add = tool("add", "Add two numbers")
//!     .param("a", Shape::Number)
//!     .param("b", Shape::Number)
//!     .build(|args| async move {
//!         let a = args["a"].as_f64().unwrap_or(0.0);
//!         let b = args["b"].as_f64().unwrap_or(0.0);
//!         Ok(json!({"result": a + b}))
//!     });
//! ```
//!
//! Typed, with the parameter descriptor derived from the argument type:
//!
//! ```rust,no_run
//! use chat_engine::schema::{Described, Field, Shape};
//! use chat_engine::Tool;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Lookup {
//!     city: String,
//! }
//!
//! impl Described for Lookup {
//!     fn shape() -> Shape {
//!         Shape::record([Field::required("city", Shape::String)])
//!     }
//! }
//!
//! let weather = Tool::typed("weather", "Current temperature for a city", |args: Lookup| async move {
//!     Ok(format!("21C in {}", args.city))
//! });
//! ```

use crate::schema::{Described, Field, ParamDescriptor, Shape, derive};
use crate::types::{Message, ToolCall};
use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Payload returned to the model when a call's arguments cannot be decoded.
pub const INVALID_ARGUMENTS: &str = r#"{"error":"Invalid arguments"}"#;

/// Future returned by a [`ToolHandler`].
pub type ToolFuture = Pin<Box<dyn Future<Output = String> + Send>>;

/// Type-erased handler: raw argument text in, encoded result text out.
pub type ToolHandler = Arc<dyn Fn(String) -> ToolFuture + Send + Sync>;

/// Tool definition for OpenAI-compatible function calling.
///
/// Cloning is cheap; the handler is shared behind an [`Arc`].
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    parameters: ParamDescriptor,
    handler: ToolHandler,
}

impl Tool {
    /// Create a tool whose handler works on untyped JSON.
    ///
    /// Empty argument text is treated as `{}`. An `Err` from the handler is
    /// encoded as `{"error": "<message>"}`.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParamDescriptor,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self::from_handler(
            name,
            description,
            parameters,
            Arc::new(move |arguments: String| -> ToolFuture {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    match decode_arguments::<Value>(&arguments) {
                        Some(args) => encode((*handler)(args).await),
                        None => INVALID_ARGUMENTS.to_string(),
                    }
                })
            }),
        )
    }

    /// Create a tool with typed arguments and result.
    ///
    /// The parameter descriptor is derived from `A`. Arguments that do not
    /// deserialize into `A` produce [`INVALID_ARGUMENTS`] without calling the
    /// handler. String results are sent as-is, anything else as JSON.
    pub fn typed<A, R, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        A: DeserializeOwned + Described + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self::from_handler(
            name,
            description,
            A::descriptor(),
            Arc::new(move |arguments: String| -> ToolFuture {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let Some(args) = decode_arguments::<A>(&arguments) else {
                        return INVALID_ARGUMENTS.to_string();
                    };
                    match (*handler)(args).await {
                        Ok(result) => match serde_json::to_value(result) {
                            Ok(Value::String(text)) => text,
                            Ok(value) => value.to_string(),
                            Err(e) => encode(Err(e.into())),
                        },
                        Err(e) => encode(Err(e)),
                    }
                })
            }),
        )
    }

    /// Create a tool from an already type-erased handler.
    pub fn from_handler(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParamDescriptor,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
        }
    }

    /// Run the handler on raw argument text and return the encoded result.
    pub async fn call(&self, arguments: &str) -> String {
        (self.handler)(arguments.to_string()).await
    }

    /// The `{"type":"function","function":{...}}` advertisement for requests.
    pub fn to_openai_format(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters
            }
        })
    }

    /// Returns the tool's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tool's description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the tool's parameter descriptor.
    pub fn parameters(&self) -> &ParamDescriptor {
        &self.parameters
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish()
    }
}

fn decode_arguments<A: DeserializeOwned>(arguments: &str) -> Option<A> {
    let arguments = arguments.trim();
    let arguments = if arguments.is_empty() { "{}" } else { arguments };
    match serde_json::from_str(arguments) {
        Ok(args) => Some(args),
        Err(e) => {
            log::debug!("Tool arguments did not decode: {}", e);
            None
        }
    }
}

fn encode(result: Result<Value>) -> String {
    match result {
        Ok(value) => value.to_string(),
        Err(e) => json!({"error": e.to_string()}).to_string(),
    }
}

/// Builder for untyped tools.
///
/// Parameters are declared as record fields, in order:
///
/// ```rust
/// use chat_engine::schema::{Field, Shape};
/// use chat_engine::ToolBuilder;
///
/// let tool = ToolBuilder::new("search", "Search the docs")
///     .param("query", Shape::String)
///     .optional_param("limit", Shape::Integer)
///     .field(Field::optional("tags", Shape::array(Shape::String)).describe("Filter by tag"))
///     .build(|_| async { Ok(serde_json::json!([])) });
///
/// assert_eq!(tool.parameters().required, vec!["query".to_string()]);
/// ```
pub struct ToolBuilder {
    name: String,
    description: String,
    fields: Vec<Field>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fields: Vec::new(),
        }
    }

    /// Add a required parameter.
    pub fn param(self, name: &str, shape: Shape) -> Self {
        self.field(Field::required(name, shape))
    }

    /// Add a parameter the model may omit.
    pub fn optional_param(self, name: &str, shape: Shape) -> Self {
        self.field(Field::optional(name, shape))
    }

    /// Add a fully specified parameter.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let parameters = derive(&Shape::Record(self.fields));
        Tool::new(self.name, self.description, parameters, handler)
    }
}

/// Create a tool using the builder pattern.
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Registry of tools keyed by unique name.
#[derive(Clone, Default)]
pub struct ToolDispatcher {
    tools: Vec<Tool>,
    by_name: HashMap<String, usize>,
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tools.iter().map(|t| t.name()))
            .finish()
    }
}

impl ToolDispatcher {
    /// Register every tool. Duplicate names are a configuration error.
    pub fn new(tools: impl IntoIterator<Item = Tool>) -> Result<Self> {
        let mut dispatcher = Self::default();
        for tool in tools {
            dispatcher.register(tool)?;
        }
        Ok(dispatcher)
    }

    /// Add one tool. Fails without changing the registry if the name is
    /// already taken.
    pub fn register(&mut self, tool: Tool) -> Result<()> {
        if self.by_name.contains_key(tool.name()) {
            return Err(Error::config(format!(
                "duplicate tool name: {}",
                tool.name()
            )));
        }
        self.by_name.insert(tool.name().to_string(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Look up a tool by its exact name.
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true when no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Advertisements for every registered tool, in registration order.
    pub fn definitions(&self) -> Vec<Value> {
        self.tools.iter().map(Tool::to_openai_format).collect()
    }

    /// Run `calls` in order, appending one tool-result message per call.
    ///
    /// Every name is resolved before anything runs: a call to an unknown
    /// tool fails the whole batch and leaves `transcript` untouched.
    pub async fn dispatch(&self, calls: &[ToolCall], transcript: &mut Vec<Message>) -> Result<()> {
        let resolved = calls
            .iter()
            .map(|call| {
                self.get(&call.function.name)
                    .map(|tool| (call, tool))
                    .ok_or_else(|| {
                        Error::tool(format!("unknown function: {}", call.function.name))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        for (call, tool) in resolved {
            log::debug!("Calling tool {} ({})", tool.name(), call.id);
            let result = tool.call(&call.function.arguments).await;
            transcript.push(Message::tool_result(call.id.clone(), result));
        }

        Ok(())
    }
}
