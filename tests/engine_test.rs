//! Integration tests for the conversation turn loop
//!
//! The engine runs against a scripted transport, so every test sees exactly
//! the requests it produced and the replies it was fed.

mod common;

use chat_engine::schema::{Described, Field, Shape};
use chat_engine::{
    ConversationEngine, EngineOptions, EngineState, Error, ExchangeLogger, LogKind,
    ObjectDecoder, ResponseFormat, Role, SchemaDecoder, TextDecoder, Tool, ToolChoice, tool,
};
use common::{Reply, ScriptedTransport, completion, tool_call_completion};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn scripted(
    options: EngineOptions,
    replies: Vec<Reply>,
) -> (ConversationEngine, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::new(replies));
    let engine =
        ConversationEngine::with_transport(options, transport.clone(), TextDecoder).unwrap();
    (engine, transport)
}

fn options() -> EngineOptions {
    EngineOptions::builder().model("m").build().unwrap()
}

#[derive(Debug, Deserialize)]
struct WeatherArgs {
    city: String,
}

impl Described for WeatherArgs {
    fn shape() -> Shape {
        Shape::record([Field::required("city", Shape::String).describe("City name")])
    }
}

fn weather_tool(calls: Arc<AtomicUsize>) -> Tool {
    Tool::typed(
        "get_weather",
        "Current weather for a city",
        move |args: WeatherArgs| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"city": args.city, "celsius": 21}))
            }
        },
    )
}

#[tokio::test]
async fn test_single_turn_text_answer() {
    let (mut engine, transport) = scripted(options(), vec![Reply::json(completion("4", "stop"))]);
    engine.user("2+2?");

    let answer = engine.advance_turn().await.unwrap();

    assert_eq!(answer, "4");
    assert_eq!(engine.state(), EngineState::Done);

    let transcript = engine.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].role, Role::User);
    assert_eq!(transcript[1].role, Role::Assistant);
    assert_eq!(transcript[1].content, "4");

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "m");
    assert_eq!(requests[0].messages.len(), 1);
}

#[tokio::test]
async fn test_tool_round_then_stop() {
    let calls = Arc::new(AtomicUsize::new(0));
    let options = EngineOptions::builder()
        .model("m")
        .tool(weather_tool(calls.clone()))
        .build()
        .unwrap();

    let (mut engine, transport) = scripted(
        options,
        vec![
            Reply::json(tool_call_completion(&[(
                "call_1",
                "get_weather",
                r#"{"city":"Paris"}"#,
            )])),
            Reply::json(completion("It is 21C in Paris.", "stop")),
        ],
    );
    engine.user("Weather in Paris?");

    let answer = engine.advance_turn().await.unwrap();
    assert_eq!(answer, "It is 21C in Paris.");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // user, assistant tool call, tool result, final assistant
    let transcript = engine.transcript();
    assert_eq!(transcript.len(), 4);
    assert_eq!(transcript[1].tool_calls.len(), 1);
    assert_eq!(transcript[2].role, Role::Tool);
    assert_eq!(transcript[2].tool_call_id.as_deref(), Some("call_1"));
    let result: serde_json::Value = serde_json::from_str(&transcript[2].content).unwrap();
    assert_eq!(result, json!({"city": "Paris", "celsius": 21}));
    assert_eq!(transcript[3].content, "It is 21C in Paris.");

    // The second request carries the tool exchange back to the model.
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tool_choice, Some(ToolChoice::Auto));
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0]["function"]["name"], "get_weather");
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(requests[1].messages[2].role, Role::Tool);
}

#[tokio::test]
async fn test_multiple_tool_calls_answered_in_order() {
    let calls = Arc::new(AtomicUsize::new(0));
    let options = EngineOptions::builder()
        .model("m")
        .tool(weather_tool(calls.clone()))
        .build()
        .unwrap();

    let (mut engine, _) = scripted(
        options,
        vec![
            Reply::json(tool_call_completion(&[
                ("call_a", "get_weather", r#"{"city":"Oslo"}"#),
                ("call_b", "get_weather", r#"{"town":"Lima"}"#),
            ])),
            Reply::json(completion("done", "stop")),
        ],
    );
    engine.user("Compare");

    engine.advance_turn().await.unwrap();

    // The second call had bad arguments: the handler never ran, but the
    // model still gets an answer for it.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let transcript = engine.transcript();
    assert_eq!(transcript[2].tool_call_id.as_deref(), Some("call_a"));
    assert_eq!(transcript[3].tool_call_id.as_deref(), Some("call_b"));
    assert_eq!(transcript[3].content, chat_engine::INVALID_ARGUMENTS);
}

#[tokio::test]
async fn test_unknown_finish_reason() {
    let (mut engine, _) = scripted(
        options(),
        vec![Reply::json(completion("The answer is", "length"))],
    );
    engine.user("Long question");

    let err = engine.advance_turn().await.unwrap_err();

    assert!(matches!(err, Error::Protocol(_)));
    assert!(err.to_string().contains("length"));
    assert_eq!(engine.state(), EngineState::Failed);
    assert_eq!(engine.transcript().len(), 2);
    assert_eq!(engine.transcript()[1].content, "The answer is");
}

#[tokio::test]
async fn test_unknown_tool_aborts() {
    let (mut engine, transport) = scripted(
        options(),
        vec![
            Reply::json(tool_call_completion(&[("call_1", "rm_rf", "{}")])),
            Reply::json(completion("unreachable", "stop")),
        ],
    );
    engine.user("clean up");

    let err = engine.advance_turn().await.unwrap_err();

    assert!(matches!(err, Error::Tool(_)));
    assert!(err.to_string().contains("rm_rf"));
    assert_eq!(engine.transcript().len(), 2);
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_tool_round_limit() {
    let calls = Arc::new(AtomicUsize::new(0));
    let options = EngineOptions::builder()
        .model("m")
        .max_tool_rounds(1)
        .tool(weather_tool(calls.clone()))
        .build()
        .unwrap();
    let ask = || {
        Reply::json(tool_call_completion(&[(
            "call",
            "get_weather",
            r#"{"city":"Rome"}"#,
        )]))
    };

    let (mut engine, _) = scripted(options, vec![ask(), ask()]);
    engine.user("loop forever");

    let err = engine.advance_turn().await.unwrap_err();
    assert!(matches!(err, Error::Tool(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_engine_is_reusable_after_done() {
    let (mut engine, transport) = scripted(
        options(),
        vec![
            Reply::json(completion("4", "stop")),
            Reply::json(completion("8", "stop")),
        ],
    );

    engine.user("2+2?");
    assert_eq!(engine.advance_turn().await.unwrap(), "4");

    engine.user("Double it.");
    assert_eq!(engine.advance_turn().await.unwrap(), "8");

    assert_eq!(engine.transcript().len(), 4);
    assert_eq!(transport.requests()[1].messages.len(), 3);
}

#[tokio::test]
async fn test_transport_error_propagates() {
    let (mut engine, _) = scripted(options(), vec![]);
    engine.user("hello?");

    let err = engine.advance_turn().await.unwrap_err();
    assert!(err.is_transport());
    assert_eq!(engine.transcript().len(), 1);
}

#[tokio::test]
async fn test_invalid_json_body() {
    let (mut engine, _) = scripted(
        options(),
        vec![Reply::raw(vec!["{\"choices\": ["], "application/json")],
    );
    engine.user("hi");

    assert!(engine.advance_turn().await.unwrap_err().is_protocol());
}

// ============================================================================
// STRUCTURED RESULTS
// ============================================================================

#[derive(Debug, Deserialize, PartialEq)]
struct Person {
    name: String,
    age: Option<u32>,
}

impl Described for Person {
    fn shape() -> Shape {
        Shape::record([
            Field::required("name", Shape::String),
            Field::optional("age", Shape::Integer),
        ])
    }
}

#[tokio::test]
async fn test_schema_constrained_result() {
    let transport = Arc::new(ScriptedTransport::new(vec![Reply::json(completion(
        r#"{"name": "Ada Lovelace", "age": 36}"#,
        "stop",
    ))]));
    let mut engine = ConversationEngine::with_transport(
        options(),
        transport.clone(),
        SchemaDecoder::<Person>::new(),
    )
    .unwrap();
    engine.user("Who wrote the first algorithm?");

    let person = engine.advance_turn().await.unwrap();
    assert_eq!(
        person,
        Person {
            name: "Ada Lovelace".to_string(),
            age: Some(36)
        }
    );

    let format = serde_json::to_value(transport.requests()[0].response_format.as_ref().unwrap())
        .unwrap();
    assert_eq!(
        format,
        json!({
            "type": "json_schema",
            "json_schema": {
                "name": "response",
                "strict": true,
                "schema": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "age": {"type": "integer"}
                    },
                    "required": ["name"],
                    "additionalProperties": false
                }
            }
        })
    );
}

#[tokio::test]
async fn test_schema_result_decode_failure() {
    let transport = Arc::new(ScriptedTransport::new(vec![Reply::json(completion(
        "Ada Lovelace",
        "stop",
    ))]));
    let mut engine =
        ConversationEngine::with_transport(options(), transport, SchemaDecoder::<Person>::new())
            .unwrap();
    engine.user("Who?");

    let err = engine.advance_turn().await.unwrap_err();
    assert!(err.is_protocol());
    assert_eq!(engine.state(), EngineState::Failed);
    assert_eq!(engine.transcript().len(), 2);
}

#[tokio::test]
async fn test_object_response_downgrade() {
    let transport = Arc::new(ScriptedTransport::new(vec![Reply::json(completion(
        r#"{"name": "Grace"}"#,
        "stop",
    ))]));
    let mut engine = ConversationEngine::with_transport(
        options(),
        transport.clone(),
        SchemaDecoder::<Person>::new(),
    )
    .unwrap();
    engine.set_object_response();
    engine.user("Who?");

    let person = engine.advance_turn().await.unwrap();
    assert_eq!(person.name, "Grace");
    assert_eq!(
        transport.requests()[0].response_format,
        Some(ResponseFormat::JsonObject)
    );
}

#[tokio::test]
async fn test_object_decoder() {
    let transport = Arc::new(ScriptedTransport::new(vec![Reply::json(completion(
        r#"{"tags": ["a", "b"]}"#,
        "stop",
    ))]));
    let mut engine =
        ConversationEngine::with_transport(options(), transport, ObjectDecoder).unwrap();
    engine.user("tags?");

    let object = engine.advance_turn().await.unwrap();
    assert_eq!(object["tags"], json!(["a", "b"]));
}

// ============================================================================
// LOGGING
// ============================================================================

#[derive(Default)]
struct Recorder(Mutex<Vec<LogKind>>);

impl ExchangeLogger for Recorder {
    fn log(&self, kind: LogKind, _payload: &str) {
        self.0.lock().unwrap().push(kind);
    }
}

#[tokio::test]
async fn test_logger_sees_request_and_response() {
    let recorder = Arc::new(Recorder::default());
    let options = EngineOptions::builder()
        .model("m")
        .logger(recorder.clone())
        .build()
        .unwrap();
    let (mut engine, _) = scripted(options, vec![Reply::json(completion("4", "stop"))]);
    engine.user("2+2?");
    engine.advance_turn().await.unwrap();

    assert_eq!(
        *recorder.0.lock().unwrap(),
        vec![LogKind::Request, LogKind::Response]
    );
}

#[test]
fn test_tool_built_with_builder_is_callable() {
    let echo = tool("echo", "Echo text")
        .param("text", Shape::String)
        .build(|args| async move { Ok(args["text"].clone()) });

    let options = EngineOptions::builder()
        .model("m")
        .tool(echo)
        .build()
        .unwrap();

    assert_eq!(options.tools.len(), 1);
    assert_eq!(options.tools[0].name(), "echo");

    let echoed = tokio_test::block_on(options.tools[0].call(r#"{"text":"ping"}"#));
    assert_eq!(echoed, "\"ping\"");
}

#[test]
fn test_default_base_url_when_unset() {
    let options = EngineOptions::builder().model("m").build().unwrap();
    assert_eq!(options.base_url, chat_engine::DEFAULT_BASE_URL);

    let local = EngineOptions::builder()
        .model("m")
        .base_url("http://localhost:11434/v1")
        .build()
        .unwrap();
    assert_eq!(local.base_url, "http://localhost:11434/v1");
}
