//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chat_engine::{ByteStream, Error, Request, Result, Transport};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One queued transport reply: body chunks plus content type.
pub struct Reply {
    pub chunks: Vec<String>,
    pub content_type: String,
}

impl Reply {
    /// Complete JSON body.
    pub fn json(body: Value) -> Self {
        Self {
            chunks: vec![body.to_string()],
            content_type: "application/json".to_string(),
        }
    }

    /// Event stream with one `data:` frame per fragment, closed by `[DONE]`.
    /// Each frame arrives as its own chunk.
    pub fn sse(fragments: Vec<Value>) -> Self {
        let mut chunks: Vec<String> = fragments
            .into_iter()
            .map(|f| format!("data: {}\n\n", f))
            .collect();
        chunks.push("data: [DONE]\n\n".to_string());
        Self {
            chunks,
            content_type: "text/event-stream".to_string(),
        }
    }

    pub fn raw(chunks: Vec<&str>, content_type: &str) -> Self {
        Self {
            chunks: chunks.into_iter().map(String::from).collect(),
            content_type: content_type.to_string(),
        }
    }
}

/// Queue-based transport. Each send pops the next reply and records the
/// request it was given.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &Request) -> Result<Reply> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::transport("no scripted reply left"))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_single(&self, request: &Request) -> Result<(String, String)> {
        let reply = self.next(request)?;
        Ok((reply.chunks.concat(), reply.content_type))
    }

    async fn send_streaming(&self, request: &Request) -> Result<(ByteStream, String)> {
        let reply = self.next(request)?;
        let chunks: Vec<Result<Vec<u8>>> = reply
            .chunks
            .into_iter()
            .map(|c| Ok(c.into_bytes()))
            .collect();
        Ok((Box::pin(tokio_stream::iter(chunks)), reply.content_type))
    }
}

/// Non-streaming completion with a single assistant message.
pub fn completion(content: &str, finish_reason: &str) -> Value {
    json!({
        "id": "gen-1",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "m",
        "choices": [{
            "index": 0,
            "finish_reason": finish_reason,
            "message": {"role": "assistant", "content": content}
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6}
    })
}

/// Non-streaming completion asking for the given `(id, name, arguments)` calls.
pub fn tool_call_completion(calls: &[(&str, &str, &str)]) -> Value {
    let tool_calls: Vec<Value> = calls
        .iter()
        .map(|(id, name, arguments)| {
            json!({
                "id": id,
                "type": "function",
                "function": {"name": name, "arguments": arguments}
            })
        })
        .collect();

    json!({
        "id": "gen-1",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "m",
        "choices": [{
            "index": 0,
            "finish_reason": "tool_calls",
            "message": {"role": "assistant", "content": null, "tool_calls": tool_calls}
        }]
    })
}

/// Streaming fragment carrying `delta`.
pub fn chunk(delta: Value, finish_reason: Option<&str>) -> Value {
    json!({
        "id": "gen-1",
        "object": "chat.completion.chunk",
        "created": 1700000000,
        "model": "m",
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
    })
}
