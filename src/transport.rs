//! Transport boundary.
//!
//! The engine never talks HTTP directly. It hands a [`Request`] to a
//! [`Transport`] and gets back either a complete body or a stream of raw
//! bytes, each paired with the response's `Content-Type`. Checking that
//! content type, parsing and merging all happen on the engine side.
//!
//! [`HttpTransport`] is the default implementation, POSTing to
//! `{base_url}/chat/completions` with `reqwest`. Tests and alternative
//! backends implement the trait themselves.

use crate::types::{EngineOptions, Request};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::pin::Pin;
use std::time::Duration;

/// Raw response body, chunked as it arrives.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Sends chat-completions requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a non-streaming request. Returns the full body and its content type.
    async fn send_single(&self, request: &Request) -> Result<(String, String)>;

    /// Send a streaming request. Returns the body as a byte stream and its
    /// content type. Dropping the stream releases the connection.
    async fn send_streaming(&self, request: &Request) -> Result<(ByteStream, String)>;
}

/// `reqwest`-backed transport for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .finish()
    }
}

impl HttpTransport {
    /// Create a transport for `base_url`. The timeout covers the whole
    /// request, body included.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_options(options: &EngineOptions) -> Result<Self> {
        Self::new(
            options.base_url.clone(),
            options.api_key.clone(),
            Duration::from_secs(options.timeout),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn post(&self, request: &Request, accept: &str) -> Result<reqwest::Response> {
        let mut builder = self
            .http_client
            .post(self.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, accept);

        if !self.api_key.is_empty() {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", self.api_key));
        }

        let response = builder.json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|e| {
                log::warn!("Failed to read error response body: {}", e);
                "Unknown error (failed to read response body)".to_string()
            });
            return Err(Error::transport(format!("API error {}: {}", status, body)));
        }

        Ok(response)
    }
}

fn content_type(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_single(&self, request: &Request) -> Result<(String, String)> {
        let response = self.post(request, "application/json").await?;
        let content_type = content_type(&response);
        let body = response.text().await?;
        Ok((body, content_type))
    }

    async fn send_streaming(&self, request: &Request) -> Result<(ByteStream, String)> {
        let response = self
            .post(request, "application/json, text/event-stream")
            .await?;
        let content_type = content_type(&response);
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(Error::from));
        Ok((Box::pin(body), content_type))
    }
}

/// Media type without parameters, lowercased: `Text/Event-Stream; charset=utf-8`
/// becomes `text/event-stream`.
pub(crate) fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> Request {
        Request {
            messages: vec![Message::user("2+2?")],
            model: "m".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_media_type() {
        assert_eq!(media_type("application/json"), "application/json");
        assert_eq!(
            media_type("Text/Event-Stream; charset=utf-8"),
            "text/event-stream"
        );
        assert_eq!(media_type(""), "");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let transport =
            HttpTransport::new("https://openrouter.ai/api/v1/", "k", Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            transport.endpoint(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let transport =
            HttpTransport::new("http://localhost", "sk-secret", Duration::from_secs(5)).unwrap();
        assert!(!format!("{:?}", transport).contains("sk-secret"));
    }

    #[tokio::test]
    async fn test_send_single() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("accept", "application/json"))
            .and(body_partial_json(serde_json::json!({"model": "m"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"{"choices":[]}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(
            format!("{}/v1", server.uri()),
            "sk-test",
            Duration::from_secs(5),
        )
        .unwrap();

        let (body, content_type) = transport.send_single(&request()).await.unwrap();
        assert_eq!(body, r#"{"choices":[]}"#);
        assert_eq!(media_type(&content_type), "application/json");
    }

    #[tokio::test]
    async fn test_send_streaming_yields_body_bytes() {
        let server = MockServer::start().await;
        let sse = "data: {\"choices\":[]}\n\ndata: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri(), "", Duration::from_secs(5)).unwrap();
        let (mut stream, content_type) = transport.send_streaming(&request()).await.unwrap();

        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend(chunk.unwrap());
        }
        assert_eq!(String::from_utf8(body).unwrap(), sse);
        assert_eq!(media_type(&content_type), "text/event-stream");
    }

    #[tokio::test]
    async fn test_error_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri(), "bad", Duration::from_secs(5)).unwrap();
        let err = transport.send_single(&request()).await.unwrap_err();

        assert!(err.is_transport());
        let message = err.to_string();
        assert!(message.contains("401"), "got: {}", message);
        assert!(message.contains("invalid key"), "got: {}", message);
    }
}
