// OpenAI Chat Completions client with a single model-to-model fallback.
//
// Every engine goes through the `ChatProvider` trait so tests can swap in a
// scripted provider. `LlmClient` is what the server wires up: an active
// OpenAI client, or a disabled stub when no key is configured.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use eloquas_core::config::{non_empty, Config};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM not configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("response contained no message content")]
    EmptyResponse,

    #[error("invalid JSON in model output: {0}")]
    InvalidJson(String),
}

impl LlmError {
    /// Whether a second model is worth trying. Missing or rejected
    /// credentials fail the same way on every model.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::NotConfigured => false,
            LlmError::Status { status, .. } => *status != 401 && *status != 403,
            _ => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    /// Overrides the client's default model for this request.
    pub model: Option<String>,
    pub json_mode: bool,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    /// A JSON-mode request with the client's default model.
    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            model: None,
            json_mode: true,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    /// Model that actually produced the answer.
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub used_fallback: bool,
}

/// Anything that can answer a chat request.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;
}

// ---------------------------------------------------------------------------
// OpenAiClient
// ---------------------------------------------------------------------------

/// Settings that shape every request made by [`OpenAiClient`].
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub model: String,
    pub fallback_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    settings: OpenAiSettings,
}

impl OpenAiClient {
    pub fn new(api_key: String, settings: OpenAiSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("failed to build HTTP client with timeout, using defaults: {e}");
                reqwest::Client::new()
            });
        Self {
            http,
            api_key,
            settings,
        }
    }

    pub fn default_model(&self) -> &str {
        &self.settings.model
    }

    /// Send one request to one model.
    async fn send(&self, model: &str, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::NotConfigured);
        }

        let body = request_body(model, request, &self.settings);
        let url = format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'));
        debug!(model, json_mode = request.json_mode, "sending chat completion");

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                message: parse_error_message(&text).unwrap_or_else(|| truncate(&text, 200)),
            });
        }

        let parsed = parse_completion(&text).ok_or(LlmError::EmptyResponse)?;
        debug!(
            model = %parsed.model,
            prompt_tokens = parsed.prompt_tokens,
            completion_tokens = parsed.completion_tokens,
            "chat completion finished"
        );
        Ok(ChatResponse {
            content: parsed.content,
            model: if parsed.model.is_empty() {
                model.to_string()
            } else {
                parsed.model
            },
            prompt_tokens: parsed.prompt_tokens,
            completion_tokens: parsed.completion_tokens,
            used_fallback: false,
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    /// Try the requested (or default) model, then retry once with the
    /// fallback model. No backoff.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let primary = request
            .model
            .as_deref()
            .unwrap_or(self.settings.model.as_str())
            .to_string();
        let fallback = self.settings.fallback_model.as_str();

        match self.send(&primary, request).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_retryable() && !fallback.is_empty() && fallback != primary => {
                warn!(primary = %primary, fallback, "model call failed, retrying with fallback: {e}");
                let mut response = self.send(fallback, request).await?;
                response.used_fallback = true;
                Ok(response)
            }
            Err(e) => Err(e),
        }
    }
}

/// Reasoning models reject `temperature`/`max_tokens` and use
/// `max_completion_tokens`.
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("o1") || model.starts_with("o3") || model.starts_with("o4")
}

pub(crate) fn request_body(model: &str, request: &ChatRequest, settings: &OpenAiSettings) -> Value {
    let max_tokens = request.max_tokens.unwrap_or(settings.max_tokens);
    let mut body = json!({
        "model": model,
        "messages": [
            { "role": "system", "content": request.system },
            { "role": "user", "content": request.user }
        ]
    });
    if is_reasoning_model(model) {
        body["max_completion_tokens"] = json!(max_tokens);
    } else {
        body["max_tokens"] = json!(max_tokens);
        body["temperature"] = json!(request.temperature.unwrap_or(settings.temperature));
    }
    if request.json_mode {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

// ---------------------------------------------------------------------------
// LlmClient wrapper
// ---------------------------------------------------------------------------

/// High-level wrapper that can be either an active OpenAI client or disabled.
pub enum LlmClient {
    /// OpenAI is configured and ready.
    Active(OpenAiClient),
    /// LLM functionality is disabled (no API key configured).
    Disabled,
}

impl LlmClient {
    /// Build an `LlmClient` from the application config.
    ///
    /// Returns `Active` if an API key is present in credentials, otherwise
    /// returns `Disabled`.
    pub fn from_config(config: &Config) -> Self {
        match non_empty(&config.credentials.openai_api_key) {
            Some(key) => LlmClient::Active(OpenAiClient::new(
                key.to_string(),
                OpenAiSettings {
                    base_url: config.llm.base_url.clone(),
                    model: config.llm.model.clone(),
                    fallback_model: config.llm.fallback_model.clone(),
                    temperature: config.llm.temperature,
                    max_tokens: config.llm.max_tokens,
                    timeout: Duration::from_secs(config.llm.timeout_secs),
                },
            )),
            None => LlmClient::Disabled,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, LlmClient::Active(_))
    }
}

#[async_trait]
impl ChatProvider for LlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        match self {
            LlmClient::Active(client) => client.complete(request).await,
            LlmClient::Disabled => Err(LlmError::NotConfigured),
        }
    }
}

// ---------------------------------------------------------------------------
// Response parsing helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedCompletion {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Extract the first choice's message content plus usage from a chat
/// completion body.
///
/// Expected shape: `{ "model": "...", "choices": [{ "message": { "content": "..." } }],
/// "usage": { "prompt_tokens": N, "completion_tokens": N } }`
pub(crate) fn parse_completion(data: &str) -> Option<ParsedCompletion> {
    let v: Value = serde_json::from_str(data).ok()?;
    let content = v
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()?
        .to_string();
    if content.trim().is_empty() {
        return None;
    }
    let usage = v.get("usage");
    let token_count = |field: &str| {
        usage
            .and_then(|u| u.get(field))
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or(0)
    };
    Some(ParsedCompletion {
        content,
        model: v
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        prompt_tokens: token_count("prompt_tokens"),
        completion_tokens: token_count("completion_tokens"),
    })
}

/// Extract `error.message` from an API error body.
pub(crate) fn parse_error_message(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("error")?
        .get("message")?
        .as_str()
        .map(|s| s.to_string())
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn settings(base_url: &str) -> OpenAiSettings {
        OpenAiSettings {
            base_url: base_url.to_string(),
            model: "o1-pro".to_string(),
            fallback_model: "gpt-4o".to_string(),
            temperature: 0.7,
            max_tokens: 800,
            timeout: Duration::from_secs(5),
        }
    }

    fn completion_body(model: &str, content: &str) -> String {
        json!({
            "id": "chatcmpl-1",
            "model": model,
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 34 }
        })
        .to_string()
    }

    /// Serve one canned HTTP response per incoming connection, in order, and
    /// hand back the request bodies that were received.
    async fn serve(responses: Vec<(u16, String)>) -> (SocketAddr, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut bodies = Vec::new();
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                bodies.push(read_request_body(&mut socket).await);
                let reason = if status == 200 { "OK" } else { "Error" };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
            }
            bodies
        });
        (addr, handle)
    }

    async fn read_request_body(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    return String::from_utf8_lossy(&buf[header_end + 4..]).to_string();
                }
            }
        }
        String::new()
    }

    // -- parsing helpers --

    #[test]
    fn parse_completion_extracts_content_and_usage() {
        let parsed = parse_completion(&completion_body("gpt-4o", "{\"ok\":true}")).unwrap();
        assert_eq!(parsed.content, "{\"ok\":true}");
        assert_eq!(parsed.model, "gpt-4o");
        assert_eq!(parsed.prompt_tokens, 12);
        assert_eq!(parsed.completion_tokens, 34);
    }

    #[test]
    fn parse_completion_rejects_empty_or_missing_content() {
        assert!(parse_completion(&completion_body("gpt-4o", "   ")).is_none());
        assert!(parse_completion(r#"{"choices": []}"#).is_none());
        assert!(parse_completion("not json").is_none());
    }

    #[test]
    fn parse_completion_tolerates_missing_usage() {
        let body = r#"{"choices":[{"message":{"content":"hi"}}]}"#;
        let parsed = parse_completion(body).unwrap();
        assert_eq!(parsed.prompt_tokens, 0);
        assert_eq!(parsed.model, "");
    }

    #[test]
    fn parse_error_message_reads_nested_message() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
        assert_eq!(parse_error_message(body).as_deref(), Some("Rate limit reached"));
        assert_eq!(parse_error_message("{}"), None);
    }

    #[test]
    fn reasoning_models_use_completion_token_budget() {
        let req = ChatRequest::json("sys", "user");
        let body = request_body("o1-pro", &req, &settings("http://x"));
        assert_eq!(body["max_completion_tokens"], 800);
        assert!(body.get("temperature").is_none());
        assert_eq!(body["response_format"]["type"], "json_object");

        let body = request_body("gpt-4o", &req.clone().with_temperature(0.2), &settings("http://x"));
        assert_eq!(body["max_tokens"], 800);
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn plain_requests_omit_response_format() {
        let mut req = ChatRequest::json("sys", "user");
        req.json_mode = false;
        let body = request_body("gpt-4o", &req, &settings("http://x"));
        assert!(body.get("response_format").is_none());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
    }

    #[test]
    fn auth_failures_are_not_retried() {
        let unauthorized = LlmError::Status {
            status: 401,
            message: "bad key".into(),
        };
        let server_error = LlmError::Status {
            status: 500,
            message: "boom".into(),
        };
        assert!(!unauthorized.is_retryable());
        assert!(server_error.is_retryable());
        assert!(!LlmError::NotConfigured.is_retryable());
        assert!(LlmError::EmptyResponse.is_retryable());
    }

    // -- LlmClient wrapper --

    #[tokio::test]
    async fn disabled_client_reports_not_configured() {
        let client = LlmClient::Disabled;
        let err = client
            .complete(&ChatRequest::json("s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured));
        assert!(!client.is_active());
    }

    #[tokio::test]
    async fn empty_api_key_reports_not_configured() {
        let client = OpenAiClient::new(String::new(), settings("http://127.0.0.1:9"));
        let err = client
            .complete(&ChatRequest::json("s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured));
    }

    // -- mock server flows --

    #[tokio::test]
    async fn successful_completion_uses_primary_model() {
        let (addr, server) = serve(vec![(200, completion_body("o1-pro", "{\"a\":1}"))]).await;
        let client = OpenAiClient::new("sk-test".into(), settings(&format!("http://{addr}")));

        let response = client
            .complete(&ChatRequest::json("system prompt", "user prompt"))
            .await
            .unwrap();
        assert_eq!(response.content, "{\"a\":1}");
        assert_eq!(response.model, "o1-pro");
        assert!(!response.used_fallback);

        let bodies = server.await.unwrap();
        let sent: Value = serde_json::from_str(&bodies[0]).unwrap();
        assert_eq!(sent["model"], "o1-pro");
        assert_eq!(sent["messages"][0]["content"], "system prompt");
    }

    #[tokio::test]
    async fn server_error_falls_back_to_second_model_once() {
        let (addr, server) = serve(vec![
            (
                500,
                r#"{"error":{"message":"model overloaded"}}"#.to_string(),
            ),
            (200, completion_body("gpt-4o", "{\"a\":2}")),
        ])
        .await;
        let client = OpenAiClient::new("sk-test".into(), settings(&format!("http://{addr}")));

        let response = client
            .complete(&ChatRequest::json("s", "u"))
            .await
            .unwrap();
        assert!(response.used_fallback);
        assert_eq!(response.model, "gpt-4o");

        let bodies = server.await.unwrap();
        assert_eq!(bodies.len(), 2);
        let first: Value = serde_json::from_str(&bodies[0]).unwrap();
        let second: Value = serde_json::from_str(&bodies[1]).unwrap();
        assert_eq!(first["model"], "o1-pro");
        assert_eq!(second["model"], "gpt-4o");
    }

    #[tokio::test]
    async fn both_models_failing_surfaces_the_fallback_error() {
        let (addr, server) = serve(vec![
            (500, r#"{"error":{"message":"first"}}"#.to_string()),
            (503, r#"{"error":{"message":"second"}}"#.to_string()),
        ])
        .await;
        let client = OpenAiClient::new("sk-test".into(), settings(&format!("http://{addr}")));

        let err = client
            .complete(&ChatRequest::json("s", "u"))
            .await
            .unwrap_err();
        match err {
            LlmError::Status { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "second");
            }
            other => panic!("expected Status error, got {other:?}"),
        }
        let _ = server.await;
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let (addr, server) = serve(vec![(
            401,
            r#"{"error":{"message":"Incorrect API key"}}"#.to_string(),
        )])
        .await;
        let client = OpenAiClient::new("sk-bad".into(), settings(&format!("http://{addr}")));

        let err = client
            .complete(&ChatRequest::json("s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 401, .. }));
        assert_eq!(server.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn request_model_override_skips_fallback_when_equal() {
        let (addr, server) = serve(vec![(500, "{}".to_string())]).await;
        let client = OpenAiClient::new("sk-test".into(), settings(&format!("http://{addr}")));

        let err = client
            .complete(&ChatRequest::json("s", "u").with_model("gpt-4o"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 500, .. }));
        assert_eq!(server.await.unwrap().len(), 1);
    }
}
