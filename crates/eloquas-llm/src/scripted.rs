// Deterministic chat provider that replays queued replies. Used by engine and
// server tests in place of the OpenAI API.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{ChatProvider, ChatRequest, ChatResponse, LlmError};

#[derive(Debug, Clone)]
enum Reply {
    Content(String),
    Failure(u16),
}

/// Replays queued replies in order and records every request it receives.
/// An exhausted queue answers with a 503 error.
pub struct ScriptedProvider {
    model: String,
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            model: "scripted-model".to_string(),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a raw text reply.
    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.lock_replies().push_back(Reply::Content(text.into()));
        self
    }

    /// Queue a JSON reply.
    pub fn push_json(&self, value: &serde_json::Value) -> &Self {
        self.push_text(value.to_string())
    }

    /// Queue an HTTP-style failure.
    pub fn push_failure(&self, status: u16) -> &Self {
        self.lock_replies().push_back(Reply::Failure(status));
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests mutex poisoned").clone()
    }

    pub fn remaining(&self) -> usize {
        self.lock_replies().len()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Reply>> {
        self.replies.lock().expect("replies mutex poisoned")
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .push(request.clone());
        let reply = self.lock_replies().pop_front();
        match reply {
            Some(Reply::Content(content)) => Ok(ChatResponse {
                content,
                model: request.model.clone().unwrap_or_else(|| self.model.clone()),
                prompt_tokens: 0,
                completion_tokens: 0,
                used_fallback: false,
            }),
            Some(Reply::Failure(status)) => Err(LlmError::Status {
                status,
                message: "scripted failure".to_string(),
            }),
            None => Err(LlmError::Status {
                status: 503,
                message: "no scripted reply left".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn replays_in_order_and_records_requests() {
        let provider = ScriptedProvider::new();
        provider.push_json(&json!({"n": 1})).push_failure(500);

        let first = provider
            .complete(&ChatRequest::json("s", "first").with_model("gpt-4o"))
            .await
            .unwrap();
        assert_eq!(first.content, "{\"n\":1}");
        assert_eq!(first.model, "gpt-4o");

        let second = provider.complete(&ChatRequest::json("s", "second")).await;
        assert!(matches!(second, Err(LlmError::Status { status: 500, .. })));

        let third = provider.complete(&ChatRequest::json("s", "third")).await;
        assert!(matches!(third, Err(LlmError::Status { status: 503, .. })));

        let users: Vec<String> = provider.requests().into_iter().map(|r| r.user).collect();
        assert_eq!(users, vec!["first", "second", "third"]);
        assert_eq!(provider.remaining(), 0);
    }
}
