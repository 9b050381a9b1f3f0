// Library root: the chat-completions client, JSON extraction helpers and a
// scripted provider for tests.

pub mod client;
pub mod json;
pub mod scripted;

pub use client::{ChatProvider, ChatRequest, ChatResponse, LlmClient, LlmError};
pub use json::{extract_json, parse_json};
pub use scripted::ScriptedProvider;
