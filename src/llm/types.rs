//! Shared types for the gateway client
//!
//! Requests, responses and stream events exchanged with callers.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::auth::AuthError;
use crate::models::{GenerationOptions, Message, ResponsePart, ToolDeclaration};

/// Errors that can occur during gateway operations
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Request for a chat completion
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Requested model id, e.g. `antigravity-gemini-3-pro-high`
    pub model: String,
    /// Conversation messages
    pub messages: Vec<Message>,
    /// Tools the model may call
    pub tools: Vec<ToolDeclaration>,
    pub options: GenerationOptions,
    /// Flips to `true` when the caller wants the stream stopped
    pub cancel: Option<watch::Receiver<bool>>,
}

impl ChatRequest {
    pub fn new(model: &str, messages: Vec<Message>) -> Self {
        Self {
            model: model.to_string(),
            messages,
            ..Default::default()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

/// Response from a non-streaming completion
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    /// Reply parts in arrival order
    pub parts: Vec<ResponsePart>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl ChatResponse {
    /// Concatenated text parts
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ResponsePart::Text { value } => Some(value.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub thinking_tokens: u32,
    pub total_tokens: u32,
}

/// Streaming event from a chat completion
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Text token(s)
    Content { delta: String },
    /// A complete tool call
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Token usage info
    Usage {
        prompt_tokens: u32,
        completion_tokens: u32,
    },
    /// Stream finished
    Done { finish_reason: String },
    /// Error occurred
    Error { message: String },
}

impl From<ResponsePart> for StreamEvent {
    fn from(part: ResponsePart) -> Self {
        match part {
            ResponsePart::Text { value } => StreamEvent::Content { delta: value },
            ResponsePart::ToolCall { id, name, input } => StreamEvent::ToolCall { id, name, input },
        }
    }
}
