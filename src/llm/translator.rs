//! Response translation
//!
//! Converts one backend reply body (`candidates[].content.parts[]`) into
//! caller-facing response parts. Reasoning is never surfaced; it only feeds
//! the session's signature cache.

use serde_json::Value;

use super::signature::{SessionState, SignatureFamily};
use super::types::{LlmError, TokenUsage};
use super::wire::{error_message, WirePart};
use crate::models::ResponsePart;

/// Thought accumulation carried across a whole response
#[derive(Debug)]
pub struct ThoughtState {
    family: SignatureFamily,
    buffer: String,
    signed: bool,
}

impl ThoughtState {
    /// State for a response issued by `family`
    pub fn new(family: SignatureFamily) -> Self {
        Self {
            family,
            buffer: String::new(),
            signed: false,
        }
    }

    /// Cache `signature` with the thought text seen so far, once per block
    fn capture(&mut self, signature: &str, session: &mut SessionState) {
        if !self.signed {
            session.record_thought(self.family, &self.buffer, signature);
            self.signed = true;
        }
    }
}

/// Everything one reply body contributed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslatedChunk {
    pub parts: Vec<ResponsePart>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// The body inside a `{"response": ...}` wrapper, or the value itself
pub fn unwrap_response(value: &Value) -> &Value {
    value.get("response").unwrap_or(value)
}

/// Translate one reply body, updating `state` and `session`
pub fn translate(
    body: &Value,
    state: &mut ThoughtState,
    session: &mut SessionState,
) -> Result<TranslatedChunk, LlmError> {
    if let Some(message) = error_message(body) {
        return Err(LlmError::Backend(message));
    }

    let mut chunk = TranslatedChunk::default();
    let candidates = body
        .get("candidates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for raw in parts {
            match WirePart::classify(raw) {
                WirePart::Thought { text, signature } => {
                    if state.signed {
                        // A new block after a signed one
                        state.buffer.clear();
                        state.signed = false;
                    }
                    state.buffer.push_str(&text);
                    if let Some(signature) = signature {
                        state.capture(&signature, session);
                    }
                }
                WirePart::Text { text, signature } => {
                    if let Some(signature) = signature {
                        state.capture(&signature, session);
                    }
                    if !text.is_empty() {
                        chunk.parts.push(ResponsePart::Text { value: text });
                    }
                }
                WirePart::ToolCall {
                    id,
                    name,
                    args,
                    signature,
                } => {
                    let id = id.unwrap_or_else(|| session.next_call_id());
                    if let Some(signature) = signature {
                        session.record_call_signature(state.family, &id, &signature);
                        state.capture(&signature, session);
                    }
                    chunk.parts.push(ResponsePart::ToolCall {
                        id,
                        name,
                        input: args,
                    });
                }
                WirePart::ToolResult { .. } | WirePart::Unknown(_) => {
                    log::debug!("[Translator] skipping unsupported reply part");
                }
            }
        }

        if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
            chunk.finish_reason = Some(reason.to_string());
        }
    }

    chunk.usage = body.get("usageMetadata").map(parse_usage);
    Ok(chunk)
}

fn parse_usage(metadata: &Value) -> TokenUsage {
    let count = |key: &str| {
        metadata
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0)
    };
    TokenUsage {
        prompt_tokens: count("promptTokenCount"),
        completion_tokens: count("candidatesTokenCount"),
        thinking_tokens: count("thoughtsTokenCount"),
        total_tokens: count("totalTokenCount"),
    }
}
