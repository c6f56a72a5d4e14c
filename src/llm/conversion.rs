//! Conversation conversion
//!
//! Turns caller messages and tool declarations into the gateway's
//! `contents` / `tools` / `systemInstruction` / `generationConfig` shape,
//! applying the per-family rules:
//! - tool results move into a synthetic `user` turn after the call turn
//! - gemini-cli only keeps call/result pairs that match across adjacent turns
//! - Claude thinking turns lead with a session-consistent thought
//! - signatures come from the session cache, issued by the target's own family

use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};

use super::model_resolver::{QuotaFamily, ResolvedModel};
use super::schema::{ensure_object_root, normalize_tool_parameters, sanitize_tool_name, uppercase_types};
use super::signature::{SessionState, SignatureFamily};
use super::wire::{WireContent, WirePart, WireRole};
use crate::models::{GenerationOptions, Message, Part, Role, ToolDeclaration};

/// Output budget Claude thinking requests are raised to
const CLAUDE_THINKING_MAX_OUTPUT_TOKENS: u32 = 64000;

/// Request body for the gateway, before it is wrapped in the envelope
#[derive(Debug, Clone, PartialEq)]
pub struct BackendPayload {
    pub contents: Vec<WireContent>,
    pub system_instruction: Option<String>,
    pub tools: Option<Value>,
    pub generation_config: Option<Value>,
    pub tool_config: Option<Value>,
}

impl BackendPayload {
    pub fn has_tool_calls(&self) -> bool {
        self.contents.iter().any(WireContent::has_tool_calls)
    }

    pub fn into_request(self) -> Value {
        let mut request = json!({ "contents": self.contents });
        if let Some(system) = self.system_instruction {
            request["systemInstruction"] = json!({
                "role": "user",
                "parts": [{ "text": system }]
            });
        }
        if let Some(tools) = self.tools {
            request["tools"] = tools;
        }
        if let Some(config) = self.generation_config {
            request["generationConfig"] = config;
        }
        if let Some(tool_config) = self.tool_config {
            request["toolConfig"] = tool_config;
        }
        request
    }
}

/// Convert a conversation into the gateway payload for `resolved`
pub fn convert(
    messages: &[Message],
    tools: &[ToolDeclaration],
    options: &GenerationOptions,
    resolved: &ResolvedModel,
    session: &SessionState,
) -> BackendPayload {
    let system_texts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .flat_map(|m| m.parts.iter())
        .filter_map(|part| match part {
            Part::Text { value } if !value.is_empty() => Some(value.as_str()),
            _ => None,
        })
        .collect();
    let system_instruction = (!system_texts.is_empty()).then(|| system_texts.join("\n\n"));

    let call_names: HashMap<&str, String> = messages
        .iter()
        .flat_map(|m| m.parts.iter())
        .filter_map(|part| match part {
            Part::ToolCall { call_id, name, .. } => {
                Some((call_id.as_str(), sanitize_tool_name(name)))
            }
            _ => None,
        })
        .collect();

    let mut contents = Vec::new();
    for message in messages {
        match message.role {
            Role::System => {}
            Role::User => {
                let parts = user_parts(message, &call_names);
                push_turn(&mut contents, WireRole::User, parts);
            }
            Role::Assistant => {
                let (model_parts, results) =
                    assistant_parts(message, resolved, session, &call_names);
                push_turn(&mut contents, WireRole::Model, model_parts);
                push_turn(&mut contents, WireRole::User, results);
            }
        }
    }

    let mut contents = merge_adjacent(contents);
    if resolved.is_claude_thinking() {
        lead_with_thoughts(&mut contents, session, SignatureFamily::Claude);
    }
    if resolved.quota_preference == QuotaFamily::GeminiCli {
        contents = merge_adjacent(enforce_pairing(contents));
    }

    BackendPayload {
        contents,
        system_instruction,
        tools: function_declarations(tools, resolved.quota_preference),
        generation_config: generation_config(options, resolved),
        tool_config: (!tools.is_empty()).then(|| {
            json!({ "functionCallingConfig": { "mode": options.tool_choice.wire_mode() } })
        }),
    }
}

fn push_turn(contents: &mut Vec<WireContent>, role: WireRole, parts: Vec<WirePart>) {
    if !parts.is_empty() {
        contents.push(WireContent::new(role, parts));
    }
}

fn tool_result_part(call_id: &str, content: &str, call_names: &HashMap<&str, String>) -> WirePart {
    let response = match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => Value::Object(map),
        _ => json!({ "result": content }),
    };
    WirePart::ToolResult {
        id: Some(call_id.to_string()),
        name: call_names
            .get(call_id)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string()),
        response,
    }
}

fn user_parts(message: &Message, call_names: &HashMap<&str, String>) -> Vec<WirePart> {
    message
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { value } if !value.is_empty() => Some(WirePart::Text {
                text: value.clone(),
                signature: None,
            }),
            Part::ToolResult { call_id, content } => {
                Some(tool_result_part(call_id, content, call_names))
            }
            Part::Text { .. } => None,
            Part::ToolCall { .. } | Part::Thinking { .. } => {
                log::debug!("[Conversion] ignoring assistant-only part in user message");
                None
            }
        })
        .collect()
}

/// Model-turn parts plus the tool results that belong in the next user turn
fn assistant_parts(
    message: &Message,
    resolved: &ResolvedModel,
    session: &SessionState,
    call_names: &HashMap<&str, String>,
) -> (Vec<WirePart>, Vec<WirePart>) {
    let family = SignatureFamily::of(resolved);
    let mut parts = Vec::new();
    let mut results = Vec::new();
    // Gemini 3 consumes the warmup signature the same way Claude does
    let mut fallback_available = resolved.is_claude() || resolved.is_gemini3();

    for part in &message.parts {
        match part {
            Part::Text { value } => {
                if !value.is_empty() {
                    parts.push(WirePart::Text {
                        text: value.clone(),
                        signature: None,
                    });
                }
            }
            Part::Thinking { text, signature } => {
                let verified = match signature {
                    Some(sig) if session.is_trusted(family, text, sig) => Some(sig.clone()),
                    Some(_) => None,
                    None => session.signature_for_text(family, text).map(str::to_string),
                };
                match verified {
                    Some(signature) => parts.push(WirePart::Thought {
                        text: text.clone(),
                        signature: Some(signature),
                    }),
                    None => log::debug!("[Conversion] dropping unverified thinking part"),
                }
            }
            Part::ToolCall {
                call_id,
                name,
                input,
            } => {
                let mut signature = session.signature_for_call(family, call_id).map(str::to_string);
                if signature.is_none() && fallback_available {
                    // Only the first unsigned call in a turn borrows the session signature
                    fallback_available = false;
                    signature = session.last_thought(family).map(|t| t.signature.clone());
                }
                parts.push(WirePart::ToolCall {
                    id: Some(call_id.clone()),
                    name: sanitize_tool_name(name),
                    args: input.clone(),
                    signature,
                });
            }
            Part::ToolResult { call_id, content } => {
                results.push(tool_result_part(call_id, content, call_names));
            }
        }
    }

    (parts, results)
}

fn merge_adjacent(contents: Vec<WireContent>) -> Vec<WireContent> {
    let mut merged: Vec<WireContent> = Vec::with_capacity(contents.len());
    for content in contents {
        match merged.last_mut() {
            Some(last) if last.role == content.role => last.parts.extend(content.parts),
            _ => merged.push(content),
        }
    }
    merged
}

/// Put thought parts first in every model turn, synthesizing one from the
/// session when a turn calls tools without any reasoning.
fn lead_with_thoughts(contents: &mut [WireContent], session: &SessionState, family: SignatureFamily) {
    for content in contents.iter_mut().filter(|c| c.role == WireRole::Model) {
        if content.has_tool_calls() && !content.has_thoughts() {
            if let Some(thought) = session.last_thought(family) {
                content.parts.insert(
                    0,
                    WirePart::Thought {
                        text: thought.text.clone(),
                        signature: Some(thought.signature.clone()),
                    },
                );
            }
        }

        let (thoughts, rest): (Vec<WirePart>, Vec<WirePart>) = content
            .parts
            .drain(..)
            .partition(|part| matches!(part, WirePart::Thought { .. }));
        content.parts = thoughts;
        content.parts.extend(rest);
    }
}

/// Keep only call/result pairs whose ids match across adjacent turns
fn enforce_pairing(contents: Vec<WireContent>) -> Vec<WireContent> {
    let mut allowed_calls: Vec<HashSet<String>> = vec![HashSet::new(); contents.len()];
    let mut allowed_results: Vec<HashSet<String>> = vec![HashSet::new(); contents.len()];

    for (i, content) in contents.iter().enumerate() {
        if content.role != WireRole::Model || !content.has_tool_calls() {
            continue;
        }
        let Some(next) = contents.get(i + 1).filter(|n| n.role == WireRole::User) else {
            continue;
        };
        let calls: HashSet<&str> = content.parts.iter().filter_map(WirePart::tool_call_id).collect();
        let matched: HashSet<String> = next
            .parts
            .iter()
            .filter_map(WirePart::tool_result_id)
            .filter(|id| calls.contains(id))
            .map(str::to_string)
            .collect();
        allowed_calls[i] = matched.clone();
        allowed_results[i + 1] = matched;
    }

    contents
        .into_iter()
        .enumerate()
        .filter_map(|(i, mut content)| {
            let before = content.parts.len();
            content.parts.retain(|part| match part {
                WirePart::ToolCall { id, .. } => {
                    id.as_deref().is_some_and(|id| allowed_calls[i].contains(id))
                }
                WirePart::ToolResult { id, .. } => {
                    id.as_deref().is_some_and(|id| allowed_results[i].contains(id))
                }
                _ => true,
            });
            let dropped = before - content.parts.len();
            if dropped > 0 {
                log::debug!("[Conversion] dropped {} unpaired tool parts in turn {}", dropped, i);
            }
            (!content.parts.is_empty()).then_some(content)
        })
        .collect()
}

fn function_declarations(tools: &[ToolDeclaration], family: QuotaFamily) -> Option<Value> {
    if tools.is_empty() {
        return None;
    }
    let declarations: Vec<Value> = tools
        .iter()
        .map(|tool| {
            let mut parameters = normalize_tool_parameters(tool.parameters.as_ref());
            if family == QuotaFamily::GeminiCli {
                uppercase_types(&mut parameters);
                ensure_object_root(&mut parameters);
            }
            json!({
                "name": sanitize_tool_name(&tool.name),
                "description": tool.description,
                "parameters": parameters,
            })
        })
        .collect();
    Some(json!([{ "functionDeclarations": declarations }]))
}

fn generation_config(options: &GenerationOptions, resolved: &ResolvedModel) -> Option<Value> {
    let mut config = Map::new();
    if let Some(temperature) = options.temperature.filter(|t| t.is_finite()) {
        config.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = options.top_p.filter(|p| p.is_finite()) {
        config.insert("topP".to_string(), json!(top_p));
    }
    if let Some(top_k) = options.top_k {
        config.insert("topK".to_string(), json!(top_k));
    }
    if let Some(max_tokens) = options.max_tokens {
        config.insert("maxOutputTokens".to_string(), json!(max_tokens));
    }
    if !options.stop_sequences.is_empty() {
        config.insert("stopSequences".to_string(), json!(options.stop_sequences));
    }

    if let Some(level) = resolved.thinking_level {
        config.insert(
            "thinkingConfig".to_string(),
            json!({ "includeThoughts": true, "thinkingLevel": level.as_str() }),
        );
    } else if let Some(budget) = resolved.thinking_budget {
        config.insert(
            "thinkingConfig".to_string(),
            json!({ "includeThoughts": true, "thinkingBudget": budget }),
        );
        if resolved.is_claude_thinking() && options.max_tokens.map_or(true, |max| max <= budget) {
            config.insert(
                "maxOutputTokens".to_string(),
                json!(CLAUDE_THINKING_MAX_OUTPUT_TOKENS),
            );
        }
    }

    (!config.is_empty()).then_some(Value::Object(config))
}
