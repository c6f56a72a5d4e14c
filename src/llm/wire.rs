//! Gateway wire format
//!
//! Every part crossing the boundary is classified once into [`WirePart`].
//! Several vendor dialects mark reasoning differently (`thought: true`,
//! `type: "thinking"`, assorted signature keys); that detection lives here
//! and nowhere else.

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

const SIGNATURE_KEYS: &[&str] = &[
    "thoughtSignature",
    "thought_signature",
    "thinkingSignature",
    "thinking_signature",
    "signature",
];

/// Role of a wire turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    User,
    Model,
}

/// One role-tagged entry of the backend conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireContent {
    pub role: WireRole,
    pub parts: Vec<WirePart>,
}

impl WireContent {
    pub fn new(role: WireRole, parts: Vec<WirePart>) -> Self {
        Self { role, parts }
    }

    pub fn has_tool_calls(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, WirePart::ToolCall { .. }))
    }

    pub fn has_tool_results(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, WirePart::ToolResult { .. }))
    }

    pub fn has_thoughts(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, WirePart::Thought { .. }))
    }
}

/// A classified wire part
#[derive(Debug, Clone, PartialEq)]
pub enum WirePart {
    Text {
        text: String,
        signature: Option<String>,
    },
    Thought {
        text: String,
        signature: Option<String>,
    },
    ToolCall {
        id: Option<String>,
        name: String,
        args: Value,
        signature: Option<String>,
    },
    ToolResult {
        id: Option<String>,
        name: String,
        response: Value,
    },
    Unknown(Value),
}

fn non_empty_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn find_signature(map: &Map<String, Value>) -> Option<String> {
    let nested = ["metadata", "thinking"]
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_object));

    std::iter::once(map)
        .chain(nested)
        .find_map(|obj| SIGNATURE_KEYS.iter().find_map(|key| non_empty_str(obj, key)))
        .map(str::to_string)
}

fn is_thought(map: &Map<String, Value>) -> bool {
    if map.get("thought").and_then(Value::as_bool).unwrap_or(false) {
        return true;
    }
    if let Some(kind) = map.get("type").and_then(Value::as_str) {
        if matches!(kind, "thinking" | "redacted_thinking" | "reasoning") {
            return true;
        }
    }
    map.contains_key("thinking")
}

fn thought_text(map: &Map<String, Value>) -> String {
    if let Some(text) = non_empty_str(map, "thinking") {
        return text.to_string();
    }
    if let Some(inner) = map.get("thinking").and_then(Value::as_object) {
        if let Some(text) = non_empty_str(inner, "text").or_else(|| non_empty_str(inner, "value")) {
            return text.to_string();
        }
    }
    non_empty_str(map, "text").unwrap_or_default().to_string()
}

fn optional_id(map: &Map<String, Value>) -> Option<String> {
    non_empty_str(map, "id").map(str::to_string)
}

impl WirePart {
    /// Classify a raw part from any supported dialect
    pub fn classify(value: &Value) -> WirePart {
        let Some(map) = value.as_object() else {
            return WirePart::Unknown(value.clone());
        };

        if let Some(call) = map.get("functionCall").and_then(Value::as_object) {
            return WirePart::ToolCall {
                id: optional_id(call),
                name: non_empty_str(call, "name").unwrap_or_default().to_string(),
                args: call.get("args").cloned().unwrap_or_else(|| json!({})),
                signature: find_signature(map),
            };
        }

        if let Some(result) = map.get("functionResponse").and_then(Value::as_object) {
            return WirePart::ToolResult {
                id: optional_id(result),
                name: non_empty_str(result, "name").unwrap_or_default().to_string(),
                response: result.get("response").cloned().unwrap_or_else(|| json!({})),
            };
        }

        if is_thought(map) {
            return WirePart::Thought {
                text: thought_text(map),
                signature: find_signature(map),
            };
        }

        if let Some(text) = map.get("text").and_then(Value::as_str) {
            return WirePart::Text {
                text: text.to_string(),
                signature: find_signature(map),
            };
        }

        WirePart::Unknown(value.clone())
    }

    pub fn to_value(&self) -> Value {
        match self {
            WirePart::Text { text, signature } => {
                let mut part = json!({ "text": text });
                if let Some(signature) = signature {
                    part["thoughtSignature"] = json!(signature);
                }
                part
            }
            WirePart::Thought { text, signature } => {
                let mut part = json!({ "text": text, "thought": true });
                if let Some(signature) = signature {
                    part["thoughtSignature"] = json!(signature);
                }
                part
            }
            WirePart::ToolCall {
                id,
                name,
                args,
                signature,
            } => {
                let mut call = json!({ "name": name, "args": args });
                if let Some(id) = id {
                    call["id"] = json!(id);
                }
                let mut part = json!({ "functionCall": call });
                if let Some(signature) = signature {
                    part["thoughtSignature"] = json!(signature);
                }
                part
            }
            WirePart::ToolResult { id, name, response } => {
                let mut result = json!({ "name": name, "response": response });
                if let Some(id) = id {
                    result["id"] = json!(id);
                }
                json!({ "functionResponse": result })
            }
            WirePart::Unknown(value) => value.clone(),
        }
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            WirePart::ToolCall { id, .. } => id.as_deref(),
            _ => None,
        }
    }

    pub fn tool_result_id(&self) -> Option<&str> {
        match self {
            WirePart::ToolResult { id, .. } => id.as_deref(),
            _ => None,
        }
    }
}

impl Serialize for WirePart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Message of an in-band `error` object, if the payload carries one
pub fn error_message(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    if let Some(message) = error.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    if let Some(message) = error.as_str() {
        return Some(message.to_string());
    }
    Some(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_gemini_thought() {
        let part = json!({"text": "pondering", "thought": true, "thoughtSignature": "sig-1"});
        assert_eq!(
            WirePart::classify(&part),
            WirePart::Thought {
                text: "pondering".to_string(),
                signature: Some("sig-1".to_string()),
            }
        );
    }

    #[test]
    fn test_classify_claude_style_thinking() {
        let part = json!({"type": "thinking", "thinking": "step one", "signature": "abc"});
        assert_eq!(
            WirePart::classify(&part),
            WirePart::Thought {
                text: "step one".to_string(),
                signature: Some("abc".to_string()),
            }
        );

        let nested = json!({"type": "reasoning", "text": "r", "metadata": {"thought_signature": "m"}});
        match WirePart::classify(&nested) {
            WirePart::Thought { signature, .. } => assert_eq!(signature.as_deref(), Some("m")),
            other => panic!("expected thought, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_function_call_with_signature() {
        let part = json!({
            "functionCall": {"name": "search", "args": {"q": "x"}, "id": "call-7"},
            "thoughtSignature": "sig-call"
        });
        match WirePart::classify(&part) {
            WirePart::ToolCall { id, name, args, signature } => {
                assert_eq!(id.as_deref(), Some("call-7"));
                assert_eq!(name, "search");
                assert_eq!(args, json!({"q": "x"}));
                assert_eq!(signature.as_deref(), Some("sig-call"));
            }
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[test]
    fn test_signed_text_stays_text() {
        let part = json!({"text": "answer", "thoughtSignature": "s"});
        assert_eq!(
            WirePart::classify(&part),
            WirePart::Text {
                text: "answer".to_string(),
                signature: Some("s".to_string()),
            }
        );
    }

    #[test]
    fn test_unknown_parts_are_preserved() {
        let part = json!({"inlineData": {"mimeType": "image/png", "data": "AAA"}});
        let classified = WirePart::classify(&part);
        assert_eq!(classified, WirePart::Unknown(part.clone()));
        assert_eq!(classified.to_value(), part);
    }

    #[test]
    fn test_tool_call_serialization_shape() {
        let part = WirePart::ToolCall {
            id: Some("c1".to_string()),
            name: "read".to_string(),
            args: json!({"path": "a"}),
            signature: Some("sig".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            json!({
                "functionCall": {"name": "read", "args": {"path": "a"}, "id": "c1"},
                "thoughtSignature": "sig"
            })
        );
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(&json!({"error": {"code": 429, "message": "quota"}})).as_deref(),
            Some("quota")
        );
        assert_eq!(error_message(&json!({"response": {}})), None);
    }
}
