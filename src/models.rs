use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single piece of a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        value: String,
    },
    ToolCall {
        call_id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        call_id: String,
        content: String,
    },
    /// Reasoning replayed from an earlier assistant turn
    Thinking {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
}

impl Part {
    pub fn text(value: &str) -> Self {
        Part::Text {
            value: value.to_string(),
        }
    }

    pub fn tool_call(call_id: &str, name: &str, input: Value) -> Self {
        Part::ToolCall {
            call_id: call_id.to_string(),
            name: name.to_string(),
            input,
        }
    }

    pub fn tool_result(call_id: &str, content: &str) -> Self {
        Part::ToolResult {
            call_id: call_id.to_string(),
            content: content.to_string(),
        }
    }
}

/// One turn in the conversation, as supplied by the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    pub fn system(content: &str) -> Self {
        Self::new(Role::System, vec![Part::text(content)])
    }

    pub fn user(content: &str) -> Self {
        Self::new(Role::User, vec![Part::text(content)])
    }

    pub fn assistant(content: &str) -> Self {
        Self::new(Role::Assistant, vec![Part::text(content)])
    }
}

/// A tool the model may call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON-Schema for the tool input; normalized before it is sent
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// How the model is allowed to use the declared tools
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    #[default]
    Auto,
    Required,
    None,
}

impl ToolChoice {
    /// Mode string for `functionCallingConfig`
    pub fn wire_mode(&self) -> &'static str {
        match self {
            ToolChoice::Auto => "AUTO",
            ToolChoice::Required => "ANY",
            ToolChoice::None => "NONE",
        }
    }
}

/// Sampling options for a request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    #[serde(default)]
    pub tool_choice: ToolChoice,
}

impl GenerationOptions {
    /// Build options from a loosely typed option map.
    ///
    /// Values of the wrong type are dropped rather than reported.
    pub fn from_model_options(options: &Map<String, Value>) -> Self {
        let float = |key: &str| {
            options
                .get(key)
                .and_then(Value::as_f64)
                .filter(|v| v.is_finite())
        };
        let count = |key: &str| {
            options
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
        };

        let stop_sequences = options
            .get("stopSequences")
            .or_else(|| options.get("stop"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|s| s.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let tool_choice = match options.get("toolChoice").and_then(Value::as_str) {
            Some("required") | Some("any") => ToolChoice::Required,
            Some("none") => ToolChoice::None,
            _ => ToolChoice::Auto,
        };

        Self {
            temperature: float("temperature"),
            top_p: float("topP").or_else(|| float("top_p")),
            top_k: count("topK").or_else(|| count("top_k")),
            max_tokens: count("maxTokens")
                .or_else(|| count("maxOutputTokens"))
                .or_else(|| count("max_tokens")),
            stop_sequences,
            tool_choice,
        }
    }
}

/// A piece of the model reply surfaced to the caller
///
/// Thinking is consumed internally and never appears here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePart {
    Text {
        value: String,
    },
    ToolCall {
        id: String,
        name: String,
        input: Value,
    },
}

/// Static description of a model the gateway offers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub family: String,
    pub max_input_tokens: u32,
    pub max_output_tokens: u32,
    pub supports_tools: bool,
    pub supports_thinking: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_options_drop_wrong_types() {
        let raw = json!({
            "temperature": "hot",
            "topP": 0.9,
            "topK": -3,
            "maxTokens": 1024,
            "stopSequences": ["END", 4, "STOP"],
            "toolChoice": "required"
        });
        let options = GenerationOptions::from_model_options(raw.as_object().unwrap());

        assert_eq!(options.temperature, None);
        assert_eq!(options.top_p, Some(0.9));
        assert_eq!(options.top_k, None);
        assert_eq!(options.max_tokens, Some(1024));
        assert_eq!(options.stop_sequences, vec!["END", "STOP"]);
        assert_eq!(options.tool_choice, ToolChoice::Required);
    }

    #[test]
    fn test_options_empty_map() {
        let options = GenerationOptions::from_model_options(&Map::new());
        assert_eq!(options, GenerationOptions::default());
        assert_eq!(options.tool_choice.wire_mode(), "AUTO");
    }

    #[test]
    fn test_part_serialization_is_tagged() {
        let part = Part::tool_result("call-1", "ok");
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["type"], "tool_result");
        assert_eq!(value["call_id"], "call-1");
    }
}
