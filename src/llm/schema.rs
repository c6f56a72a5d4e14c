//! Tool schema normalization
//!
//! Rewrites arbitrary JSON-Schema tool parameters into the restricted subset
//! the gateway validators accept. Nothing here fails: features that cannot
//! be expressed are folded into `description` hints.
//!
//! The pipeline runs in a fixed order:
//! - `$ref` and `const` resolution
//! - hint extraction (enums, `additionalProperties`, constraint keywords)
//! - `allOf` merging, `anyOf`/`oneOf` flattening, type-array flattening
//! - keyword stripping and `required` cleanup
//! - the empty-object placeholder

use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const PLACEHOLDER_PROPERTY: &str = "_placeholder";
const PLACEHOLDER_DESCRIPTION: &str = "Placeholder. Always pass true.";
const MAX_TOOL_NAME_LEN: usize = 64;

/// Constraint keywords whose values survive as `(keyword: value)` hints
const HINTED_CONSTRAINTS: &[&str] = &[
    "minLength",
    "maxLength",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "pattern",
    "minItems",
    "maxItems",
    "format",
    "default",
    "examples",
];

const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "minLength",
    "maxLength",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "pattern",
    "minItems",
    "maxItems",
    "format",
    "default",
    "examples",
    "$schema",
    "$defs",
    "definitions",
    "const",
    "$ref",
    "additionalProperties",
    "propertyNames",
    "title",
    "$id",
    "$comment",
];

/// Keys whose object values are keyed by property or definition name
const NAME_MAPS: &[&str] = &["properties", "$defs", "definitions"];

/// Keys holding literal data rather than nested schemas
const LITERAL_KEYWORDS: &[&str] = &["enum", "const", "default", "examples", "required"];

pub type SchemaMap = BTreeMap<String, SchemaNode>;

/// A JSON-Schema fragment
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Object(SchemaMap),
    Array(Vec<SchemaNode>),
    Scalar(Value),
}

impl From<Value> for SchemaNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => {
                SchemaNode::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
            Value::Array(items) => SchemaNode::Array(items.into_iter().map(Into::into).collect()),
            scalar => SchemaNode::Scalar(scalar),
        }
    }
}

impl From<SchemaNode> for Value {
    fn from(node: SchemaNode) -> Self {
        match node {
            SchemaNode::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
            SchemaNode::Array(items) => Value::Array(items.into_iter().map(Into::into).collect()),
            SchemaNode::Scalar(value) => value,
        }
    }
}

impl SchemaNode {
    fn string(value: &str) -> Self {
        SchemaNode::Scalar(Value::String(value.to_string()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SchemaNode::Scalar(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&SchemaMap> {
        match self {
            SchemaNode::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[SchemaNode]> {
        match self {
            SchemaNode::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Rewrite every schema object bottom-up: children first, then the
    /// object itself. Name maps such as `properties` are descended into
    /// without being treated as schemas, and literal keywords are left alone.
    pub fn transform(self, stage: fn(SchemaMap) -> SchemaMap) -> SchemaNode {
        match self {
            SchemaNode::Object(map) => {
                let map = map
                    .into_iter()
                    .map(|(key, child)| {
                        let child = if NAME_MAPS.contains(&key.as_str()) {
                            child.transform_named(stage)
                        } else if LITERAL_KEYWORDS.contains(&key.as_str()) {
                            child
                        } else {
                            child.transform(stage)
                        };
                        (key, child)
                    })
                    .collect();
                SchemaNode::Object(stage(map))
            }
            SchemaNode::Array(items) => {
                SchemaNode::Array(items.into_iter().map(|item| item.transform(stage)).collect())
            }
            scalar => scalar,
        }
    }

    fn transform_named(self, stage: fn(SchemaMap) -> SchemaMap) -> SchemaNode {
        match self {
            SchemaNode::Object(map) => SchemaNode::Object(
                map.into_iter()
                    .map(|(name, schema)| (name, schema.transform(stage)))
                    .collect(),
            ),
            other => other.transform(stage),
        }
    }
}

struct Stage {
    name: &'static str,
    apply: fn(SchemaMap) -> SchemaMap,
}

const PIPELINE: &[Stage] = &[
    Stage { name: "refs", apply: convert_ref },
    Stage { name: "const", apply: convert_const },
    Stage { name: "enum-hints", apply: add_enum_hint },
    Stage { name: "additional-properties-hints", apply: add_additional_properties_hint },
    Stage { name: "constraint-hints", apply: add_constraint_hints },
    Stage { name: "all-of", apply: merge_all_of },
    Stage { name: "unions", apply: flatten_union },
    Stage { name: "type-arrays", apply: flatten_type_array },
    Stage { name: "strip", apply: strip_unsupported },
    Stage { name: "required", apply: cleanup_required },
    Stage { name: "placeholder", apply: add_placeholder },
];

/// Normalize a tool parameter schema for the gateway
pub fn normalize(schema: &Value) -> Value {
    let mut node = SchemaNode::from(schema.clone());
    for stage in PIPELINE {
        log::trace!("[Schema] running stage {}", stage.name);
        node = node.transform(stage.apply);
    }
    node.into()
}

/// Normalize a tool's parameters, guaranteeing an object schema with at
/// least one property at the root.
pub fn normalize_tool_parameters(schema: Option<&Value>) -> Value {
    let Some(schema) = schema else {
        return placeholder_schema();
    };
    let Value::Object(mut map) = normalize(schema) else {
        return placeholder_schema();
    };

    map.insert("type".to_string(), json!("object"));
    let has_properties = map
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|props| !props.is_empty());
    if !has_properties {
        return placeholder_schema();
    }

    Value::Object(map)
}

fn placeholder_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            PLACEHOLDER_PROPERTY: {
                "type": "boolean",
                "description": PLACEHOLDER_DESCRIPTION,
            }
        },
        "required": [PLACEHOLDER_PROPERTY],
    })
}

/// Restrict a tool name to the characters function declarations allow
pub fn sanitize_tool_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .take(MAX_TOOL_NAME_LEN)
        .collect();

    if sanitized.is_empty() {
        "tool".to_string()
    } else {
        sanitized
    }
}

/// Upper-case every `type` token, as the gemini-cli validator expects
pub fn uppercase_types(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(s)) = map.get_mut("type") {
                *s = s.to_uppercase();
            }
            if let Some(Value::Object(props)) = map.get_mut("properties") {
                for prop in props.values_mut() {
                    uppercase_types(prop);
                }
            }
            if let Some(items) = map.get_mut("items") {
                uppercase_types(items);
            }
        }
        Value::Array(items) => {
            for item in items {
                uppercase_types(item);
            }
        }
        _ => {}
    }
}

/// Force an `OBJECT` root with a `properties` map
pub fn ensure_object_root(value: &mut Value) {
    if !value.is_object() {
        *value = json!({});
    }
    if let Value::Object(map) = value {
        map.insert("type".to_string(), json!("OBJECT"));
        if !map.get("properties").is_some_and(Value::is_object) {
            map.insert("properties".to_string(), json!({}));
        }
    }
}

fn hint_text(node: &SchemaNode) -> String {
    match node {
        SchemaNode::Scalar(Value::String(s)) => s.clone(),
        other => Value::from(other.clone()).to_string(),
    }
}

fn description(map: &SchemaMap) -> &str {
    map.get("description")
        .and_then(SchemaNode::as_str)
        .unwrap_or("")
}

/// Append `hint` to the description unless it is already there
fn append_hint(mut map: SchemaMap, hint: &str) -> SchemaMap {
    let existing = description(&map);
    if existing.contains(hint) {
        return map;
    }
    let updated = if existing.is_empty() {
        hint.to_string()
    } else {
        format!("{existing} ({hint})")
    };
    map.insert("description".to_string(), SchemaNode::string(&updated));
    map
}

fn type_name(map: &SchemaMap) -> Option<&str> {
    map.get("type").and_then(SchemaNode::as_str)
}

fn convert_ref(map: SchemaMap) -> SchemaMap {
    let Some(reference) = map.get("$ref").and_then(SchemaNode::as_str) else {
        return map;
    };
    let def_name = reference.rsplit('/').next().unwrap_or(reference);
    let hint = format!("See: {def_name}");

    let mut out = SchemaMap::new();
    out.insert("type".to_string(), SchemaNode::string("object"));
    if let Some(desc) = map.get("description") {
        out.insert("description".to_string(), desc.clone());
    }
    append_hint(out, &hint)
}

fn convert_const(mut map: SchemaMap) -> SchemaMap {
    if map.contains_key("enum") {
        return map;
    }
    if let Some(value) = map.remove("const") {
        map.insert("enum".to_string(), SchemaNode::Array(vec![value]));
    }
    map
}

fn add_enum_hint(map: SchemaMap) -> SchemaMap {
    // Scalar-typed enums are enforced natively
    if matches!(
        type_name(&map),
        Some("string" | "integer" | "number" | "boolean")
    ) {
        return map;
    }
    let Some(values) = map.get("enum").and_then(SchemaNode::as_array) else {
        return map;
    };
    if !(2..=10).contains(&values.len()) {
        return map;
    }
    let joined = values.iter().map(hint_text).collect::<Vec<_>>().join(", ");
    append_hint(map, &format!("Allowed: {joined}"))
}

fn add_additional_properties_hint(map: SchemaMap) -> SchemaMap {
    match map.get("additionalProperties") {
        Some(SchemaNode::Scalar(Value::Bool(false))) => {
            append_hint(map, "No extra properties allowed")
        }
        _ => map,
    }
}

fn add_constraint_hints(mut map: SchemaMap) -> SchemaMap {
    for keyword in HINTED_CONSTRAINTS {
        let hint = match map.get(*keyword) {
            Some(value) => format!("{keyword}: {}", hint_text(value)),
            None => continue,
        };
        map = append_hint(map, &hint);
    }
    map
}

/// Merge `source` into `target`; keys already in `target` win
fn deep_merge(target: &mut SchemaMap, source: &SchemaMap) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(SchemaNode::Object(existing)), SchemaNode::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (Some(_), _) => {}
            (None, _) => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn string_list(node: Option<&SchemaNode>) -> Vec<String> {
    node.and_then(SchemaNode::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn string_array(values: Vec<String>) -> SchemaNode {
    SchemaNode::Array(values.iter().map(|v| SchemaNode::string(v)).collect())
}

fn merge_all_of(mut map: SchemaMap) -> SchemaMap {
    let Some(SchemaNode::Array(members)) = map.remove("allOf") else {
        return map;
    };

    let mut properties = SchemaMap::new();
    let mut required: Vec<String> = Vec::new();
    let mut other = SchemaMap::new();

    for member in &members {
        let Some(member) = member.as_object() else {
            continue;
        };
        if let Some(SchemaNode::Object(props)) = member.get("properties") {
            for (name, schema) in props {
                properties.insert(name.clone(), schema.clone());
            }
        }
        for name in string_list(member.get("required")) {
            if !required.contains(&name) {
                required.push(name);
            }
        }
        let rest: SchemaMap = member
            .iter()
            .filter(|(key, _)| *key != "properties" && *key != "required")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        deep_merge(&mut other, &rest);
    }

    if !properties.is_empty() {
        let mut combined = match map.remove("properties") {
            Some(SchemaNode::Object(existing)) => existing,
            _ => SchemaMap::new(),
        };
        for (name, schema) in properties {
            combined.entry(name).or_insert(schema);
        }
        map.insert("properties".to_string(), SchemaNode::Object(combined));
    }

    if !required.is_empty() {
        let mut combined = string_list(map.get("required"));
        for name in required {
            if !combined.contains(&name) {
                combined.push(name);
            }
        }
        map.insert("required".to_string(), string_array(combined));
    }

    for (key, value) in other {
        map.entry(key).or_insert(value);
    }
    map
}

/// Rank a union option: object 3, array 2, scalar 1, null 0
fn score_option(option: &SchemaNode) -> (u8, String) {
    let Some(map) = option.as_object() else {
        return (0, "unknown".to_string());
    };
    let name = type_name(map).unwrap_or("");

    if name == "object" || map.contains_key("properties") {
        (3, "object".to_string())
    } else if name == "array" || map.contains_key("items") {
        (2, "array".to_string())
    } else if !name.is_empty() && name != "null" {
        (1, name.to_string())
    } else {
        (0, "null".to_string())
    }
}

/// Collect literal values when every option is a plain constant or enum
fn literal_union(options: &[SchemaNode]) -> Option<Vec<String>> {
    let mut values = Vec::new();
    for option in options {
        let map = option.as_object()?;
        if let Some(value) = map.get("const") {
            values.push(hint_text(value));
            continue;
        }
        if let Some(SchemaNode::Array(members)) = map.get("enum") {
            values.extend(members.iter().map(hint_text));
            continue;
        }
        let complex = ["properties", "items", "anyOf", "oneOf", "allOf"]
            .iter()
            .any(|key| map.contains_key(*key));
        if complex || type_name(map).is_some() {
            return None;
        }
    }
    (!values.is_empty()).then_some(values)
}

fn flatten_union(mut map: SchemaMap) -> SchemaMap {
    for union_key in ["anyOf", "oneOf"] {
        let options = match map.get(union_key) {
            Some(SchemaNode::Array(options)) if !options.is_empty() => options.clone(),
            _ => continue,
        };
        map.remove(union_key);
        let parent_desc = description(&map).to_string();

        if let Some(values) = literal_union(&options) {
            map.insert("type".to_string(), SchemaNode::string("string"));
            map.insert("enum".to_string(), string_array(values));
            continue;
        }

        let mut best: Option<(u8, &SchemaNode)> = None;
        let mut type_names: Vec<String> = Vec::new();
        for option in &options {
            let (score, name) = score_option(option);
            if !type_names.contains(&name) {
                type_names.push(name);
            }
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, option));
            }
        }

        let mut selected = match best.map(|(_, option)| option) {
            Some(SchemaNode::Object(option)) => option.clone(),
            _ => {
                let mut fallback = SchemaMap::new();
                fallback.insert("type".to_string(), SchemaNode::string("string"));
                fallback
            }
        };

        if !parent_desc.is_empty() {
            let child_desc = description(&selected).to_string();
            let merged = if child_desc.is_empty() || child_desc == parent_desc {
                parent_desc.clone()
            } else {
                format!("{parent_desc} ({child_desc})")
            };
            selected.insert("description".to_string(), SchemaNode::string(&merged));
        }
        if type_names.len() > 1 {
            selected = append_hint(selected, &format!("Accepts: {}", type_names.join(" | ")));
        }

        map.remove("description");
        for (key, value) in selected {
            map.insert(key, value);
        }
    }
    map
}

fn flatten_type_array(mut map: SchemaMap) -> SchemaMap {
    let Some(SchemaNode::Array(types)) = map.get("type") else {
        return map;
    };

    let mut non_null: Vec<String> = Vec::new();
    let mut nullable = false;
    for name in types.iter().filter_map(SchemaNode::as_str) {
        if name == "null" {
            nullable = true;
        } else if !non_null.iter().any(|n| n == name) {
            non_null.push(name.to_string());
        }
    }

    let selected = non_null.first().map(String::as_str).unwrap_or("string");
    map.insert("type".to_string(), SchemaNode::string(selected));
    if non_null.len() > 1 {
        map = append_hint(map, &format!("Accepts: {}", non_null.join(" | ")));
    }
    if nullable {
        map = append_hint(map, "nullable");
    }
    map
}

fn strip_unsupported(mut map: SchemaMap) -> SchemaMap {
    map.retain(|key, _| !UNSUPPORTED_KEYWORDS.contains(&key.as_str()));
    map
}

fn cleanup_required(mut map: SchemaMap) -> SchemaMap {
    if !map.contains_key("required") {
        return map;
    }
    let known: Vec<String> = match map.get("properties") {
        Some(SchemaNode::Object(props)) => props.keys().cloned().collect(),
        _ => Vec::new(),
    };
    let kept: Vec<String> = string_list(map.get("required"))
        .into_iter()
        .filter(|name| known.contains(name))
        .collect();

    if kept.is_empty() {
        map.remove("required");
    } else {
        map.insert("required".to_string(), string_array(kept));
    }
    map
}

fn add_placeholder(mut map: SchemaMap) -> SchemaMap {
    if type_name(&map) != Some("object") {
        return map;
    }
    let has_properties = map
        .get("properties")
        .and_then(SchemaNode::as_object)
        .is_some_and(|props| !props.is_empty());
    if has_properties {
        return map;
    }

    let mut property = SchemaMap::new();
    property.insert("type".to_string(), SchemaNode::string("boolean"));
    property.insert(
        "description".to_string(),
        SchemaNode::string(PLACEHOLDER_DESCRIPTION),
    );
    let mut properties = SchemaMap::new();
    properties.insert(PLACEHOLDER_PROPERTY.to_string(), SchemaNode::Object(property));

    map.insert("properties".to_string(), SchemaNode::Object(properties));
    map.insert(
        "required".to_string(),
        string_array(vec![PLACEHOLDER_PROPERTY.to_string()]),
    );
    map
}
