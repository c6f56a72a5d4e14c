//! Static model catalog
//!
//! Ids carry the `antigravity-` prefix where the model should be routed
//! through the Antigravity quota; tier suffixes are accepted on top of
//! these ids by the model resolver.

use crate::models::ModelDescriptor;

struct Entry {
    id: &'static str,
    name: &'static str,
    family: &'static str,
    max_input_tokens: u32,
    max_output_tokens: u32,
    supports_thinking: bool,
}

const MODELS: &[Entry] = &[
    Entry {
        id: "antigravity-gemini-3-pro-high",
        name: "Gemini 3 Pro (High)",
        family: "gemini",
        max_input_tokens: 1_048_576,
        max_output_tokens: 65_535,
        supports_thinking: true,
    },
    Entry {
        id: "antigravity-gemini-3-pro-low",
        name: "Gemini 3 Pro (Low)",
        family: "gemini",
        max_input_tokens: 1_048_576,
        max_output_tokens: 65_535,
        supports_thinking: true,
    },
    Entry {
        id: "antigravity-gemini-3-flash",
        name: "Gemini 3 Flash",
        family: "gemini",
        max_input_tokens: 1_048_576,
        max_output_tokens: 65_536,
        supports_thinking: true,
    },
    Entry {
        id: "gemini-2.5-pro",
        name: "Gemini 2.5 Pro",
        family: "gemini",
        max_input_tokens: 1_048_576,
        max_output_tokens: 65_536,
        supports_thinking: true,
    },
    Entry {
        id: "gemini-2.5-flash",
        name: "Gemini 2.5 Flash",
        family: "gemini",
        max_input_tokens: 1_048_576,
        max_output_tokens: 65_536,
        supports_thinking: true,
    },
    Entry {
        id: "antigravity-claude-sonnet-4-5",
        name: "Claude Sonnet 4.5",
        family: "claude",
        max_input_tokens: 200_000,
        max_output_tokens: 64_000,
        supports_thinking: false,
    },
    Entry {
        id: "antigravity-claude-sonnet-4-5-thinking",
        name: "Claude Sonnet 4.5 (Thinking)",
        family: "claude",
        max_input_tokens: 200_000,
        max_output_tokens: 64_000,
        supports_thinking: true,
    },
    Entry {
        id: "antigravity-claude-opus-4-5-thinking",
        name: "Claude Opus 4.5 (Thinking)",
        family: "claude",
        max_input_tokens: 200_000,
        max_output_tokens: 64_000,
        supports_thinking: true,
    },
];

/// Every model the gateway is known to serve
pub fn list_available_models() -> Vec<ModelDescriptor> {
    MODELS
        .iter()
        .map(|entry| ModelDescriptor {
            id: entry.id.to_string(),
            name: entry.name.to_string(),
            family: entry.family.to_string(),
            max_input_tokens: entry.max_input_tokens,
            max_output_tokens: entry.max_output_tokens,
            supports_tools: true,
            supports_thinking: entry.supports_thinking,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::resolve;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let models = list_available_models();
        let ids: HashSet<_> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.len(), models.len());
    }

    #[test]
    fn test_every_model_resolves_to_its_family() {
        for model in list_available_models() {
            let resolved = resolve(&model.id);
            assert_eq!(resolved.is_claude(), model.family == "claude", "{}", model.id);
            if model.family == "claude" && model.supports_thinking {
                assert!(resolved.is_claude_thinking(), "{}", model.id);
            }
        }
    }
}
