//! Model identifier resolution
//!
//! Decodes `[antigravity-]<family>[-<tier>]` into the backend model id,
//! the quota family the request is routed through, and its reasoning
//! configuration. Unknown ids pass through untouched.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

const QUOTA_PREFIX: &str = "antigravity-";
const CLAUDE_DEFAULT_THINKING_BUDGET: u32 = 32768;

/// Legacy and compatibility names mapped to canonical backend ids
const MODEL_ALIASES: &[(&str, &str)] = &[
    ("gemini-3-pro-low", "gemini-3-pro"),
    ("gemini-3-pro-high", "gemini-3-pro"),
    ("gemini-claude-sonnet-4-5", "claude-sonnet-4-5"),
    ("gemini-claude-sonnet-4-5-thinking-low", "claude-sonnet-4-5-thinking"),
    ("gemini-claude-sonnet-4-5-thinking-medium", "claude-sonnet-4-5-thinking"),
    ("gemini-claude-sonnet-4-5-thinking-high", "claude-sonnet-4-5-thinking"),
    ("gemini-claude-opus-4-5-thinking-low", "claude-opus-4-5-thinking"),
    ("gemini-claude-opus-4-5-thinking-medium", "claude-opus-4-5-thinking"),
    ("gemini-claude-opus-4-5-thinking-high", "claude-opus-4-5-thinking"),
    ("claude-sonnet-4-5-thinking-low", "claude-sonnet-4-5-thinking"),
    ("claude-sonnet-4-5-thinking-medium", "claude-sonnet-4-5-thinking"),
    ("claude-sonnet-4-5-thinking-high", "claude-sonnet-4-5-thinking"),
    ("claude-opus-4-5-thinking-low", "claude-opus-4-5-thinking"),
    ("claude-opus-4-5-thinking-medium", "claude-opus-4-5-thinking"),
    ("claude-opus-4-5-thinking-high", "claude-opus-4-5-thinking"),
];

/// Retired models and their replacements
const MODEL_FALLBACKS: &[(&str, &str)] = &[
    ("gemini-2.5-flash-image", "gemini-2.5-flash"),
    ("gemini-2.0-flash", "gemini-2.5-flash"),
];

/// Thinking budgets per family: (low, medium, high)
const BUDGETS_CLAUDE: (u32, u32, u32) = (8192, 16384, 32768);
const BUDGETS_GEMINI_25_PRO: (u32, u32, u32) = (8192, 16384, 32768);
const BUDGETS_GEMINI_25_FLASH: (u32, u32, u32) = (6144, 12288, 24576);
const BUDGETS_DEFAULT: (u32, u32, u32) = (4096, 8192, 16384);

fn tier_regex() -> &'static Regex {
    static TIER: OnceLock<Regex> = OnceLock::new();
    TIER.get_or_init(|| Regex::new(r"(?i)-(minimal|low|medium|high)$").expect("valid tier regex"))
}

/// Backend routing configuration a request is sent through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuotaFamily {
    Antigravity,
    GeminiCli,
}

impl QuotaFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaFamily::Antigravity => "antigravity",
            QuotaFamily::GeminiCli => "gemini-cli",
        }
    }
}

/// Coarse reasoning-effort level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingTier {
    Minimal,
    Low,
    Medium,
    High,
}

impl ThinkingTier {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "minimal" => Some(ThinkingTier::Minimal),
            "low" => Some(ThinkingTier::Low),
            "medium" => Some(ThinkingTier::Medium),
            "high" => Some(ThinkingTier::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingTier::Minimal => "minimal",
            ThinkingTier::Low => "low",
            ThinkingTier::Medium => "medium",
            ThinkingTier::High => "high",
        }
    }

    /// Numeric-budget families have no minimal tier
    fn budget(&self, table: (u32, u32, u32)) -> u32 {
        match self {
            ThinkingTier::Minimal | ThinkingTier::Low => table.0,
            ThinkingTier::Medium => table.1,
            ThinkingTier::High => table.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedModel {
    pub actual_model: String,
    pub thinking_budget: Option<u32>,
    pub thinking_level: Option<ThinkingTier>,
    pub tier: Option<ThinkingTier>,
    pub is_thinking_model: bool,
    pub quota_preference: QuotaFamily,
    pub explicit_quota: bool,
}

impl ResolvedModel {
    pub fn is_claude(&self) -> bool {
        self.actual_model.to_lowercase().contains("claude")
    }

    pub fn is_claude_thinking(&self) -> bool {
        self.is_claude() && self.actual_model.to_lowercase().contains("thinking")
    }

    pub fn is_gemini3(&self) -> bool {
        self.actual_model.to_lowercase().contains("gemini-3")
    }
}

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(from, _)| *from == key)
        .map(|(_, to)| *to)
}

fn supports_tiers(model: &str) -> bool {
    let lower = model.to_lowercase();
    lower.contains("gemini-3")
        || lower.contains("gemini-2.5")
        || (lower.contains("claude") && lower.contains("thinking"))
}

fn is_thinking_capable(model: &str) -> bool {
    let lower = model.to_lowercase();
    lower.contains("thinking") || lower.contains("gemini-3") || lower.contains("gemini-2.5")
}

fn budget_table(model: &str) -> (u32, u32, u32) {
    let lower = model.to_lowercase();
    if lower.contains("claude") {
        BUDGETS_CLAUDE
    } else if lower.contains("gemini-2.5-pro") {
        BUDGETS_GEMINI_25_PRO
    } else if lower.contains("gemini-2.5-flash") {
        BUDGETS_GEMINI_25_FLASH
    } else {
        BUDGETS_DEFAULT
    }
}

fn strip_quota_prefix(requested: &str) -> (&str, bool) {
    let has_prefix = requested
        .get(..QUOTA_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(QUOTA_PREFIX));
    if has_prefix {
        (&requested[QUOTA_PREFIX.len()..], true)
    } else {
        (requested, false)
    }
}

/// Resolve a requested model id. Never fails.
pub fn resolve(requested: &str) -> ResolvedModel {
    let (model, explicit_quota) = strip_quota_prefix(requested.trim());
    let lower = model.to_lowercase();

    let tier = if supports_tiers(model) {
        tier_regex()
            .captures(model)
            .and_then(|caps| caps.get(1))
            .and_then(|m| ThinkingTier::parse(m.as_str()))
    } else {
        None
    };
    let base_name = match tier {
        Some(_) => tier_regex().replace(model, "").into_owned(),
        None => model.to_string(),
    };

    let quota_preference = if lower.starts_with("claude") || lower.starts_with("gpt") {
        QuotaFamily::Antigravity
    } else if explicit_quota {
        QuotaFamily::Antigravity
    } else {
        QuotaFamily::GeminiCli
    };

    let actual = if explicit_quota && lower.starts_with("gemini-3") {
        // The sandbox wants a tier suffix on Pro and a bare name on Flash
        if lower.starts_with("gemini-3-pro") && tier.is_none() && !lower.contains("image") {
            format!("{model}-low")
        } else if lower.starts_with("gemini-3-flash") && tier.is_some() {
            base_name.clone()
        } else if let Some(tier) = tier {
            format!("{base_name}-{}", tier.as_str())
        } else {
            model.to_string()
        }
    } else {
        lookup(MODEL_ALIASES, model)
            .or_else(|| lookup(MODEL_ALIASES, &base_name))
            .map(str::to_string)
            .unwrap_or_else(|| base_name.clone())
    };
    let actual_model = lookup(MODEL_FALLBACKS, &actual)
        .map(str::to_string)
        .unwrap_or(actual);

    let mut resolved = ResolvedModel {
        is_thinking_model: is_thinking_capable(&actual_model),
        actual_model,
        thinking_budget: None,
        thinking_level: None,
        tier,
        quota_preference,
        explicit_quota,
    };

    if resolved.is_gemini3() {
        resolved.is_thinking_model = true;
        resolved.thinking_level = Some(tier.unwrap_or(ThinkingTier::Low));
    } else if let Some(tier) = tier {
        resolved.thinking_budget = Some(tier.budget(budget_table(&resolved.actual_model)));
    } else if resolved.is_claude_thinking() {
        resolved.thinking_budget = Some(CLAUDE_DEFAULT_THINKING_BUDGET);
    }

    log::debug!(
        "[ModelResolver] {} -> {} via {}",
        requested,
        resolved.actual_model,
        resolved.quota_preference.as_str()
    );
    resolved
}
