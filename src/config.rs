//! Bridge configuration
//!
//! Stored as JSON in the platform config directory. Environment variables
//! override the stored values at startup.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_PROJECT_ID: &str = "rising-fact-p41fc";
pub const ANTIGRAVITY_ENDPOINT: &str = "https://daily-cloudcode-pa.sandbox.googleapis.com";
pub const GEMINI_CLI_ENDPOINT: &str = "https://cloudcode-pa.googleapis.com";
pub const DEFAULT_MODEL: &str = "antigravity-gemini-3-pro-high";

const ENV_PROJECT_ID: &str = "ANTIGRAVITY_PROJECT_ID";
const ENV_ANTIGRAVITY_ENDPOINT: &str = "ANTIGRAVITY_ENDPOINT";
const ENV_GEMINI_CLI_ENDPOINT: &str = "GEMINI_CLI_ENDPOINT";
const ENV_MODEL: &str = "ANTIGRAVITY_MODEL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to get config directory")]
    NoConfigDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Cloud project sent in every request envelope
    pub project_id: String,
    pub antigravity_endpoint: String,
    pub gemini_cli_endpoint: String,
    /// Model used when a request names none
    pub default_model: String,
    /// Prime a thought signature before tool-using Gemini 3 requests
    pub warmup_enabled: bool,
    /// Whole-request timeout; `None` leaves it to the transport
    pub request_timeout_secs: Option<u64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            project_id: DEFAULT_PROJECT_ID.to_string(),
            antigravity_endpoint: ANTIGRAVITY_ENDPOINT.to_string(),
            gemini_cli_endpoint: GEMINI_CLI_ENDPOINT.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            warmup_enabled: true,
            request_timeout_secs: None,
        }
    }
}

impl BridgeConfig {
    /// Apply overrides from `lookup`, returning whether anything changed
    pub fn populate_from<F>(&mut self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut updated = false;
        let fields = [
            (ENV_PROJECT_ID, &mut self.project_id),
            (ENV_ANTIGRAVITY_ENDPOINT, &mut self.antigravity_endpoint),
            (ENV_GEMINI_CLI_ENDPOINT, &mut self.gemini_cli_endpoint),
            (ENV_MODEL, &mut self.default_model),
        ];

        for (key, field) in fields {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                if *field != value {
                    log::info!("[Config] {} set from environment", key);
                    *field = value;
                    updated = true;
                }
            }
        }

        updated
    }

    pub fn populate_from_env(&mut self) -> bool {
        self.populate_from(|key| env::var(key).ok())
    }
}

fn get_app_config_dir() -> Result<PathBuf, ConfigError> {
    ProjectDirs::from("com", "antigravity", "AntigravityBridge")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or(ConfigError::NoConfigDir)
}

/// Path of the config file
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(get_app_config_dir()?.join("config.json"))
}

/// Load config from `path`; a missing file yields the defaults
pub fn load_config_from(path: &Path) -> Result<BridgeConfig, ConfigError> {
    if !path.exists() {
        return Ok(BridgeConfig::default());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn save_config_to(path: &Path, config: &BridgeConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

/// Load the stored config and apply environment overrides
pub fn init_config() -> Result<BridgeConfig, ConfigError> {
    let path = config_path()?;
    let mut config = load_config_from(&path)?;
    if config.populate_from_env() {
        log::info!("[Config] using environment overrides");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.project_id, DEFAULT_PROJECT_ID);
        assert!(config.warmup_enabled);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = BridgeConfig {
            project_id: "my-project".to_string(),
            warmup_enabled: false,
            request_timeout_secs: Some(120),
            ..Default::default()
        };

        save_config_to(&path, &config).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"projectId": "p-1", "warmupEnabled": false}"#).unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.project_id, "p-1");
        assert!(!config.warmup_enabled);
        assert_eq!(config.antigravity_endpoint, ANTIGRAVITY_ENDPOINT);
        assert_eq!(config.default_model, DEFAULT_MODEL);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config_from(&path), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_populate_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("ANTIGRAVITY_PROJECT_ID", "env-project"),
            ("ANTIGRAVITY_MODEL", "gemini-2.5-flash"),
            ("GEMINI_CLI_ENDPOINT", "   "),
        ]
        .into_iter()
        .collect();

        let mut config = BridgeConfig::default();
        let updated = config.populate_from(|key| vars.get(key).map(|v| v.to_string()));

        assert!(updated);
        assert_eq!(config.project_id, "env-project");
        assert_eq!(config.default_model, "gemini-2.5-flash");
        assert_eq!(config.gemini_cli_endpoint, GEMINI_CLI_ENDPOINT);

        assert!(!config.populate_from(|_| None));
    }
}
