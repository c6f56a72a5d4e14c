//! Gateway client layer
//!
//! Translates an abstract conversation into the Antigravity gateway's wire
//! shape and back:
//! - Tool schema normalization for strict validators
//! - Model id resolution into backend model and reasoning config
//! - Thought signature caching across turns
//! - Streaming reassembly with cancellation

mod types;
pub mod antigravity;
pub mod conversion;
pub mod model_resolver;
pub mod schema;
pub mod signature;
pub mod stream;
pub mod translator;
pub mod wire;

pub use antigravity::AntigravityClient;
pub use model_resolver::{resolve, QuotaFamily, ResolvedModel, ThinkingTier};
pub use signature::{SessionState, SignatureFamily, SignaturePhase};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::auth::TokenProvider;
use crate::config::BridgeConfig;

/// Trait for chat clients
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Non-streaming chat completion
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Streaming chat completion
    ///
    /// Returns a channel receiver that yields StreamEvents.
    /// The caller should consume events until receiving StreamEvent::Done or StreamEvent::Error.
    async fn chat_stream(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, LlmError>;
}

/// Create a gateway client for the given configuration
pub fn create_client(
    config: &BridgeConfig,
    tokens: Arc<dyn TokenProvider>,
) -> Result<Box<dyn LlmClient>, LlmError> {
    if config.project_id.trim().is_empty() {
        return Err(LlmError::NotConfigured("projectId is empty".to_string()));
    }
    for endpoint in [&config.antigravity_endpoint, &config.gemini_cli_endpoint] {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(LlmError::NotConfigured(format!(
                "endpoint must be an http(s) URL: {}",
                endpoint
            )));
        }
    }
    Ok(Box::new(AntigravityClient::new(config.clone(), tokens)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;

    fn tokens() -> Arc<dyn TokenProvider> {
        Arc::new(StaticTokenProvider::new("test-token"))
    }

    #[test]
    fn test_create_client_default_config() {
        let client = create_client(&BridgeConfig::default(), tokens());
        assert!(client.is_ok());
    }

    #[test]
    fn test_create_client_missing_project() {
        let config = BridgeConfig {
            project_id: " ".to_string(),
            ..Default::default()
        };
        match create_client(&config, tokens()) {
            Err(LlmError::NotConfigured(_)) => (),
            Err(other) => panic!("Expected NotConfigured error, got: {:?}", other),
            Ok(_) => panic!("Expected error, got Ok"),
        }
    }

    #[test]
    fn test_create_client_bad_endpoint() {
        let config = BridgeConfig {
            gemini_cli_endpoint: "cloudcode-pa.googleapis.com".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_client(&config, tokens()),
            Err(LlmError::NotConfigured(_))
        ));
    }
}
