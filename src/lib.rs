pub mod auth;
pub mod catalog;
pub mod config;
pub mod llm;
pub mod models;

pub use auth::{AuthError, EnvTokenProvider, StaticTokenProvider, TokenProvider};
pub use config::{BridgeConfig, ConfigError};
pub use llm::{create_client, ChatRequest, ChatResponse, LlmClient, LlmError, StreamEvent};

/// Initialize the logger: debug for this crate, warn for everything else
///
/// `RUST_LOG` takes precedence when set. Calling this twice is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("antigravity_lib=debug,warn"),
    )
    .format_timestamp_secs()
    .try_init();
}
