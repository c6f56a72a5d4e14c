//! Bearer token providers
//!
//! The OAuth flow itself lives outside this crate. The client only asks a
//! [`TokenProvider`] for a currently valid access token before each request.

use async_trait::async_trait;
use std::env;
use thiserror::Error;

pub const ENV_ACCESS_TOKEN: &str = "ANTIGRAVITY_ACCESS_TOKEN";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No credential available; sign in first")]
    MissingCredential,
    #[error("Token provider error: {0}")]
    Provider(String),
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A valid bearer token
    ///
    /// With `prompt_if_missing`, an interactive provider may start a sign-in
    /// flow instead of failing with [`AuthError::MissingCredential`].
    async fn get_valid_bearer_token(&self, prompt_if_missing: bool) -> Result<String, AuthError>;
}

/// A fixed token, mostly for tests and scripts
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_valid_bearer_token(&self, _prompt_if_missing: bool) -> Result<String, AuthError> {
        if self.token.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        Ok(self.token.clone())
    }
}

/// Reads the token from an environment variable on every call
pub struct EnvTokenProvider {
    var: String,
}

impl EnvTokenProvider {
    pub fn new() -> Self {
        Self::with_var(ENV_ACCESS_TOKEN)
    }

    pub fn with_var(var: &str) -> Self {
        Self {
            var: var.to_string(),
        }
    }
}

impl Default for EnvTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn get_valid_bearer_token(&self, prompt_if_missing: bool) -> Result<String, AuthError> {
        match env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => {
                if prompt_if_missing {
                    log::warn!("[Auth] {} is not set; interactive sign-in is not available", self.var);
                }
                Err(AuthError::MissingCredential)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticTokenProvider::new("tok");
        assert_eq!(provider.get_valid_bearer_token(false).await.unwrap(), "tok");

        let empty = StaticTokenProvider::new("");
        assert!(matches!(
            empty.get_valid_bearer_token(true).await,
            Err(AuthError::MissingCredential)
        ));
    }

    #[tokio::test]
    async fn test_env_provider_missing_var() {
        let provider = EnvTokenProvider::with_var("ANTIGRAVITY_TEST_TOKEN_THAT_IS_NEVER_SET");
        assert!(matches!(
            provider.get_valid_bearer_token(false).await,
            Err(AuthError::MissingCredential)
        ));
    }
}
