//! Access token supply for the remote service
//!
//! The resilient client asks for a token before every attempt, so a provider
//! backed by a credential store sees refreshed credentials as soon as the
//! [`CredentialRefresher`](apiguard_common::CredentialRefresher) has run.

use async_trait::async_trait;
use apiguard_domain::ApiGuardError;

/// Trait for providing access tokens
///
/// This trait allows dependency injection and testing with mock providers.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Get a valid access token
    ///
    /// # Errors
    ///
    /// Returns [`ApiGuardError::Auth`] when no usable token is available.
    async fn access_token(&self) -> Result<String, ApiGuardError>;
}

/// Provider for a fixed token (integration secrets, API keys)
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider").field("token", &"<redacted>").finish()
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, ApiGuardError> {
        if self.token.is_empty() {
            return Err(ApiGuardError::Auth("access token is empty".to_string()));
        }
        Ok(self.token.clone())
    }
}
