use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Refusal reason when no strategy matches an error
pub const NO_STRATEGY_REASON: &str = "No recovery strategy found for error";

/// Refusal reason when an error signature has used up its attempts
pub const MAX_ATTEMPTS_REASON: &str = "Maximum recovery attempts exceeded";

/// Identifies a recovery strategy in logs and outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    CredentialRefresh,
    RateLimitBackoff,
    NetworkRetry,
    ServerErrorRetry,
    Custom(&'static str),
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CredentialRefresh => f.write_str("credential_refresh"),
            Self::RateLimitBackoff => f.write_str("rate_limit_backoff"),
            Self::NetworkRetry => f.write_str("network_retry"),
            Self::ServerErrorRetry => f.write_str("server_error_retry"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// Result of one recovery evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    /// The remediation itself worked (refresh done, backoff waited)
    pub success: bool,
    /// The failed operation should be executed again
    pub should_retry: bool,
    pub reason: Option<String>,
    pub strategy: Option<StrategyKind>,
    /// Backoff that was waited before returning
    pub delay: Option<Duration>,
}

impl RecoveryOutcome {
    /// Remediation done; retry the operation
    pub fn recovered(strategy: StrategyKind, delay: Option<Duration>) -> Self {
        Self { success: true, should_retry: true, reason: None, strategy: Some(strategy), delay }
    }

    /// Remediation attempted and failed
    pub fn failed(strategy: StrategyKind, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            should_retry: false,
            reason: Some(reason.into()),
            strategy: Some(strategy),
            delay: None,
        }
    }

    /// Recovery not attempted
    pub fn refused(strategy: Option<StrategyKind>, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            should_retry: false,
            reason: Some(reason.into()),
            strategy,
            delay: None,
        }
    }

    pub fn should_retry(&self) -> bool {
        self.success && self.should_retry
    }
}

/// Caller information available to strategies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryContext {
    pub user_id: Option<String>,
    pub operation: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl RecoveryContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Refreshes stored credentials for a user
///
/// Implemented by the application's credential store; the recovery layer
/// never sees the credentials themselves.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    /// Refresh the credentials of `user_id`
    ///
    /// # Errors
    /// Returns a human-readable cause when the refresh fails.
    async fn refresh_credentials(&self, user_id: &str) -> Result<(), String>;
}
