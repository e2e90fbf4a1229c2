//! Recovery strategy trait and the built-in strategies

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use apiguard_domain::constants::{
    CREDENTIAL_REFRESH_MAX_ATTEMPTS, NETWORK_BASE_DELAY_MS, NETWORK_MAX_ATTEMPTS,
    RATE_LIMIT_BASE_DELAY_MS, RATE_LIMIT_MAX_ATTEMPTS, SERVER_ERROR_DELAY_MS,
    SERVER_ERROR_MAX_ATTEMPTS,
};
use apiguard_domain::{ClassifiedError, ErrorCategory, ErrorCode};
use async_trait::async_trait;
use tracing::debug;

use super::types::{CredentialRefresher, RecoveryContext, RecoveryOutcome, StrategyKind};

/// A remediation for one family of classified errors
///
/// The [`RecoveryManager`](super::RecoveryManager) picks the first strategy
/// whose `can_recover` accepts an error and enforces `max_attempts` per error
/// signature. `recover` performs the remediation (refresh, backoff sleep)
/// and reports whether the failed operation should run again.
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn can_recover(&self, error: &ClassifiedError) -> bool;

    async fn recover(&self, error: &ClassifiedError, context: &RecoveryContext) -> RecoveryOutcome;

    fn max_attempts(&self) -> u32;

    /// Recoveries performed since creation or the last `reset`
    fn attempts(&self) -> u32;

    fn reset(&self);
}

/// Exponential delay: `base * 2^(attempt - 1)`
fn doubling_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent)
}

/* -------------------------------------------------------------------------- */
/* Credential Refresh */
/* -------------------------------------------------------------------------- */

/// Refreshes credentials after an authentication failure
pub struct CredentialRefreshStrategy {
    refresher: Arc<dyn CredentialRefresher>,
    attempts: AtomicU32,
}

impl CredentialRefreshStrategy {
    pub fn new(refresher: Arc<dyn CredentialRefresher>) -> Self {
        Self { refresher, attempts: AtomicU32::new(0) }
    }
}

#[async_trait]
impl RecoveryStrategy for CredentialRefreshStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CredentialRefresh
    }

    fn can_recover(&self, error: &ClassifiedError) -> bool {
        error.category() == ErrorCategory::Authentication
            && matches!(
                error.code(),
                ErrorCode::Unauthorized | ErrorCode::TokenExpired | ErrorCode::InvalidToken
            )
    }

    async fn recover(
        &self,
        _error: &ClassifiedError,
        context: &RecoveryContext,
    ) -> RecoveryOutcome {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let Some(user_id) = context.user_id.as_deref() else {
            return RecoveryOutcome::failed(self.kind(), "Missing user id for credential refresh");
        };

        match self.refresher.refresh_credentials(user_id).await {
            Ok(()) => {
                debug!(user_id, "Credentials refreshed");
                RecoveryOutcome::recovered(self.kind(), None)
            }
            Err(cause) => {
                RecoveryOutcome::failed(self.kind(), format!("Credential refresh failed: {cause}"))
            }
        }
    }

    fn max_attempts(&self) -> u32 {
        CREDENTIAL_REFRESH_MAX_ATTEMPTS
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }
}

/* -------------------------------------------------------------------------- */
/* Rate Limit Backoff */
/* -------------------------------------------------------------------------- */

/// Waits out a rate-limit response
///
/// Uses the server's `Retry-After` when present, otherwise doubles from the
/// base delay with each attempt.
pub struct RateLimitBackoffStrategy {
    base_delay: Duration,
    attempts: AtomicU32,
}

impl Default for RateLimitBackoffStrategy {
    fn default() -> Self {
        Self::with_base_delay(Duration::from_millis(RATE_LIMIT_BASE_DELAY_MS))
    }
}

impl RateLimitBackoffStrategy {
    pub fn with_base_delay(base_delay: Duration) -> Self {
        Self { base_delay, attempts: AtomicU32::new(0) }
    }
}

#[async_trait]
impl RecoveryStrategy for RateLimitBackoffStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RateLimitBackoff
    }

    fn can_recover(&self, error: &ClassifiedError) -> bool {
        error.category() == ErrorCategory::RateLimit && error.is_retryable()
    }

    async fn recover(
        &self,
        error: &ClassifiedError,
        _context: &RecoveryContext,
    ) -> RecoveryOutcome {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = match error.retry_after_ms() {
            Some(retry_after_ms) => Duration::from_millis(retry_after_ms),
            None => doubling_delay(self.base_delay, attempt),
        };

        tokio::time::sleep(delay).await;
        RecoveryOutcome::recovered(self.kind(), Some(delay))
    }

    fn max_attempts(&self) -> u32 {
        RATE_LIMIT_MAX_ATTEMPTS
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }
}

/* -------------------------------------------------------------------------- */
/* Network Retry */
/* -------------------------------------------------------------------------- */

/// Backs off after a retryable network failure or timeout
pub struct NetworkRetryStrategy {
    base_delay: Duration,
    attempts: AtomicU32,
}

impl Default for NetworkRetryStrategy {
    fn default() -> Self {
        Self::with_base_delay(Duration::from_millis(NETWORK_BASE_DELAY_MS))
    }
}

impl NetworkRetryStrategy {
    pub fn with_base_delay(base_delay: Duration) -> Self {
        Self { base_delay, attempts: AtomicU32::new(0) }
    }
}

#[async_trait]
impl RecoveryStrategy for NetworkRetryStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::NetworkRetry
    }

    fn can_recover(&self, error: &ClassifiedError) -> bool {
        matches!(error.category(), ErrorCategory::Network | ErrorCategory::Timeout)
            && error.is_retryable()
    }

    async fn recover(
        &self,
        _error: &ClassifiedError,
        _context: &RecoveryContext,
    ) -> RecoveryOutcome {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = doubling_delay(self.base_delay, attempt);

        tokio::time::sleep(delay).await;
        RecoveryOutcome::recovered(self.kind(), Some(delay))
    }

    fn max_attempts(&self) -> u32 {
        NETWORK_MAX_ATTEMPTS
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }
}

/* -------------------------------------------------------------------------- */
/* Server Error Retry */
/* -------------------------------------------------------------------------- */

/// Retries gateway-style server errors after a fixed delay
///
/// A plain HTTP 500 is never matched.
pub struct ServerErrorRetryStrategy {
    delay: Duration,
    attempts: AtomicU32,
}

impl Default for ServerErrorRetryStrategy {
    fn default() -> Self {
        Self::with_delay(Duration::from_millis(SERVER_ERROR_DELAY_MS))
    }
}

impl ServerErrorRetryStrategy {
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay, attempts: AtomicU32::new(0) }
    }
}

#[async_trait]
impl RecoveryStrategy for ServerErrorRetryStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ServerErrorRetry
    }

    fn can_recover(&self, error: &ClassifiedError) -> bool {
        error.category() == ErrorCategory::ServerError
            && error.is_retryable()
            && error.http_status() != Some(500)
    }

    async fn recover(
        &self,
        _error: &ClassifiedError,
        _context: &RecoveryContext,
    ) -> RecoveryOutcome {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        RecoveryOutcome::recovered(self.kind(), Some(self.delay))
    }

    fn max_attempts(&self) -> u32 {
        SERVER_ERROR_MAX_ATTEMPTS
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }
}
