use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use apiguard_domain::{ClassifiedError, RecoveryConfig};
use parking_lot::Mutex;
use tracing::{info, warn};

use super::strategy::{
    CredentialRefreshStrategy, NetworkRetryStrategy, RateLimitBackoffStrategy, RecoveryStrategy,
    ServerErrorRetryStrategy,
};
use super::types::{
    CredentialRefresher, RecoveryContext, RecoveryOutcome, StrategyKind, MAX_ATTEMPTS_REASON,
    NO_STRATEGY_REASON,
};

/// Matches classified errors to recovery strategies and bounds how often
/// each error signature may be recovered
///
/// Attempts are counted per signature (`"<category>-<code>"`) in a ledger
/// shared by every caller of the manager. Within one
/// [`recover_and_retry`](RecoveryManager::recover_and_retry) call the ledger
/// bounds how often a signature is remediated; when that call returns, with
/// either outcome, the entries it charged are released so the next request
/// starts with a full budget. Entries charged through
/// [`evaluate_recovery`](RecoveryManager::evaluate_recovery) stay until
/// [`RecoveryManager::reset`].
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use apiguard_common::resilience::{CredentialRefresher, RecoveryManager, StrategyKind};
///
/// struct Store;
///
/// #[async_trait::async_trait]
/// impl CredentialRefresher for Store {
///     async fn refresh_credentials(&self, _user_id: &str) -> Result<(), String> {
///         Ok(())
///     }
/// }
///
/// let manager = RecoveryManager::builder().with_default_strategies(Arc::new(Store)).build();
/// assert_eq!(manager.strategies()[0], StrategyKind::CredentialRefresh);
/// ```
pub struct RecoveryManager {
    strategies: Vec<Arc<dyn RecoveryStrategy>>,
    ledger: Mutex<HashMap<String, u32>>,
}

impl RecoveryManager {
    pub fn builder() -> RecoveryManagerBuilder {
        RecoveryManagerBuilder::new()
    }

    /// Kinds of the registered strategies, in matching order
    pub fn strategies(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|strategy| strategy.kind()).collect()
    }

    /// Whether any strategy matches the error (ignores the attempt ledger)
    pub fn can_recover(&self, error: &ClassifiedError) -> bool {
        self.find_strategy(error).is_some()
    }

    /// Recoveries already spent on the error's signature
    pub fn attempts_for(&self, error: &ClassifiedError) -> u32 {
        self.ledger.lock().get(&error.signature()).copied().unwrap_or(0)
    }

    /// Decide on and perform the remediation for one error
    ///
    /// Runs the first matching strategy if the signature still has attempts
    /// left. Does not run the failed operation again.
    pub async fn evaluate_recovery(
        &self,
        error: &ClassifiedError,
        context: &RecoveryContext,
    ) -> RecoveryOutcome {
        self.charge_and_recover(error, context).await.0
    }

    /// Returns the outcome and whether the ledger was charged
    async fn charge_and_recover(
        &self,
        error: &ClassifiedError,
        context: &RecoveryContext,
    ) -> (RecoveryOutcome, bool) {
        let Some(strategy) = self.find_strategy(error) else {
            return (RecoveryOutcome::refused(None, NO_STRATEGY_REASON), false);
        };

        let signature = error.signature();
        let attempt = {
            let mut ledger = self.ledger.lock();
            let attempts = ledger.entry(signature.clone()).or_insert(0);
            if *attempts >= strategy.max_attempts() {
                None
            } else {
                *attempts += 1;
                Some(*attempts)
            }
        };

        let Some(attempt) = attempt else {
            warn!(
                signature = %signature,
                strategy = %strategy.kind(),
                max_attempts = strategy.max_attempts(),
                "Recovery refused, attempts exhausted"
            );
            let outcome = RecoveryOutcome::refused(Some(strategy.kind()), MAX_ATTEMPTS_REASON);
            return (outcome, false);
        };

        let outcome = strategy.recover(error, context).await;

        if outcome.should_retry() {
            info!(
                signature = %signature,
                strategy = %strategy.kind(),
                attempt,
                delay_ms = outcome.delay.map_or(0, |delay| delay.as_millis() as u64),
                "Recovery performed"
            );
        } else {
            warn!(
                signature = %signature,
                strategy = %strategy.kind(),
                attempt,
                reason = outcome.reason.as_deref().unwrap_or_default(),
                "Recovery failed"
            );
        }

        (outcome, true)
    }

    /// Recover from `error` and run `operation` again until it succeeds or
    /// recovery is no longer possible
    ///
    /// Ledger entries charged by this call are released before it returns.
    ///
    /// # Errors
    /// Returns the most recent error, unchanged, once no strategy matches, a
    /// remediation fails, or the signature's attempts are exhausted.
    pub async fn recover_and_retry<T, F, Fut>(
        &self,
        error: ClassifiedError,
        mut operation: F,
        context: &RecoveryContext,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        let mut current = error;
        let mut touched: HashSet<String> = HashSet::new();
        let mut used: Vec<Arc<dyn RecoveryStrategy>> = Vec::new();

        loop {
            if let Some(strategy) = self.find_strategy(&current) {
                if !used.iter().any(|seen| Arc::ptr_eq(seen, &strategy)) {
                    used.push(strategy);
                }
            }

            let (outcome, charged) = self.charge_and_recover(&current, context).await;
            if charged {
                touched.insert(current.signature());
            }
            if !outcome.should_retry() {
                self.release(&touched, &used);
                return Err(current);
            }

            match operation().await {
                Ok(value) => {
                    self.release(&touched, &used);
                    return Ok(value);
                }
                Err(next) => current = next,
            }
        }
    }

    /// Clear the ledger and every strategy's attempt counter
    pub fn reset(&self) {
        self.ledger.lock().clear();
        for strategy in &self.strategies {
            strategy.reset();
        }
    }

    fn find_strategy(&self, error: &ClassifiedError) -> Option<Arc<dyn RecoveryStrategy>> {
        self.strategies.iter().find(|strategy| strategy.can_recover(error)).cloned()
    }

    fn release(&self, signatures: &HashSet<String>, used: &[Arc<dyn RecoveryStrategy>]) {
        {
            let mut ledger = self.ledger.lock();
            for signature in signatures {
                ledger.remove(signature);
            }
        }
        for strategy in used {
            strategy.reset();
        }
    }
}

impl std::fmt::Debug for RecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryManager")
            .field("strategies", &self.strategies())
            .field("ledger", &*self.ledger.lock())
            .finish()
    }
}

/// Builder for [`RecoveryManager`]
///
/// Strategies are matched in the order they are added.
#[derive(Default)]
pub struct RecoveryManagerBuilder {
    strategies: Vec<Arc<dyn RecoveryStrategy>>,
}

impl RecoveryManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the built-in strategies with their default delays:
    /// credential refresh, rate-limit backoff, network retry, server error
    /// retry
    #[must_use]
    pub fn with_default_strategies(self, refresher: Arc<dyn CredentialRefresher>) -> Self {
        self.with_configured_strategies(refresher, &RecoveryConfig::default())
    }

    /// Append the built-in strategies with delays taken from configuration
    #[must_use]
    pub fn with_configured_strategies(
        mut self,
        refresher: Arc<dyn CredentialRefresher>,
        config: &RecoveryConfig,
    ) -> Self {
        self.strategies.push(Arc::new(CredentialRefreshStrategy::new(refresher)));
        self.with_retry_strategies(config)
    }

    /// Append only the delay-based strategies (rate-limit backoff, network
    /// retry, server error retry), for callers without refreshable
    /// credentials
    #[must_use]
    pub fn with_retry_strategies(mut self, config: &RecoveryConfig) -> Self {
        self.strategies.push(Arc::new(RateLimitBackoffStrategy::with_base_delay(
            Duration::from_millis(config.rate_limit_base_delay_ms),
        )));
        self.strategies.push(Arc::new(NetworkRetryStrategy::with_base_delay(
            Duration::from_millis(config.network_base_delay_ms),
        )));
        self.strategies.push(Arc::new(ServerErrorRetryStrategy::with_delay(
            Duration::from_millis(config.server_error_delay_ms),
        )));
        self
    }

    /// Append one strategy after those already registered
    #[must_use]
    pub fn add_strategy(mut self, strategy: impl RecoveryStrategy + 'static) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    /// Replace all registered strategies
    #[must_use]
    pub fn with_strategies(mut self, strategies: Vec<Arc<dyn RecoveryStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn build(self) -> RecoveryManager {
        RecoveryManager { strategies: self.strategies, ledger: Mutex::new(HashMap::new()) }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use apiguard_domain::{ErrorCategory, ErrorCode};
    use async_trait::async_trait;

    use super::*;

    struct CountingRefresher {
        calls: AtomicU32,
    }

    #[async_trait]
    impl CredentialRefresher for CountingRefresher {
        async fn refresh_credentials(&self, _user_id: &str) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn manager() -> (RecoveryManager, Arc<CountingRefresher>) {
        let refresher = Arc::new(CountingRefresher { calls: AtomicU32::new(0) });
        let config = RecoveryConfig {
            enabled: true,
            rate_limit_base_delay_ms: 10,
            network_base_delay_ms: 10,
            server_error_delay_ms: 10,
        };
        let manager =
            RecoveryManager::builder().with_configured_strategies(refresher.clone(), &config).build();
        (manager, refresher)
    }

    fn expired_token() -> ClassifiedError {
        ClassifiedError::new(ErrorCategory::Authentication, ErrorCode::TokenExpired, "expired")
            .with_status(401)
    }

    #[test]
    fn test_default_strategy_order_is_fixed() {
        let (manager, _) = manager();
        assert_eq!(
            manager.strategies(),
            vec![
                StrategyKind::CredentialRefresh,
                StrategyKind::RateLimitBackoff,
                StrategyKind::NetworkRetry,
                StrategyKind::ServerErrorRetry,
            ]
        );
    }

    #[test]
    fn test_retry_strategies_skip_credential_refresh() {
        let manager =
            RecoveryManager::builder().with_retry_strategies(&RecoveryConfig::default()).build();
        let err = ClassifiedError::new(ErrorCategory::Authentication, ErrorCode::Unauthorized, "x");

        assert_eq!(manager.strategies().len(), 3);
        assert!(!manager.can_recover(&err));
    }

    #[tokio::test]
    async fn test_unmatched_error_is_refused() {
        let (manager, _) = manager();
        let err = ClassifiedError::new(ErrorCategory::Validation, ErrorCode::BadRequest, "bad");

        let outcome = manager.evaluate_recovery(&err, &RecoveryContext::new()).await;

        assert!(!outcome.success);
        assert!(!outcome.should_retry);
        assert_eq!(outcome.reason.as_deref(), Some(NO_STRATEGY_REASON));
        assert_eq!(manager.attempts_for(&err), 0);
    }

    #[tokio::test]
    async fn test_credential_refresh_is_allowed_once_per_signature() {
        let (manager, refresher) = manager();
        let context = RecoveryContext::new().with_user_id("user-1");

        let first = manager.evaluate_recovery(&expired_token(), &context).await;
        assert!(first.success && first.should_retry);
        assert_eq!(first.strategy, Some(StrategyKind::CredentialRefresh));

        let second = manager.evaluate_recovery(&expired_token(), &context).await;
        assert!(!second.success);
        assert_eq!(second.reason.as_deref(), Some(MAX_ATTEMPTS_REASON));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recover_and_retry_clears_ledger_on_success() {
        let (manager, _) = manager();
        let context = RecoveryContext::new().with_user_id("user-1");

        let value = manager
            .recover_and_retry(expired_token(), || async { Ok::<_, ClassifiedError>(7) }, &context)
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(manager.attempts_for(&expired_token()), 0);
    }

    #[tokio::test]
    async fn test_recover_and_retry_returns_latest_error_when_refused() {
        let (manager, _) = manager();
        let context = RecoveryContext::new().with_user_id("user-1");
        let forbidden =
            ClassifiedError::new(ErrorCategory::Authorization, ErrorCode::Forbidden, "nope");

        let result = manager
            .recover_and_retry(
                expired_token(),
                || {
                    let forbidden = forbidden.clone();
                    async move { Err::<(), _>(forbidden) }
                },
                &context,
            )
            .await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_recover_and_retry_releases_ledger_on_failure() {
        let (manager, refresher) = manager();
        let context = RecoveryContext::new().with_user_id("user-1");

        let result = manager
            .recover_and_retry(expired_token(), || async { Err::<(), _>(expired_token()) }, &context)
            .await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::TokenExpired);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.attempts_for(&expired_token()), 0);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let (manager, _) = manager();
        let context = RecoveryContext::new().with_user_id("user-1");
        manager.evaluate_recovery(&expired_token(), &context).await;
        assert_eq!(manager.attempts_for(&expired_token()), 1);

        manager.reset();
        assert_eq!(manager.attempts_for(&expired_token()), 0);
        manager.reset();
        assert_eq!(manager.attempts_for(&expired_token()), 0);
    }
}
