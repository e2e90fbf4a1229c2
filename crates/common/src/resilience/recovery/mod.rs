//! Attempt-bounded recovery from classified errors
//!
//! A [`RecoveryManager`] holds an ordered list of [`RecoveryStrategy`] trait
//! objects, fixed at construction through [`RecoveryManagerBuilder`]. It
//! works in two modes:
//!
//! - **Decision**: [`RecoveryManager::evaluate_recovery`] performs the
//!   remediation and tells the caller whether to retry
//! - **Retry**: [`RecoveryManager::recover_and_retry`] also re-executes the
//!   failed operation, looping while recovery keeps succeeding
//!
//! Built-in strategies, in default matching order:
//!
//! | Strategy | Matches | Max attempts | Delay |
//! |----------|---------|--------------|-------|
//! | `CredentialRefresh` | Authentication (Unauthorized, TokenExpired, InvalidToken) | 1 | none |
//! | `RateLimitBackoff` | retryable RateLimit | 3 | Retry-After, else 1s doubling |
//! | `NetworkRetry` | retryable Network or Timeout | 3 | 2s doubling |
//! | `ServerErrorRetry` | retryable ServerError except HTTP 500 | 2 | fixed 5s |

mod manager;
mod strategy;
mod types;

pub use manager::{RecoveryManager, RecoveryManagerBuilder};
pub use strategy::{
    CredentialRefreshStrategy, NetworkRetryStrategy, RateLimitBackoffStrategy, RecoveryStrategy,
    ServerErrorRetryStrategy,
};
pub use types::{
    CredentialRefresher, RecoveryContext, RecoveryOutcome, StrategyKind, MAX_ATTEMPTS_REASON,
    NO_STRATEGY_REASON,
};
