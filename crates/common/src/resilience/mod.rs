//! Resilience patterns for calls to a rate-limited remote service
//!
//! This module provides the two runtime halves of the resilience layer:
//! - **Admission Queue**: enforces the remote service's request rate and
//!   concurrency limits, and absorbs rate-limit responses by requeueing
//! - **Recovery Manager**: remediates a subset of classified failures
//!   (expired credentials, rate limits, transient network and server errors)
//!   through pluggable, attempt-bounded strategies
//!
//! Both are plain values meant to be shared behind an `Arc`; one instance per
//! credential scope is built by the application's composition root.
//!
//! ## Layering
//!
//! | Concern | Owner |
//! |---------|-------|
//! | Rate-limit responses | `AdmissionQueue` (requeue with backoff, bounded) |
//! | Expired credentials | `RecoveryManager` (`CredentialRefresh`) |
//! | Network / timeout / gateway errors | `RecoveryManager`, then the caller's retry loop |
//!
//! Once the queue gives up on a rate-limited operation it surfaces the error
//! as non-retryable, so no outer layer retries it again.

pub mod admission;
pub mod recovery;

pub use admission::{AdmissionError, AdmissionQueue, AdmissionResult, AdmissionTicket};
pub use recovery::{
    CredentialRefreshStrategy, CredentialRefresher, NetworkRetryStrategy, RateLimitBackoffStrategy,
    RecoveryContext, RecoveryManager, RecoveryManagerBuilder, RecoveryOutcome, RecoveryStrategy,
    ServerErrorRetryStrategy, StrategyKind,
};
