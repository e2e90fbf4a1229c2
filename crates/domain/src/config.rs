//! Application configuration structures
//!
//! Every section deserializes with defaults, so a config file only needs to
//! name the values it overrides.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_MAX_BACKOFF_DELAY_MS, DEFAULT_MAX_CONCURRENT_REQUESTS,
    DEFAULT_MAX_RATE_LIMIT_REQUEUES, DEFAULT_MAX_REQUESTS_PER_SECOND, DEFAULT_PRIORITY,
    DEFAULT_QUEUE_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY_MS,
    NETWORK_BASE_DELAY_MS, RATE_LIMIT_BASE_DELAY_MS, SERVER_ERROR_DELAY_MS,
};

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub rate_limit: RateLimitConfig,
    pub recovery: RecoveryConfig,
}

/* -------------------------------------------------------------------------- */
/* Client */
/* -------------------------------------------------------------------------- */

/// Remote service and per-call settings for the resilient client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL that endpoints are joined onto
    pub base_url: String,

    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,

    /// Whole-request retries after the first attempt
    pub retries: u32,

    /// Base delay of the exponential retry backoff
    pub retry_delay_ms: u64,

    /// Admission priority used when a call does not name one
    pub default_priority: i32,

    pub user_agent: String,

    /// Extra headers sent with every request (API version headers and such)
    pub default_headers: BTreeMap<String, String>,

    /// Identity handed to the credential refresher
    pub user_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.example.com/v1".to_string(),
            timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            default_priority: DEFAULT_PRIORITY,
            user_agent: concat!("apiguard/", env!("CARGO_PKG_VERSION")).to_string(),
            default_headers: BTreeMap::new(),
            user_id: None,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/* -------------------------------------------------------------------------- */
/* Rate Limiter */
/* -------------------------------------------------------------------------- */

/// Limits enforced by the admission queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Admissions allowed per trailing second, in-flight ones included
    ///
    /// Operations still executing count against this limit, so at most
    /// `max_requests_per_second` operations can be in flight at once.
    pub max_requests_per_second: u32,

    /// Operations executing at the same time
    ///
    /// Only binds when lower than `max_requests_per_second`; otherwise the
    /// per-second limit caps concurrency first.
    pub max_concurrent_requests: u32,

    /// How long an operation may wait for admission
    pub queue_timeout_ms: u64,

    /// Growth factor of the rate-limit backoff
    pub backoff_multiplier: f64,

    /// Ceiling of the rate-limit backoff, applied to `Retry-After` as well
    pub max_backoff_delay_ms: u64,

    /// Requeues after a rate-limit response before the error is surfaced
    pub max_rate_limit_requeues: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: DEFAULT_MAX_REQUESTS_PER_SECOND,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            queue_timeout_ms: DEFAULT_QUEUE_TIMEOUT_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_backoff_delay_ms: DEFAULT_MAX_BACKOFF_DELAY_MS,
            max_rate_limit_requeues: DEFAULT_MAX_RATE_LIMIT_REQUEUES,
        }
    }
}

impl RateLimitConfig {
    /// Validate the configuration
    ///
    /// # Errors
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_requests_per_second == 0 {
            return Err("max_requests_per_second must be greater than 0".to_string());
        }
        if self.max_concurrent_requests == 0 {
            return Err("max_concurrent_requests must be greater than 0".to_string());
        }
        if self.queue_timeout_ms == 0 {
            return Err("queue_timeout_ms must be greater than 0".to_string());
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err("backoff_multiplier must be a finite number >= 1.0".to_string());
        }
        if self.max_backoff_delay_ms == 0 {
            return Err("max_backoff_delay_ms must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub fn max_backoff_delay(&self) -> Duration {
        Duration::from_millis(self.max_backoff_delay_ms)
    }

    /// Merge a patch over this config without validating the result
    #[must_use]
    pub fn merged(&self, patch: &RateLimitConfigPatch) -> Self {
        Self {
            max_requests_per_second: patch
                .max_requests_per_second
                .unwrap_or(self.max_requests_per_second),
            max_concurrent_requests: patch
                .max_concurrent_requests
                .unwrap_or(self.max_concurrent_requests),
            queue_timeout_ms: patch.queue_timeout_ms.unwrap_or(self.queue_timeout_ms),
            backoff_multiplier: patch.backoff_multiplier.unwrap_or(self.backoff_multiplier),
            max_backoff_delay_ms: patch.max_backoff_delay_ms.unwrap_or(self.max_backoff_delay_ms),
            max_rate_limit_requeues: patch
                .max_rate_limit_requeues
                .unwrap_or(self.max_rate_limit_requeues),
        }
    }
}

/// Partial rate limiter update; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requests_per_second: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_requests: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_backoff_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rate_limit_requeues: Option<u32>,
}

impl RateLimitConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/* -------------------------------------------------------------------------- */
/* Recovery */
/* -------------------------------------------------------------------------- */

/// Recovery manager settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// When false the client never consults the recovery manager
    pub enabled: bool,
    pub rate_limit_base_delay_ms: u64,
    pub network_base_delay_ms: u64,
    pub server_error_delay_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_limit_base_delay_ms: RATE_LIMIT_BASE_DELAY_MS,
            network_base_delay_ms: NETWORK_BASE_DELAY_MS,
            server_error_delay_ms: SERVER_ERROR_DELAY_MS,
        }
    }
}
