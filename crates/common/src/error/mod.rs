//! Error classification for calls to the remote service
//!
//! This module provides the classification half of the resilience layer:
//!
//! 1. **`classifier`**: pure functions that turn an HTTP response or a
//!    transport failure into a [`ClassifiedError`]
//!
//! 2. **`ErrorClassification` trait**: a standard interface for asking any
//!    error of this workspace whether it can be retried, how severe it is and
//!    how long to wait before retrying
//!
//! ## ErrorClassification Trait
//!
//! - **`is_retryable()`**: Can this operation be retried?
//! - **`severity()`**: How serious is this error? (Low/Medium/High/Critical)
//! - **`is_critical()`**: Does this require immediate attention?
//! - **`retry_after()`**: Suggested retry delay (if applicable)
//!
//! ## Examples
//!
//! ```rust
//! use apiguard_common::error::classifier::classify_response;
//! use apiguard_common::error::ErrorClassification;
//!
//! let headers: Vec<(String, String)> = vec![("Retry-After".into(), "2".into())];
//! let err = classify_response(429, "Too Many Requests", "", &headers);
//!
//! assert!(err.is_retryable());
//! assert_eq!(err.retry_after().map(|d| d.as_millis()), Some(2000));
//! ```

use std::time::Duration;

use apiguard_domain::{ClassifiedError, ErrorSeverity};

pub mod classifier;

/// Standard classification interface for errors
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient: rate limiting, network failures,
    /// gateway errors and timeouts.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    ///
    /// Used for monitoring, alerting, and logging decisions.
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Get the suggested retry delay if applicable
    ///
    /// Returns `Some(Duration)` when the remote service named one (e.g. from a
    /// Retry-After header), or `None` if no specific delay is suggested.
    fn retry_after(&self) -> Option<Duration>;
}

impl ErrorClassification for ClassifiedError {
    fn is_retryable(&self) -> bool {
        ClassifiedError::is_retryable(self)
    }

    fn severity(&self) -> ErrorSeverity {
        ClassifiedError::severity(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms().map(Duration::from_millis)
    }
}
