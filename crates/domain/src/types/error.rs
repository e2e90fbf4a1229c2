//! Classified error value and its taxonomy
//!
//! Every failure of a call to the remote service is normalized into a
//! [`ClassifiedError`]: a category (what went wrong), a severity (how loudly
//! to log it), a stable code, and retry metadata. The value is immutable once
//! built; the `with_*` methods consume the value and return a new one, so they
//! are only usable while constructing.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::constants::CONTEXT_RATE_LIMIT_REQUEUES;

/* -------------------------------------------------------------------------- */
/* Taxonomy */
/* -------------------------------------------------------------------------- */

/// What kind of failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Authentication,
    Authorization,
    RateLimit,
    Network,
    Validation,
    NotFound,
    ServerError,
    ClientError,
    Timeout,
    Unknown,
}

impl ErrorCategory {
    /// Stable string form, used in error signatures and log fields
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "Authentication",
            Self::Authorization => "Authorization",
            Self::RateLimit => "RateLimit",
            Self::Network => "Network",
            Self::Validation => "Validation",
            Self::NotFound => "NotFound",
            Self::ServerError => "ServerError",
            Self::ClientError => "ClientError",
            Self::Timeout => "Timeout",
            Self::Unknown => "Unknown",
        }
    }

    /// Fixed severity of the category.
    ///
    /// Severity only drives logging emphasis, never control flow.
    pub const fn severity(self) -> ErrorSeverity {
        match self {
            Self::Validation | Self::NotFound => ErrorSeverity::Low,
            Self::RateLimit | Self::Network | Self::ClientError | Self::Timeout => {
                ErrorSeverity::Medium
            }
            Self::Authentication | Self::Authorization | Self::Unknown => ErrorSeverity::High,
            Self::ServerError => ErrorSeverity::Critical,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How serious an error is, for logging and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// Stable machine-readable error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    TokenExpired,
    InvalidToken,
    Forbidden,
    NotFound,
    RateLimited,
    InternalServerError,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
    ServerError,
    ClientError,
    Timeout,
    NetworkError,
    QueueTimeout,
    QueueCleared,
    InvalidResponse,
    Unknown,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "BadRequest",
            Self::Unauthorized => "Unauthorized",
            Self::TokenExpired => "TokenExpired",
            Self::InvalidToken => "InvalidToken",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "NotFound",
            Self::RateLimited => "RateLimited",
            Self::InternalServerError => "InternalServerError",
            Self::BadGateway => "BadGateway",
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::GatewayTimeout => "GatewayTimeout",
            Self::ServerError => "ServerError",
            Self::ClientError => "ClientError",
            Self::Timeout => "Timeout",
            Self::NetworkError => "NetworkError",
            Self::QueueTimeout => "QueueTimeout",
            Self::QueueCleared => "QueueCleared",
            Self::InvalidResponse => "InvalidResponse",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/* -------------------------------------------------------------------------- */
/* Classified Error */
/* -------------------------------------------------------------------------- */

/// Normalized failure of a call to the remote service
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("[{category}/{code}] {message}")]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    category: ErrorCategory,
    severity: ErrorSeverity,
    code: ErrorCode,
    message: String,
    http_status: Option<u16>,
    retryable: bool,
    retry_after_ms: Option<u64>,
    context: BTreeMap<String, Value>,
    request_id: Option<String>,
    timestamp: DateTime<Utc>,
}

impl ClassifiedError {
    /// Create a non-retryable error with the category's fixed severity
    pub fn new(category: ErrorCategory, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            category,
            severity: category.severity(),
            code,
            message: message.into(),
            http_status: None,
            retryable: false,
            retry_after_ms: None,
            context: BTreeMap::new(),
            request_id: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    #[must_use]
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    #[must_use]
    pub fn with_retry_after_ms(mut self, retry_after_ms: u64) -> Self {
        self.retry_after_ms = Some(retry_after_ms);
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Derive a terminal copy of a rate-limit error after the admission
    /// queue has spent its requeue budget.
    ///
    /// The copy is non-retryable so that no upper layer retries it again.
    #[must_use]
    pub fn into_exhausted(self, requeues: u32) -> Self {
        self.retryable(false).with_context(CONTEXT_RATE_LIMIT_REQUEUES, requeues)
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        self.retry_after_ms
    }

    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Key used to count recovery attempts: `"<category>-<code>"`
    pub fn signature(&self) -> String {
        format!("{}-{}", self.category.as_str(), self.code.as_str())
    }
}
