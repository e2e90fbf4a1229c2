//! HTTP response and transport failure classification
//!
//! Both entry points are total: every input maps to exactly one
//! [`ClassifiedError`] and nothing here fails or panics.
//!
//! | Status | Category | Code | Retryable |
//! |--------|----------|------|-----------|
//! | 400 | Validation | BadRequest | no |
//! | 401 | Authentication | Unauthorized / TokenExpired / InvalidToken | no |
//! | 403 | Authorization | Forbidden | no |
//! | 404 | NotFound | NotFound | no |
//! | 429 | RateLimit | RateLimited | yes |
//! | 500 | ServerError | InternalServerError | no |
//! | 502 | ServerError | BadGateway | yes |
//! | 503 | ServerError | ServiceUnavailable | yes |
//! | 504 | Timeout | GatewayTimeout | yes |
//! | other 5xx | ServerError | ServerError | yes |
//! | other 4xx | ClientError | ClientError | no |
//! | anything else | Unknown | Unknown | no |

use std::collections::{BTreeMap, HashMap};

use apiguard_domain::constants::{
    CONTEXT_CAUSE, CONTEXT_RESPONSE_DATA, CONTEXT_STATUS_TEXT, REQUEST_ID_HEADER,
    RETRY_AFTER_HEADER,
};
use apiguard_domain::{ClassifiedError, ErrorCategory, ErrorCode};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Case-insensitive access to response headers
///
/// Implemented for the plain collections a caller is likely to hold, so the
/// classifier does not depend on any HTTP library.
pub trait HeaderLookup {
    fn header(&self, name: &str) -> Option<&str>;
}

impl HeaderLookup for [(String, String)] {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
    }
}

impl HeaderLookup for Vec<(String, String)> {
    fn header(&self, name: &str) -> Option<&str> {
        self.as_slice().header(name)
    }
}

impl HeaderLookup for BTreeMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
    }
}

impl HeaderLookup for HashMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
    }
}

/// What the transport layer knows about a failure that produced no response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionHint {
    Timeout,
    Network,
    Unknown,
}

/// Classify a non-success HTTP response
pub fn classify_response<H>(
    status: u16,
    status_text: &str,
    body: &str,
    headers: &H,
) -> ClassifiedError
where
    H: HeaderLookup + ?Sized,
{
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let (category, code, retryable) = status_mapping(status, parsed.as_ref(), body);
    let message = response_message(status, status_text, parsed.as_ref());

    let response_data = match parsed {
        Some(value) => value,
        None => Value::String(body.to_string()),
    };

    let mut error = ClassifiedError::new(category, code, message)
        .with_status(status)
        .retryable(retryable)
        .with_context(CONTEXT_RESPONSE_DATA, response_data)
        .with_context(CONTEXT_STATUS_TEXT, status_text);

    if category == ErrorCategory::RateLimit {
        if let Some(delay_ms) = headers.header(RETRY_AFTER_HEADER).and_then(parse_retry_after_ms) {
            error = error.with_retry_after_ms(delay_ms);
        }
    }

    if let Some(request_id) = headers.header(REQUEST_ID_HEADER) {
        error = error.with_request_id(request_id);
    }

    error
}

/// Classify a failure that happened before any response was received
pub fn classify_exception(error_message: &str, hint: ExceptionHint) -> ClassifiedError {
    let (category, code, retryable) = match hint {
        ExceptionHint::Timeout => (ErrorCategory::Timeout, ErrorCode::Timeout, true),
        ExceptionHint::Network => (ErrorCategory::Network, ErrorCode::NetworkError, true),
        ExceptionHint::Unknown => (ErrorCategory::Unknown, ErrorCode::Unknown, false),
    };

    ClassifiedError::new(category, code, error_message)
        .retryable(retryable)
        .with_context(CONTEXT_CAUSE, error_message)
}

/// Parse a `Retry-After` value into milliseconds.
///
/// Accepts delta-seconds (fractions allowed) or an HTTP-date. Dates in the
/// past yield zero.
pub fn parse_retry_after_ms(value: &str) -> Option<u64> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<f64>() {
        if !seconds.is_finite() || seconds < 0.0 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = (seconds * 1000.0).round() as u64;
        return Some(millis);
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let remaining = date.with_timezone(&Utc) - Utc::now();
    Some(u64::try_from(remaining.num_milliseconds()).unwrap_or(0))
}

fn status_mapping(
    status: u16,
    parsed: Option<&Value>,
    body: &str,
) -> (ErrorCategory, ErrorCode, bool) {
    match status {
        400 => (ErrorCategory::Validation, ErrorCode::BadRequest, false),
        401 => (ErrorCategory::Authentication, auth_code(parsed, body), false),
        403 => (ErrorCategory::Authorization, ErrorCode::Forbidden, false),
        404 => (ErrorCategory::NotFound, ErrorCode::NotFound, false),
        429 => (ErrorCategory::RateLimit, ErrorCode::RateLimited, true),
        // A bare 500 usually means the request itself broke the server
        500 => (ErrorCategory::ServerError, ErrorCode::InternalServerError, false),
        502 => (ErrorCategory::ServerError, ErrorCode::BadGateway, true),
        503 => (ErrorCategory::ServerError, ErrorCode::ServiceUnavailable, true),
        504 => (ErrorCategory::Timeout, ErrorCode::GatewayTimeout, true),
        501..=599 => (ErrorCategory::ServerError, ErrorCode::ServerError, true),
        402..=499 => (ErrorCategory::ClientError, ErrorCode::ClientError, false),
        _ => (ErrorCategory::Unknown, ErrorCode::Unknown, false),
    }
}

fn auth_code(parsed: Option<&Value>, body: &str) -> ErrorCode {
    let hint = parsed
        .and_then(|value| {
            ["code", "error"].iter().find_map(|key| value.get(*key).and_then(Value::as_str))
        })
        .unwrap_or(body)
        .to_ascii_lowercase();

    if hint.contains("expired") {
        ErrorCode::TokenExpired
    } else if hint.contains("invalid") {
        ErrorCode::InvalidToken
    } else {
        ErrorCode::Unauthorized
    }
}

fn response_message(status: u16, status_text: &str, parsed: Option<&Value>) -> String {
    if let Some(message) = parsed.and_then(|value| value.get("message")).and_then(Value::as_str) {
        if !message.is_empty() {
            return message.to_string();
        }
    }
    if !status_text.is_empty() {
        return status_text.to_string();
    }
    format!("HTTP {status}")
}
