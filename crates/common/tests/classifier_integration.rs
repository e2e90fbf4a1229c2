//! Integration tests for `apiguard_common::error`.
//!
//! These suites validate the classification contract seen by callers: the
//! status table, retry metadata, severity through `ErrorClassification`, and
//! the serialized shape handed to logs and admin surfaces.

use std::collections::HashMap;
use std::time::Duration;

use apiguard_common::{classify_exception, classify_response, ErrorClassification, ExceptionHint};
use apiguard_domain::{ClassifiedError, ErrorCategory, ErrorCode, ErrorSeverity};
use serde_json::{json, Value};

fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect()
}

/// Validates the retry and severity contract for every mapped status.
///
/// Assertions:
/// - Confirms the category, code and retryability of each status.
/// - Confirms severity follows the category, never the status.
#[test]
fn test_status_contract_matrix() {
    let cases = [
        (400, ErrorCategory::Validation, ErrorCode::BadRequest, false, ErrorSeverity::Low),
        (401, ErrorCategory::Authentication, ErrorCode::Unauthorized, false, ErrorSeverity::High),
        (403, ErrorCategory::Authorization, ErrorCode::Forbidden, false, ErrorSeverity::High),
        (404, ErrorCategory::NotFound, ErrorCode::NotFound, false, ErrorSeverity::Low),
        (409, ErrorCategory::ClientError, ErrorCode::ClientError, false, ErrorSeverity::Medium),
        (422, ErrorCategory::ClientError, ErrorCode::ClientError, false, ErrorSeverity::Medium),
        (429, ErrorCategory::RateLimit, ErrorCode::RateLimited, true, ErrorSeverity::Medium),
        (500, ErrorCategory::ServerError, ErrorCode::InternalServerError, false, ErrorSeverity::Critical),
        (502, ErrorCategory::ServerError, ErrorCode::BadGateway, true, ErrorSeverity::Critical),
        (503, ErrorCategory::ServerError, ErrorCode::ServiceUnavailable, true, ErrorSeverity::Critical),
        (504, ErrorCategory::Timeout, ErrorCode::GatewayTimeout, true, ErrorSeverity::Medium),
        (599, ErrorCategory::ServerError, ErrorCode::ServerError, true, ErrorSeverity::Critical),
        (0, ErrorCategory::Unknown, ErrorCode::Unknown, false, ErrorSeverity::High),
    ];

    for (status, category, code, retryable, severity) in cases {
        let err = classify_response(status, "", "", &headers(&[]));

        assert_eq!(err.category(), category, "status {status}");
        assert_eq!(err.code(), code, "status {status}");
        assert_eq!(ErrorClassification::is_retryable(&err), retryable, "status {status}");
        assert_eq!(ErrorClassification::severity(&err), severity, "status {status}");
        assert_eq!(err.is_critical(), severity == ErrorSeverity::Critical, "status {status}");
    }
}

/// Validates that a 429 carries the server's Retry-After as a duration and
/// that other statuses ignore the header.
#[test]
fn test_retry_after_only_for_rate_limits() {
    let retry = headers(&[("RETRY-AFTER", "0.25")]);

    let limited = classify_response(429, "Too Many Requests", "", &retry);
    assert_eq!(limited.retry_after(), Some(Duration::from_millis(250)));

    let unavailable = classify_response(503, "Service Unavailable", "", &retry);
    assert_eq!(unavailable.retry_after(), None);

    let unparseable = classify_response(429, "Too Many Requests", "", &headers(&[("Retry-After", "later")]));
    assert_eq!(unparseable.retry_after(), None);
    assert!(unparseable.is_retryable());
}

/// Validates header lookup works for every supported header collection.
#[test]
fn test_header_collections_are_interchangeable() {
    let mut map = HashMap::new();
    map.insert("x-request-id".to_string(), "abc".to_string());
    map.insert("retry-after".to_string(), "3".to_string());

    let from_map = classify_response(429, "Too Many Requests", "", &map);
    let from_slice =
        classify_response(429, "Too Many Requests", "", headers(&[("X-Request-Id", "abc"), ("Retry-After", "3")]).as_slice());

    assert_eq!(from_map.request_id(), Some("abc"));
    assert_eq!(from_slice.request_id(), Some("abc"));
    assert_eq!(from_map.retry_after_ms(), from_slice.retry_after_ms());
}

/// Validates the expired-token refinement used by credential refresh.
#[test]
fn test_unauthorized_refinement() {
    let cases = [
        (r#"{"code":"TOKEN_EXPIRED","message":"Session expired"}"#, ErrorCode::TokenExpired, "Session expired"),
        (r#"{"error":"invalid_grant"}"#, ErrorCode::InvalidToken, "Unauthorized"),
        ("access token is invalid", ErrorCode::InvalidToken, "Unauthorized"),
        (r#"{"message":"Who are you?"}"#, ErrorCode::Unauthorized, "Who are you?"),
    ];

    for (body, code, message) in cases {
        let err = classify_response(401, "Unauthorized", body, &headers(&[]));
        assert_eq!(err.category(), ErrorCategory::Authentication);
        assert_eq!(err.code(), code, "body {body}");
        assert_eq!(err.message(), message, "body {body}");
        assert!(!err.is_retryable());
    }
}

/// Validates transport failures map by hint and keep their cause.
#[test]
fn test_exception_hints() {
    let cases = [
        (ExceptionHint::Timeout, ErrorCategory::Timeout, ErrorCode::Timeout, true),
        (ExceptionHint::Network, ErrorCategory::Network, ErrorCode::NetworkError, true),
        (ExceptionHint::Unknown, ErrorCategory::Unknown, ErrorCode::Unknown, false),
    ];

    for (hint, category, code, retryable) in cases {
        let err = classify_exception("socket hang up", hint);
        assert_eq!(err.category(), category);
        assert_eq!(err.code(), code);
        assert_eq!(err.is_retryable(), retryable);
        assert_eq!(err.message(), "socket hang up");
        assert_eq!(err.http_status(), None);
        assert_eq!(err.retry_after(), None);
    }
}

/// Validates the serialized shape of a classified error.
///
/// Assertions:
/// - Confirms camelCase field names.
/// - Confirms the response body is embedded as JSON when it parses.
/// - Confirms the value deserializes back unchanged.
#[test]
fn test_serialized_shape() {
    let err = classify_response(
        429,
        "Too Many Requests",
        r#"{"message":"Rate limited","limit":3}"#,
        &headers(&[("Retry-After", "1"), ("X-Request-Id", "req-9")]),
    );

    let value = serde_json::to_value(&err).unwrap();
    assert_eq!(value["category"], "RateLimit");
    assert_eq!(value["code"], "RateLimited");
    assert_eq!(value["severity"], "Medium");
    assert_eq!(value["httpStatus"], 429);
    assert_eq!(value["retryable"], true);
    assert_eq!(value["retryAfterMs"], 1000);
    assert_eq!(value["requestId"], "req-9");
    assert_eq!(value["context"]["responseData"], json!({"message": "Rate limited", "limit": 3}));
    assert_eq!(value["context"]["statusText"], Value::from("Too Many Requests"));

    let back: ClassifiedError = serde_json::from_value(value).unwrap();
    assert_eq!(back, err);
}

/// Validates errors with the same category and code share a signature.
#[test]
fn test_signature_ignores_message_and_status() {
    let a = classify_response(502, "Bad Gateway", "", &headers(&[]));
    let b = classify_response(502, "", r#"{"message":"upstream down"}"#, &headers(&[]));
    let c = classify_response(503, "Service Unavailable", "", &headers(&[]));

    assert_eq!(a.signature(), b.signature());
    assert_ne!(a.signature(), c.signature());
    assert_eq!(a.to_string(), "[ServerError/BadGateway] Bad Gateway");
}
