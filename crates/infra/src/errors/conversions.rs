//! Conversions from external infrastructure errors into apiguard errors.

use apiguard_common::{classify_exception, ExceptionHint};
use apiguard_domain::{ApiGuardError, ClassifiedError};
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub ApiGuardError);

impl From<InfraError> for ApiGuardError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<ApiGuardError> for InfraError {
    fn from(value: ApiGuardError) -> Self {
        InfraError(value)
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → ApiGuardError */
/* -------------------------------------------------------------------------- */

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        if value.is_builder() {
            return InfraError(ApiGuardError::Config(format!("invalid HTTP client setup: {value}")));
        }
        if value.is_timeout() {
            return InfraError(ApiGuardError::Network("HTTP request timed out".into()));
        }
        InfraError(ApiGuardError::Network(value.to_string()))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → ClassifiedError */
/* -------------------------------------------------------------------------- */

/// Classify a failure that produced no HTTP response
///
/// Status-bearing errors never reach this point: responses are classified
/// from their status and body instead.
pub fn classify_transport_error(err: &HttpError) -> ClassifiedError {
    classify_exception(&err.to_string(), exception_hint(err))
}

fn exception_hint(err: &HttpError) -> ExceptionHint {
    if err.is_timeout() {
        return ExceptionHint::Timeout;
    }

    #[cfg(not(target_arch = "wasm32"))]
    if err.is_connect() {
        return ExceptionHint::Network;
    }

    if err.is_request() || err.is_body() {
        ExceptionHint::Network
    } else {
        ExceptionHint::Unknown
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::time::Duration;

    use apiguard_domain::ErrorCategory;
    use reqwest::Client;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_connection_refused_is_a_retryable_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(format!("http://{addr}")).send().await.unwrap_err();

        let classified = classify_transport_error(&error);
        assert_eq!(classified.category(), ErrorCategory::Network);
        assert!(classified.is_retryable());

        let mapped: ApiGuardError = InfraError::from(error).into();
        assert!(matches!(mapped, ApiGuardError::Network(_)));
    }

    #[tokio::test]
    async fn test_client_timeout_is_classified_as_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client =
            Client::builder().no_proxy().timeout(Duration::from_millis(50)).build().unwrap();
        let error = client.get(server.uri()).send().await.unwrap_err();

        let classified = classify_transport_error(&error);
        assert_eq!(classified.category(), ErrorCategory::Timeout);
        assert!(classified.is_retryable());
    }
}
