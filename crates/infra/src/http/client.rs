use std::time::Duration;

use apiguard_common::classify_response;
use apiguard_domain::{ApiGuardError, ClassifiedError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use tracing::debug;

use crate::errors::{classify_transport_error, InfraError};

/// Single-shot HTTP client.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: ReqwestClient,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, ApiGuardError> {
        Self::builder().build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Execute the provided request builder once.
    ///
    /// Any response, including 4xx/5xx, is returned as `Ok`. Failures that
    /// produce no response are classified.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ClassifiedError> {
        let request = builder.build().map_err(|err| classify_transport_error(&err))?;

        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "sending HTTP request");

        match self.client.execute(request).await {
            Ok(response) => {
                debug!(%method, %url, status = %response.status(), "received HTTP response");
                Ok(response)
            }
            Err(err) => {
                debug!(%method, %url, error = %err, "HTTP request failed");
                Err(classify_transport_error(&err))
            }
        }
    }
}

/// Classify a non-success response from its status, headers and body.
pub async fn classify_error_response(response: Response) -> ClassifiedError {
    let status = response.status();
    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let status_text = status.canonical_reason().unwrap_or_default();
    let body = response.text().await.unwrap_or_default();

    classify_response(status.as_u16(), status_text, &body, &headers)
}

/// Builder for [`HttpClient`].
#[derive(Debug, Default)]
pub struct HttpClientBuilder {
    timeout: Option<Duration>,
    user_agent: Option<String>,
    default_headers: Vec<(String, String)>,
}

impl HttpClientBuilder {
    /// Transport-level timeout for a whole request.
    ///
    /// Unset by default; callers usually bound each attempt themselves.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Add a header sent with every request.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<HttpClient, ApiGuardError> {
        let mut builder = ReqwestClient::builder().no_proxy();

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if !self.default_headers.is_empty() {
            builder = builder.default_headers(header_map(&self.default_headers)?);
        }

        let client = builder.build().map_err(|err| ApiGuardError::from(InfraError::from(err)))?;

        Ok(HttpClient { client })
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, ApiGuardError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| ApiGuardError::Config(format!("invalid header name '{name}': {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| {
                ApiGuardError::Config(format!("invalid value for header '{name}': {err}"))
            })?;
        map.insert(name, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use apiguard_domain::{ErrorCategory, ErrorCode};
    use reqwest::{Method, StatusCode};
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_returns_successful_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-api-version", "2022-06-28"))
            .and(header("user-agent", "apiguard-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::builder()
            .user_agent("apiguard-test")
            .default_header("X-Api-Version", "2022-06-28")
            .build()
            .expect("http client");
        let response =
            client.send(client.request(Method::GET, server.uri())).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sends_server_errors_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new().expect("http client");
        let response =
            client.send(client.request(Method::GET, server.uri())).await.expect("response");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn test_classifies_error_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "3")
                    .insert_header("X-Request-Id", "req-7")
                    .set_body_string(r#"{"message":"Rate limited"}"#),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new().expect("http client");
        let response =
            client.send(client.request(Method::GET, server.uri())).await.expect("response");
        let error = classify_error_response(response).await;

        assert_eq!(error.code(), ErrorCode::RateLimited);
        assert_eq!(error.retry_after_ms(), Some(3000));
        assert_eq!(error.request_id(), Some("req-7"));
        assert_eq!(error.message(), "Rate limited");
    }

    #[tokio::test]
    async fn test_classifies_network_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // release the port so that requests fail with ECONNREFUSED
        let url = format!("http://{}", addr);

        let client = HttpClient::new().expect("http client");

        let result = client.send(client.request(Method::GET, &url)).await;
        match result {
            Err(error) => {
                assert_eq!(error.category(), ErrorCategory::Network);
                assert!(error.is_retryable());
            }
            Ok(response) => panic!("expected network error, got {:?}", response.status()),
        }
    }

    #[test]
    fn test_rejects_invalid_default_header() {
        let result = HttpClient::builder().default_header("bad header", "value").build();
        assert!(matches!(result, Err(ApiGuardError::Config(_))));
    }
}
