//! Resilient client for the remote service
//!
//! A call passes through three layers, innermost first:
//!
//! 1. **Attempt**: fetch a token, send once, bounded by the per-attempt
//!    timeout, classify any failure
//! 2. **Admission + recovery**: every attempt is admitted by the shared
//!    [`AdmissionQueue`]; a failed attempt is handed to the
//!    [`RecoveryManager`] when a strategy matches
//! 3. **Outer retry**: retryable errors that survive recovery are retried up
//!    to `retries` times with a doubling delay
//!
//! Only [`ClassifiedError`]s leave this module.

use std::sync::Arc;
use std::time::Duration;

use apiguard_common::resilience::{AdmissionQueue, RecoveryContext, RecoveryManager};
use apiguard_common::{classify_exception, CredentialRefresher, ExceptionHint};
use apiguard_domain::constants::CONTEXT_CAUSE;
use apiguard_domain::{
    ApiGuardError, ClassifiedError, ClientConfig, Config, ErrorCategory, ErrorCode,
    ErrorSeverity, StatsReport,
};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use super::auth::AccessTokenProvider;
use crate::http::{classify_error_response, HttpClient};

/// Per-call overrides of the client configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Per-attempt timeout
    pub timeout_ms: Option<u64>,
    /// Outer retries after recovery gave up
    pub retries: Option<u32>,
    /// Admission priority, higher first
    pub priority: Option<i32>,
}

impl CallOptions {
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// One request, replayable for every attempt
#[derive(Clone)]
struct Attempt {
    http: HttpClient,
    auth: Arc<dyn AccessTokenProvider>,
    method: Method,
    url: Url,
    body: Option<Value>,
    timeout: Duration,
}

impl Attempt {
    async fn run(self) -> Result<Value, ClassifiedError> {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.exchange()).await {
            Ok(result) => result,
            Err(_) => Err(classify_exception(
                &format!("Request timed out after {} ms", timeout.as_millis()),
                ExceptionHint::Timeout,
            )),
        }
    }

    async fn exchange(self) -> Result<Value, ClassifiedError> {
        let token = self.auth.access_token().await.map_err(token_error)?;

        let mut request = self.http.request(self.method, self.url).bearer_auth(token);
        if let Some(body) = &self.body {
            request = request.json(body);
        }

        let response = self.http.send(request).await?;
        read_response(response).await
    }
}

async fn read_response(response: Response) -> Result<Value, ClassifiedError> {
    let status = response.status();
    if !status.is_success() {
        return Err(classify_error_response(response).await);
    }
    if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
        return Ok(Value::Null);
    }

    let body = response.text().await.map_err(|err| invalid_response(Some(status.as_u16()), &err))?;
    serde_json::from_str(&body).map_err(|err| invalid_response(Some(status.as_u16()), &err))
}

fn invalid_response(status: Option<u16>, cause: &dyn std::fmt::Display) -> ClassifiedError {
    let error = ClassifiedError::new(
        ErrorCategory::Unknown,
        ErrorCode::InvalidResponse,
        "Response body could not be decoded",
    )
    .with_context(CONTEXT_CAUSE, cause.to_string());

    match status {
        Some(status) => error.with_status(status),
        None => error,
    }
}

fn token_error(err: ApiGuardError) -> ClassifiedError {
    let (category, code) = match err {
        ApiGuardError::Auth(_) => (ErrorCategory::Authentication, ErrorCode::Unauthorized),
        _ => (ErrorCategory::Unknown, ErrorCode::Unknown),
    };
    ClassifiedError::new(category, code, format!("Failed to get access token: {err}"))
}

/// HTTP client for the remote service with admission control, recovery and
/// retries
///
/// Built through [`ResilientClient::builder`]. Clients that share credentials
/// should share one [`AdmissionQueue`] so the remote limits hold across them.
pub struct ResilientClient {
    http: HttpClient,
    auth: Arc<dyn AccessTokenProvider>,
    queue: Arc<AdmissionQueue>,
    recovery: Option<Arc<RecoveryManager>>,
    config: ClientConfig,
}

impl ResilientClient {
    /// Create a builder for fluent configuration
    pub fn builder() -> ResilientClientBuilder {
        ResilientClientBuilder::default()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<AdmissionQueue> {
        &self.queue
    }

    /// `None` when recovery is disabled
    pub fn recovery(&self) -> Option<&Arc<RecoveryManager>> {
        self.recovery.as_ref()
    }

    pub fn stats_report(&self) -> StatsReport {
        self.queue.stats_report()
    }

    /// Execute a call and return the decoded JSON body
    ///
    /// 204 and 205 responses yield `Value::Null`.
    ///
    /// # Errors
    ///
    /// Returns the final classified error once recovery and retries are
    /// exhausted, or immediately for non-retryable errors.
    #[instrument(skip(self, body, options), fields(method = %method, endpoint = %endpoint))]
    pub async fn call(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<Value>,
        options: CallOptions,
    ) -> Result<Value, ClassifiedError> {
        let attempt = Attempt {
            http: self.http.clone(),
            auth: Arc::clone(&self.auth),
            method: method.clone(),
            url: self.endpoint_url(endpoint)?,
            body,
            timeout: options
                .timeout_ms
                .map_or_else(|| self.config.timeout(), Duration::from_millis),
        };
        let retries = options.retries.unwrap_or(self.config.retries);
        let priority = options.priority.unwrap_or(self.config.default_priority);
        let context = self.recovery_context(&method, endpoint);

        let mut retry = 0;
        loop {
            let result = match self.admit(attempt.clone(), priority).await {
                Ok(value) => Ok(value),
                Err(err) => self.recover(err, &attempt, priority, &context).await,
            };

            let err = match result {
                Ok(value) => {
                    debug!(retries = retry, "Call succeeded");
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() || retry >= retries {
                log_failure(&err, retry);
                return Err(err);
            }

            let delay = self.retry_delay(retry);
            warn!(
                retry = retry + 1,
                retries,
                delay_ms = delay.as_millis() as u64,
                code = %err.code(),
                "Retrying call"
            );
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }

    /// Execute a call with a serializable body and decode the response
    ///
    /// # Errors
    ///
    /// As [`ResilientClient::call`]; a body that cannot be serialized is a
    /// Validation error and a response that does not match `T` is
    /// `InvalidResponse`.
    pub async fn call_typed<T, B>(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&B>,
        options: CallOptions,
    ) -> Result<T, ClassifiedError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = body.map(serde_json::to_value).transpose().map_err(|err| {
            ClassifiedError::new(
                ErrorCategory::Validation,
                ErrorCode::BadRequest,
                format!("Failed to serialize request body: {err}"),
            )
        })?;

        let value = self.call(endpoint, method, body, options).await?;
        serde_json::from_value(value).map_err(|err| invalid_response(None, &err))
    }

    /// Execute a GET request
    ///
    /// # Errors
    ///
    /// See [`ResilientClient::call_typed`].
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ClassifiedError> {
        self.call_typed::<T, Value>(endpoint, Method::GET, None, CallOptions::default()).await
    }

    /// Execute a POST request
    ///
    /// # Errors
    ///
    /// See [`ResilientClient::call_typed`].
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ClassifiedError> {
        self.call_typed(endpoint, Method::POST, Some(body), CallOptions::default()).await
    }

    /// Execute a PATCH request
    ///
    /// # Errors
    ///
    /// See [`ResilientClient::call_typed`].
    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ClassifiedError> {
        self.call_typed(endpoint, Method::PATCH, Some(body), CallOptions::default()).await
    }

    /// Execute a DELETE request
    ///
    /// # Errors
    ///
    /// See [`ResilientClient::call_typed`].
    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ClassifiedError> {
        self.call_typed::<T, Value>(endpoint, Method::DELETE, None, CallOptions::default()).await
    }

    async fn admit(&self, attempt: Attempt, priority: i32) -> Result<Value, ClassifiedError> {
        self.queue
            .enqueue(move || attempt.clone().run(), priority)
            .await
            .map_err(ClassifiedError::from)
    }

    async fn recover(
        &self,
        err: ClassifiedError,
        attempt: &Attempt,
        priority: i32,
        context: &RecoveryContext,
    ) -> Result<Value, ClassifiedError> {
        match &self.recovery {
            Some(manager) if manager.can_recover(&err) => {
                manager
                    .recover_and_retry(err, || self.admit(attempt.clone(), priority), context)
                    .await
            }
            _ => Err(err),
        }
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url, ClassifiedError> {
        let raw = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        Url::parse(&raw).map_err(|err| {
            ClassifiedError::new(
                ErrorCategory::Validation,
                ErrorCode::BadRequest,
                format!("Invalid endpoint '{endpoint}': {err}"),
            )
        })
    }

    fn recovery_context(&self, method: &Method, endpoint: &str) -> RecoveryContext {
        let context = RecoveryContext::new().with_operation(format!("{method} {endpoint}"));
        match &self.config.user_id {
            Some(user_id) => context.with_user_id(user_id.clone()),
            None => context,
        }
    }

    /// `retry_delay * 2^retry`
    fn retry_delay(&self, retry: u32) -> Duration {
        self.config.retry_delay().saturating_mul(1u32 << retry.min(16))
    }
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("base_url", &self.config.base_url)
            .field("queue", &self.queue)
            .field("recovery", &self.recovery.is_some())
            .finish_non_exhaustive()
    }
}

fn log_failure(err: &ClassifiedError, retries: u32) {
    match err.severity() {
        ErrorSeverity::Critical | ErrorSeverity::High => error!(
            category = %err.category(),
            code = %err.code(),
            status = ?err.http_status(),
            retries,
            "Call failed: {}",
            err.message()
        ),
        ErrorSeverity::Medium => warn!(
            category = %err.category(),
            code = %err.code(),
            status = ?err.http_status(),
            retries,
            "Call failed: {}",
            err.message()
        ),
        ErrorSeverity::Low => info!(
            category = %err.category(),
            code = %err.code(),
            status = ?err.http_status(),
            "Call failed: {}",
            err.message()
        ),
    }
}

/// Builder for [`ResilientClient`]; the composition root of the layer
///
/// An injected queue or recovery manager is shared as is. Otherwise the
/// builder creates them from the configuration: recovery gets the credential
/// refresh strategy only when a refresher is supplied.
#[derive(Default)]
pub struct ResilientClientBuilder {
    config: Config,
    auth: Option<Arc<dyn AccessTokenProvider>>,
    refresher: Option<Arc<dyn CredentialRefresher>>,
    queue: Option<Arc<AdmissionQueue>>,
    recovery: Option<Arc<RecoveryManager>>,
}

impl ResilientClientBuilder {
    /// Set the configuration
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the access token provider
    #[must_use]
    pub fn auth(mut self, auth: Arc<dyn AccessTokenProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the refresher used by credential-refresh recovery
    #[must_use]
    pub fn credential_refresher(mut self, refresher: Arc<dyn CredentialRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Share an existing admission queue instead of creating one
    #[must_use]
    pub fn admission_queue(mut self, queue: Arc<AdmissionQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Share an existing recovery manager instead of creating one
    #[must_use]
    pub fn recovery_manager(mut self, manager: Arc<RecoveryManager>) -> Self {
        self.recovery = Some(manager);
        self
    }

    /// Build the client
    ///
    /// Must be called inside a tokio runtime when no queue is injected.
    ///
    /// # Errors
    ///
    /// Returns [`ApiGuardError::Config`] if the auth provider is missing, the
    /// base URL or a default header is invalid, or the rate limit
    /// configuration is rejected.
    pub fn build(self) -> Result<ResilientClient, ApiGuardError> {
        let auth =
            self.auth.ok_or_else(|| ApiGuardError::Config("Auth provider not set".to_string()))?;
        let Config { client, rate_limit, recovery: recovery_config } = self.config;

        Url::parse(&client.base_url).map_err(|err| {
            ApiGuardError::Config(format!("Invalid base URL '{}': {err}", client.base_url))
        })?;

        let mut http = HttpClient::builder()
            .user_agent(client.user_agent.clone())
            .default_header("Content-Type", "application/json");
        for (name, value) in &client.default_headers {
            http = http.default_header(name.clone(), value.clone());
        }
        let http = http.build()?;

        let queue = match self.queue {
            Some(queue) => queue,
            None => Arc::new(
                AdmissionQueue::new(rate_limit)
                    .map_err(|err| ApiGuardError::Config(err.to_string()))?,
            ),
        };

        let recovery = match self.recovery {
            Some(manager) => Some(manager),
            None if recovery_config.enabled => {
                let builder = match self.refresher {
                    Some(refresher) => RecoveryManager::builder()
                        .with_configured_strategies(refresher, &recovery_config),
                    None => RecoveryManager::builder().with_retry_strategies(&recovery_config),
                };
                Some(Arc::new(builder.build()))
            }
            None => None,
        };

        info!(
            base_url = %client.base_url,
            retries = client.retries,
            timeout_ms = client.timeout_ms,
            recovery = recovery.is_some(),
            "Resilient client ready"
        );

        Ok(ResilientClient { http, auth, queue, recovery, config: client })
    }
}
