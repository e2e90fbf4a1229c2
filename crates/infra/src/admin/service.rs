//! Operator actions against a running admission queue

use std::sync::Arc;

use apiguard_common::{AdmissionError, AdmissionQueue};
use apiguard_domain::{RateLimitConfig, RateLimitConfigPatch, StatsReport};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Action requested by an operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminAction {
    /// Reject every operation still waiting for admission
    ClearQueue,
    /// Merge new rate limits into the running configuration
    UpdateConfig { config: RateLimitConfigPatch },
}

/// Outcome of an [`AdminAction`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleared: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<RateLimitConfig>,
}

impl AdminResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), cleared: None, config: None }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdminError {
    #[error("Configuration update contains no fields")]
    EmptyPatch,

    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(String),
}

/// Executes [`AdminAction`]s against a shared queue
#[derive(Debug, Clone)]
pub struct AdminService {
    queue: Arc<AdmissionQueue>,
}

impl AdminService {
    pub fn new(queue: Arc<AdmissionQueue>) -> Self {
        Self { queue }
    }

    pub fn stats(&self) -> StatsReport {
        self.queue.stats_report()
    }

    /// Run an action.
    ///
    /// # Errors
    /// Configuration updates fail with [`AdminError`] when the patch is empty
    /// or the merged limits do not validate; the running configuration is
    /// left untouched in both cases.
    pub fn execute(&self, action: AdminAction) -> Result<AdminResponse, AdminError> {
        match action {
            AdminAction::ClearQueue => {
                let cleared = self.queue.clear_queue();
                info!(cleared, "Admin cleared admission queue");
                Ok(AdminResponse {
                    success: true,
                    message: format!("Cleared {cleared} queued operations"),
                    cleared: Some(cleared),
                    config: None,
                })
            }
            AdminAction::UpdateConfig { config } => {
                if config.is_empty() {
                    return Err(AdminError::EmptyPatch);
                }

                let updated = self.queue.update_config(&config).map_err(|e| {
                    warn!(error = %e, "Admin configuration update rejected");
                    match e {
                        AdmissionError::InvalidConfig(reason) => AdminError::InvalidConfig(reason),
                        other => AdminError::InvalidConfig(other.to_string()),
                    }
                })?;

                Ok(AdminResponse {
                    success: true,
                    message: "Rate limit configuration updated".to_string(),
                    cleared: None,
                    config: Some(updated),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AdminService {
        let queue = AdmissionQueue::new(RateLimitConfig::default()).unwrap();
        AdminService::new(Arc::new(queue))
    }

    #[test]
    fn test_action_wire_format() {
        let clear: AdminAction = serde_json::from_str(r#"{"action":"clear_queue"}"#).unwrap();
        assert_eq!(clear, AdminAction::ClearQueue);

        let update: AdminAction = serde_json::from_str(
            r#"{"action":"update_config","config":{"maxRequestsPerSecond":2}}"#,
        )
        .unwrap();
        match update {
            AdminAction::UpdateConfig { config } => {
                assert_eq!(config.max_requests_per_second, Some(2));
                assert_eq!(config.queue_timeout_ms, None);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_response_omits_absent_fields() {
        let json = serde_json::to_value(AdminResponse::failure("nope")).unwrap();
        assert_eq!(json, serde_json::json!({ "success": false, "message": "nope" }));
    }

    #[tokio::test]
    async fn test_clear_on_idle_queue_reports_zero() {
        let response = service().execute(AdminAction::ClearQueue).unwrap();
        assert!(response.success);
        assert_eq!(response.cleared, Some(0));
    }

    #[tokio::test]
    async fn test_update_applies_to_queue() {
        let service = service();
        let patch = RateLimitConfigPatch { max_concurrent_requests: Some(3), ..Default::default() };

        let response = service.execute(AdminAction::UpdateConfig { config: patch }).unwrap();

        let config = response.config.unwrap();
        assert_eq!(config.max_concurrent_requests, 3);
        assert_eq!(service.queue.config().max_concurrent_requests, 3);
    }

    #[tokio::test]
    async fn test_empty_and_invalid_updates_are_rejected() {
        let service = service();

        let empty = service.execute(AdminAction::UpdateConfig { config: Default::default() });
        assert_eq!(empty, Err(AdminError::EmptyPatch));

        let zero = RateLimitConfigPatch { max_requests_per_second: Some(0), ..Default::default() };
        let invalid = service.execute(AdminAction::UpdateConfig { config: zero });
        assert!(matches!(invalid, Err(AdminError::InvalidConfig(_))));
        assert_eq!(service.queue.config(), RateLimitConfig::default());
    }
}
