use std::time::Duration;

use apiguard_domain::{ClassifiedError, ErrorCategory, ErrorCode, ErrorSeverity};
use thiserror::Error;

use crate::error::ErrorClassification;

/// Errors surfaced by the admission queue
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdmissionError {
    /// Operation was not admitted before its queue deadline
    #[error("Operation was not admitted within {waited:?}")]
    QueueTimeout { waited: Duration },

    /// Queue was cleared while the operation was waiting
    #[error("Operation was removed from the queue before admission")]
    QueueCleared,

    /// Scheduler shut down before the operation completed
    #[error("Admission scheduler has stopped")]
    SchedulerStopped,

    /// Configuration error
    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(String),

    /// Queue was created outside a tokio runtime
    #[error("No tokio runtime available to host the admission scheduler")]
    NoRuntime,

    /// The admitted operation itself failed
    #[error(transparent)]
    Operation(ClassifiedError),
}

/// Result type for admission operations
pub type AdmissionResult<T> = Result<T, AdmissionError>;

impl From<ClassifiedError> for AdmissionError {
    fn from(error: ClassifiedError) -> Self {
        Self::Operation(error)
    }
}

impl From<AdmissionError> for ClassifiedError {
    fn from(error: AdmissionError) -> Self {
        let message = error.to_string();
        match error {
            AdmissionError::Operation(inner) => inner,
            AdmissionError::QueueTimeout { .. } => {
                ClassifiedError::new(ErrorCategory::Timeout, ErrorCode::QueueTimeout, message)
            }
            AdmissionError::QueueCleared => {
                ClassifiedError::new(ErrorCategory::Unknown, ErrorCode::QueueCleared, message)
            }
            AdmissionError::InvalidConfig(_) => {
                ClassifiedError::new(ErrorCategory::Validation, ErrorCode::BadRequest, message)
            }
            AdmissionError::SchedulerStopped | AdmissionError::NoRuntime => {
                ClassifiedError::new(ErrorCategory::Unknown, ErrorCode::Unknown, message)
            }
        }
    }
}

impl ErrorClassification for AdmissionError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Operation(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Operation(inner) => inner.severity(),
            Self::QueueTimeout { .. } | Self::QueueCleared => ErrorSeverity::Medium,
            Self::SchedulerStopped | Self::InvalidConfig(_) => ErrorSeverity::High,
            Self::NoRuntime => ErrorSeverity::Critical,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Operation(inner) => inner.retry_after_ms().map(Duration::from_millis),
            _ => None,
        }
    }
}
