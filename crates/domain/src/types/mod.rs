//! Domain types and models

pub mod error;
pub mod stats;

pub use error::{ClassifiedError, ErrorCategory, ErrorCode, ErrorSeverity};
pub use stats::{HealthStatus, PerformanceStatus, QueueStatus, RateLimitStats, StatsReport};
