//! Statistics types for the admission queue
//!
//! This module centralizes the observability surface of the rate limiter:
//! - The raw statistics snapshot
//! - Queue, performance and overall health buckets derived from it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    QUEUE_BUSY_THRESHOLD, QUEUE_NORMAL_THRESHOLD, WAIT_EXCELLENT_THRESHOLD_MS,
    WAIT_FAIR_THRESHOLD_MS, WAIT_GOOD_THRESHOLD_MS,
};
use crate::impl_domain_status_conversions;

/* -------------------------------------------------------------------------- */
/* Rate Limiter Statistics */
/* -------------------------------------------------------------------------- */

/// Point-in-time statistics of the admission queue
///
/// Recomputed on demand from the sliding window of completions and the
/// current queue/in-flight counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStats {
    /// Completions within the trailing 1000 ms
    pub requests_in_last_second: usize,

    /// Operations waiting for admission
    pub queue_length: usize,

    /// Operations admitted and still executing
    pub in_flight: usize,

    /// Exponential moving average of time spent queued
    pub average_wait_time_ms: f64,

    /// Operations admitted since startup (re-admissions included)
    pub total_requests: u64,

    /// Admitted executions that ended in an error
    pub total_errors: u64,

    /// Time of the most recent admission
    pub last_request_time: Option<DateTime<Utc>>,
}

/* -------------------------------------------------------------------------- */
/* Health Buckets */
/* -------------------------------------------------------------------------- */

/// Queue depth bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Empty,
    Normal,
    Busy,
    Overloaded,
}

impl_domain_status_conversions!(QueueStatus {
    Empty => "empty",
    Normal => "normal",
    Busy => "busy",
    Overloaded => "overloaded",
});

impl QueueStatus {
    pub fn from_queue_length(queue_length: usize) -> Self {
        match queue_length {
            0 => Self::Empty,
            n if n < QUEUE_NORMAL_THRESHOLD => Self::Normal,
            n if n < QUEUE_BUSY_THRESHOLD => Self::Busy,
            _ => Self::Overloaded,
        }
    }
}

/// Average queue wait bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceStatus {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl_domain_status_conversions!(PerformanceStatus {
    Excellent => "excellent",
    Good => "good",
    Fair => "fair",
    Poor => "poor",
});

impl PerformanceStatus {
    pub fn from_average_wait_ms(average_wait_ms: f64) -> Self {
        if average_wait_ms < WAIT_EXCELLENT_THRESHOLD_MS {
            Self::Excellent
        } else if average_wait_ms < WAIT_GOOD_THRESHOLD_MS {
            Self::Good
        } else if average_wait_ms < WAIT_FAIR_THRESHOLD_MS {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

/// Overall health derived from the two buckets above
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl_domain_status_conversions!(HealthStatus {
    Healthy => "healthy",
    Degraded => "degraded",
    Unhealthy => "unhealthy",
});

impl HealthStatus {
    pub fn from_buckets(queue: QueueStatus, performance: PerformanceStatus) -> Self {
        match (queue, performance) {
            (QueueStatus::Overloaded, _) | (_, PerformanceStatus::Poor) => Self::Unhealthy,
            (QueueStatus::Busy, _) | (_, PerformanceStatus::Fair) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

/// Statistics plus derived buckets, as served to operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub stats: RateLimitStats,
    pub queue_status: QueueStatus,
    pub performance_status: PerformanceStatus,
    pub health: HealthStatus,
}

impl From<RateLimitStats> for StatsReport {
    fn from(stats: RateLimitStats) -> Self {
        let queue_status = QueueStatus::from_queue_length(stats.queue_length);
        let performance_status =
            PerformanceStatus::from_average_wait_ms(stats.average_wait_time_ms);
        Self {
            stats,
            queue_status,
            performance_status,
            health: HealthStatus::from_buckets(queue_status, performance_status),
        }
    }
}
