//! Application constants
//!
//! Centralized location for the fixed numbers of the resilience layer.

// Admission queue
pub const RATE_WINDOW_MS: u64 = 1000;
pub const MIN_POLL_DELAY_MS: u64 = 10;
pub const WAIT_TIME_SMOOTHING: f64 = 0.1;
pub const MIN_PRIORITY: i32 = -10;
pub const DEFAULT_PRIORITY: i32 = 0;
pub const RATE_LIMIT_BACKOFF_BASE_MS: u64 = 1000;

// Rate limiter defaults
pub const DEFAULT_MAX_REQUESTS_PER_SECOND: u32 = 3;
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: u32 = 10;
pub const DEFAULT_QUEUE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_BACKOFF_DELAY_MS: u64 = 30_000;
pub const DEFAULT_MAX_RATE_LIMIT_REQUEUES: u32 = 3;

// Resilient client defaults
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

// Recovery strategy defaults
pub const CREDENTIAL_REFRESH_MAX_ATTEMPTS: u32 = 1;
pub const RATE_LIMIT_MAX_ATTEMPTS: u32 = 3;
pub const RATE_LIMIT_BASE_DELAY_MS: u64 = 1000;
pub const NETWORK_MAX_ATTEMPTS: u32 = 3;
pub const NETWORK_BASE_DELAY_MS: u64 = 2000;
pub const SERVER_ERROR_MAX_ATTEMPTS: u32 = 2;
pub const SERVER_ERROR_DELAY_MS: u64 = 5000;

// Health thresholds
pub const QUEUE_NORMAL_THRESHOLD: usize = 10;
pub const QUEUE_BUSY_THRESHOLD: usize = 50;
pub const WAIT_EXCELLENT_THRESHOLD_MS: f64 = 1000.0;
pub const WAIT_GOOD_THRESHOLD_MS: f64 = 3000.0;
pub const WAIT_FAIR_THRESHOLD_MS: f64 = 5000.0;

// Headers consumed from the remote service
pub const RETRY_AFTER_HEADER: &str = "retry-after";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// Context keys attached to classified errors
pub const CONTEXT_RESPONSE_DATA: &str = "responseData";
pub const CONTEXT_STATUS_TEXT: &str = "statusText";
pub const CONTEXT_CAUSE: &str = "cause";
pub const CONTEXT_RATE_LIMIT_REQUEUES: &str = "rateLimitRequeues";
