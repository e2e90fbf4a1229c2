//! Integration tests for the admission queue
//!
//! Timer-driven behavior runs on a paused tokio clock, so waits of seconds
//! complete instantly and elapsed times are exact.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use apiguard_common::resilience::{AdmissionError, AdmissionQueue};
use apiguard_domain::constants::CONTEXT_RATE_LIMIT_REQUEUES;
use apiguard_domain::{
    ClassifiedError, ErrorCategory, ErrorCode, HealthStatus, QueueStatus, RateLimitConfig,
    RateLimitConfigPatch,
};
use tokio::time::Instant;

fn config(max_rps: u32, max_concurrent: u32) -> RateLimitConfig {
    RateLimitConfig {
        max_requests_per_second: max_rps,
        max_concurrent_requests: max_concurrent,
        ..Default::default()
    }
}

fn rate_limited(retry_after_ms: u64) -> ClassifiedError {
    ClassifiedError::new(ErrorCategory::RateLimit, ErrorCode::RateLimited, "slow down")
        .with_status(429)
        .retryable(true)
        .with_retry_after_ms(retry_after_ms)
}

/// Validates that admissions never exceed the per-second limit.
///
/// # Test Steps
/// 1. Allow 3 requests per second with ample concurrency
/// 2. Enqueue 5 instant operations recording their start times
/// 3. Verify the first 3 start immediately
/// 4. Verify the 4th and 5th start no earlier than 1000 ms after the 1st
#[tokio::test(start_paused = true)]
async fn test_rate_window_limits_admissions() {
    let queue = AdmissionQueue::new(config(3, 10)).unwrap();
    let started = Instant::now();
    let starts = Arc::new(Mutex::new(Vec::new()));

    let tickets: Vec<_> = (0..5)
        .map(|index| {
            let starts = Arc::clone(&starts);
            queue.enqueue(
                move || {
                    starts.lock().unwrap().push((index, Instant::now()));
                    async { Ok::<_, ClassifiedError>(()) }
                },
                0,
            )
        })
        .collect();

    for ticket in tickets {
        ticket.await.unwrap();
    }

    let starts = starts.lock().unwrap().clone();
    assert_eq!(starts.len(), 5);
    for (_, at) in &starts[..3] {
        assert_eq!(at.duration_since(started), Duration::ZERO);
    }
    let first = starts[0].1;
    for (_, at) in &starts[3..] {
        assert!(at.duration_since(first) >= Duration::from_millis(1000));
    }
}

/// Validates that concurrently executing operations never exceed the ceiling.
#[tokio::test(start_paused = true)]
async fn test_concurrency_ceiling_never_exceeded() {
    let queue = AdmissionQueue::new(config(100, 2)).unwrap();
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tickets: Vec<_> = (0..6)
        .map(|_| {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            queue.enqueue(
                move || {
                    let current = Arc::clone(&current);
                    let peak = Arc::clone(&peak);
                    async move {
                        let running = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(running, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, ClassifiedError>(())
                    }
                },
                0,
            )
        })
        .collect();

    for ticket in tickets {
        ticket.await.unwrap();
    }

    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

/// Validates admission order: descending priority, FIFO within a tier.
#[tokio::test(start_paused = true)]
async fn test_priority_then_fifo_ordering() {
    let queue = AdmissionQueue::new(config(100, 1)).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut tickets = Vec::new();
    for (name, priority) in [("blocker", 10), ("low", 0), ("high-a", 5), ("mid", 2), ("high-b", 5)]
    {
        let order = Arc::clone(&order);
        tickets.push(queue.enqueue(
            move || {
                let order = Arc::clone(&order);
                async move {
                    order.lock().unwrap().push(name);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok::<_, ClassifiedError>(())
                }
            },
            priority,
        ));
    }

    for ticket in tickets {
        ticket.await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec!["blocker", "high-a", "high-b", "mid", "low"]);
}

/// Validates that a rate-limited operation is retried after Retry-After
/// without failing the caller.
///
/// # Test Steps
/// 1. First execution returns RateLimit with retry-after 1000 ms
/// 2. Second execution succeeds
/// 3. Verify the caller receives the success
/// 4. Verify the second execution started at least 1000 ms after the first
#[tokio::test(start_paused = true)]
async fn test_rate_limited_operation_is_requeued() {
    let queue = AdmissionQueue::new(config(10, 10)).unwrap();
    let runs = Arc::new(Mutex::new(Vec::new()));

    let recorder = Arc::clone(&runs);
    let result = queue
        .enqueue(
            move || {
                let mut runs = recorder.lock().unwrap();
                runs.push(Instant::now());
                let outcome = if runs.len() == 1 { Err(rate_limited(1000)) } else { Ok("fresh") };
                async move { outcome }
            },
            0,
        )
        .await;

    assert_eq!(result.unwrap(), "fresh");
    let runs = runs.lock().unwrap().clone();
    assert_eq!(runs.len(), 2);
    assert!(runs[1].duration_since(runs[0]) >= Duration::from_millis(1000));
}

/// Validates that repeated rate limits end in a terminal error once the
/// requeue budget is spent.
#[tokio::test(start_paused = true)]
async fn test_rate_limit_requeues_are_bounded() {
    let queue = AdmissionQueue::new(RateLimitConfig {
        max_rate_limit_requeues: 3,
        ..config(10, 10)
    })
    .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let result = queue
        .enqueue(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(rate_limited(10)) }
            },
            0,
        )
        .await;

    let error = match result {
        Err(AdmissionError::Operation(error)) => error,
        other => panic!("expected a surfaced rate limit error, got {other:?}"),
    };
    assert_eq!(error.category(), ErrorCategory::RateLimit);
    assert!(!error.is_retryable());
    assert_eq!(error.context_value(CONTEXT_RATE_LIMIT_REQUEUES), Some(&serde_json::json!(3)));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

/// Validates that a server-supplied Retry-After is capped by the backoff
/// ceiling.
///
/// # Test Steps
/// 1. First execution returns RateLimit asking for a one minute wait
/// 2. Backoff ceiling is 2000 ms
/// 3. Verify the second execution starts after 2000 ms, not a minute later
#[tokio::test(start_paused = true)]
async fn test_retry_after_is_capped_by_backoff_ceiling() {
    let queue = AdmissionQueue::new(RateLimitConfig {
        max_backoff_delay_ms: 2_000,
        queue_timeout_ms: 120_000,
        ..config(10, 10)
    })
    .unwrap();
    let runs = Arc::new(Mutex::new(Vec::new()));

    let recorder = Arc::clone(&runs);
    let result = queue
        .enqueue(
            move || {
                let mut runs = recorder.lock().unwrap();
                runs.push(Instant::now());
                let outcome = if runs.len() == 1 { Err(rate_limited(60_000)) } else { Ok(()) };
                async move { outcome }
            },
            0,
        )
        .await;

    assert!(result.is_ok());
    let runs = runs.lock().unwrap().clone();
    assert_eq!(runs.len(), 2);
    let waited = runs[1].duration_since(runs[0]);
    assert!(waited >= Duration::from_millis(2_000));
    assert!(waited < Duration::from_millis(3_000));
}

/// Validates that an operation not admitted in time fails with QueueTimeout.
#[tokio::test(start_paused = true)]
async fn test_queue_timeout() {
    let queue = AdmissionQueue::new(RateLimitConfig { queue_timeout_ms: 500, ..config(10, 1) })
        .unwrap();

    let blocker = queue.enqueue(
        || async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok::<_, ClassifiedError>(())
        },
        0,
    );
    let waiting = queue.enqueue(|| async { Ok::<_, ClassifiedError>(()) }, 0);

    let result = waiting.await;

    match result {
        Err(AdmissionError::QueueTimeout { waited }) => {
            assert!(waited >= Duration::from_millis(500));
        }
        other => panic!("expected QueueTimeout, got {other:?}"),
    }
    blocker.await.unwrap();
}

/// Validates clear_queue rejects everything queued and leaves in-flight work.
///
/// # Test Steps
/// 1. Occupy the single concurrency slot with a slow operation
/// 2. Queue three more operations
/// 3. Clear the queue and verify the count
/// 4. Verify each queued ticket fails with QueueCleared
/// 5. Verify the in-flight operation still succeeds
#[tokio::test(start_paused = true)]
async fn test_clear_queue_rejects_queued_operations() {
    let queue = AdmissionQueue::new(config(10, 1)).unwrap();

    let blocker = queue.enqueue(
        || async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, ClassifiedError>("kept")
        },
        0,
    );
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(1)).await;

    let queued: Vec<_> =
        (0..3).map(|_| queue.enqueue(|| async { Ok::<_, ClassifiedError>("dropped") }, 0)).collect();

    assert_eq!(queue.clear_queue(), 3);
    assert_eq!(queue.get_stats().queue_length, 0);

    for ticket in queued {
        assert!(matches!(ticket.await, Err(AdmissionError::QueueCleared)));
    }
    assert_eq!(blocker.await.unwrap(), "kept");
}

/// Validates that an operation in rate-limit backoff during a clear is
/// rejected instead of requeued.
#[tokio::test(start_paused = true)]
async fn test_clear_reaches_operations_in_backoff() {
    let queue = AdmissionQueue::new(config(10, 10)).unwrap();

    let ticket = queue.enqueue(|| async { Err::<(), _>(rate_limited(1000)) }, 0);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(queue.clear_queue(), 0);
    assert!(matches!(ticket.await, Err(AdmissionError::QueueCleared)));
}

/// Validates that a configuration update applies to the next decisions.
#[tokio::test(start_paused = true)]
async fn test_update_config_takes_effect() {
    let queue = AdmissionQueue::new(config(1, 10)).unwrap();

    let first = queue.enqueue(|| async { Ok::<_, ClassifiedError>(()) }, 0);
    let rest: Vec<_> = (0..2).map(|_| queue.enqueue(|| async { Ok::<_, ClassifiedError>(()) }, 0)).collect();

    first.await.unwrap();
    let started = Instant::now();
    queue
        .update_config(&RateLimitConfigPatch { max_requests_per_second: Some(10), ..Default::default() })
        .unwrap();

    for ticket in rest {
        ticket.await.unwrap();
    }

    assert!(started.elapsed() < Duration::from_millis(1000));
}

/// Validates shutdown fails queued operations with SchedulerStopped.
#[tokio::test(start_paused = true)]
async fn test_shutdown_rejects_queued_operations() {
    let queue = AdmissionQueue::new(config(10, 1)).unwrap();

    let _blocker = queue.enqueue(
        || async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, ClassifiedError>(())
        },
        0,
    );
    tokio::time::sleep(Duration::from_millis(1)).await;
    let queued = queue.enqueue(|| async { Ok::<_, ClassifiedError>(()) }, 0);

    queue.shutdown();

    assert!(matches!(queued.await, Err(AdmissionError::SchedulerStopped)));
    assert!(queue.is_shutdown());
}

/// Validates statistics and derived health buckets.
#[tokio::test(start_paused = true)]
async fn test_stats_report_reflects_activity() {
    let queue = AdmissionQueue::new(config(2, 10)).unwrap();

    let tickets: Vec<_> = (0..4).map(|_| queue.enqueue(|| async { Ok::<_, ClassifiedError>(()) }, 0)).collect();
    for ticket in tickets {
        ticket.await.unwrap();
    }

    let report = queue.stats_report();
    assert_eq!(report.stats.total_requests, 4);
    assert_eq!(report.stats.total_errors, 0);
    assert_eq!(report.stats.queue_length, 0);
    assert_eq!(report.stats.in_flight, 0);
    assert_eq!(report.stats.requests_in_last_second, 2);
    assert!(report.stats.average_wait_time_ms > 0.0);
    assert_eq!(report.queue_status, QueueStatus::Empty);
    assert_eq!(report.health, HealthStatus::Healthy);
}
