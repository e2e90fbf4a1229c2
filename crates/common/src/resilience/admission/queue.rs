use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use apiguard_domain::{
    ClassifiedError, RateLimitConfig, RateLimitConfigPatch, RateLimitStats, StatsReport,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{AdmissionError, AdmissionResult};
use super::job::{AttemptOutcome, Job, TypedJob};
use super::state::{demoted_priority, Admitted, Placement, QueueState};

/// State shared by the queue handle, the scheduler task and executions
struct Shared {
    state: Mutex<QueueState>,
    wake: Notify,
    shutdown: CancellationToken,
}

impl Shared {
    fn wake_scheduler(&self) {
        // A stored permit covers wake-ups that land while the scheduler is busy
        self.wake.notify_one();
    }
}

/// Priority admission queue enforcing a rolling request rate and a
/// concurrency ceiling
///
/// Operations are admitted by descending priority, FIFO within a tier. An
/// operation is admitted only when the completions in the trailing second plus
/// the operations in flight stay below `max_requests_per_second`, and the
/// operations in flight stay below `max_concurrent_requests`.
///
/// A single scheduler task owns dequeuing. Dropping the queue (or calling
/// [`AdmissionQueue::shutdown`]) stops it and fails queued operations with
/// [`AdmissionError::SchedulerStopped`].
///
/// # Examples
///
/// ```rust
/// use apiguard_common::resilience::AdmissionQueue;
/// use apiguard_domain::{ClassifiedError, RateLimitConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = AdmissionQueue::new(RateLimitConfig::default())?;
///
/// let answer = queue.enqueue(|| async { Ok::<_, ClassifiedError>(42) }, 0).await?;
/// assert_eq!(answer, 42);
/// # Ok(())
/// # }
/// ```
pub struct AdmissionQueue {
    shared: Arc<Shared>,
}

impl AdmissionQueue {
    /// Create a queue and start its scheduler on the current tokio runtime
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the configuration does not validate, or
    /// `NoRuntime` when called outside a tokio runtime.
    pub fn new(config: RateLimitConfig) -> AdmissionResult<Self> {
        config.validate().map_err(AdmissionError::InvalidConfig)?;
        let handle = Handle::try_current().map_err(|_| AdmissionError::NoRuntime)?;

        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::new(config)),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
        });

        handle.spawn(run_scheduler(Arc::clone(&shared)));
        debug!("Admission scheduler started");

        Ok(Self { shared })
    }

    /// Register an operation for admission
    ///
    /// The operation is queued immediately; the returned ticket resolves with
    /// its result. The operation may run more than once: a rate-limited
    /// attempt is requeued at lower priority after a backoff, up to
    /// `max_rate_limit_requeues` times, after which the rate-limit error is
    /// surfaced as non-retryable. Dropping the ticket abandons the operation.
    pub fn enqueue<T, F, Fut>(&self, operation: F, priority: i32) -> AdmissionTicket<T>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ClassifiedError>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let id = Uuid::new_v4();
        let job: Box<dyn Job> = Box::new(TypedJob::new(operation, sender));

        {
            let mut state = self.shared.state.lock();
            if state.is_stopped() || self.shared.shutdown.is_cancelled() {
                drop(state);
                job.reject(AdmissionError::SchedulerStopped);
                return AdmissionTicket { id, receiver };
            }
            state.insert(id, priority, 0, Placement::Back, Instant::now(), job);
            debug!(
                operation_id = %id,
                priority,
                queue_length = state.queue_length(),
                "Operation enqueued"
            );
        }

        self.shared.wake_scheduler();
        AdmissionTicket { id, receiver }
    }

    /// Snapshot of the queue statistics
    pub fn get_stats(&self) -> RateLimitStats {
        self.shared.state.lock().snapshot(Instant::now())
    }

    /// Statistics with derived health buckets
    pub fn stats_report(&self) -> StatsReport {
        StatsReport::from(self.get_stats())
    }

    /// Current rate limiter configuration
    pub fn config(&self) -> RateLimitConfig {
        self.shared.state.lock().config.clone()
    }

    /// Reject every queued operation with `QueueCleared`
    ///
    /// In-flight operations are unaffected. Operations waiting out a
    /// rate-limit backoff are rejected when they would be requeued. Returns
    /// the number of queued operations removed.
    pub fn clear_queue(&self) -> usize {
        let cleared = self.shared.state.lock().clear();
        let count = cleared.len();

        for entry in cleared {
            entry.job.reject(AdmissionError::QueueCleared);
        }

        info!(cleared = count, "Admission queue cleared");
        self.shared.wake_scheduler();
        count
    }

    /// Merge and validate a configuration update
    ///
    /// The new limits apply to subsequent scheduling decisions only;
    /// deadlines of already queued operations are kept.
    ///
    /// # Errors
    /// Returns `InvalidConfig` and keeps the current configuration if the
    /// merged result does not validate.
    pub fn update_config(&self, patch: &RateLimitConfigPatch) -> AdmissionResult<RateLimitConfig> {
        let updated = {
            let mut state = self.shared.state.lock();
            let merged = state.config.merged(patch);
            merged.validate().map_err(AdmissionError::InvalidConfig)?;
            state.config = merged.clone();
            merged
        };

        info!(
            max_requests_per_second = updated.max_requests_per_second,
            max_concurrent_requests = updated.max_concurrent_requests,
            queue_timeout_ms = updated.queue_timeout_ms,
            "Rate limit configuration updated"
        );
        self.shared.wake_scheduler();
        Ok(updated)
    }

    /// Stop the scheduler and fail queued operations with `SchedulerStopped`
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }
}

impl Drop for AdmissionQueue {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl std::fmt::Debug for AdmissionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.get_stats();
        f.debug_struct("AdmissionQueue")
            .field("queue_length", &stats.queue_length)
            .field("in_flight", &stats.in_flight)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

/// Pending result of an enqueued operation
///
/// Resolves once the operation has been admitted and has finished, or once
/// it has been rejected by the queue.
#[must_use = "dropping the ticket abandons the operation"]
#[derive(Debug)]
pub struct AdmissionTicket<T> {
    id: Uuid,
    receiver: oneshot::Receiver<Result<T, AdmissionError>>,
}

impl<T> AdmissionTicket<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl<T> Future for AdmissionTicket<T> {
    type Output = AdmissionResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|received| match received {
            Ok(result) => result,
            Err(_) => Err(AdmissionError::SchedulerStopped),
        })
    }
}

/* -------------------------------------------------------------------------- */
/* Scheduler */
/* -------------------------------------------------------------------------- */

async fn run_scheduler(shared: Arc<Shared>) {
    loop {
        let (expired, admitted, wait) = {
            let mut state = shared.state.lock();
            let now = Instant::now();
            state.trim_window(now);
            let expired = state.take_expired(now);
            let admitted = state.admit_ready(now);
            let wait = state.next_wake(now);
            (expired, admitted, wait)
        };

        for entry in expired {
            warn!(
                operation_id = %entry.id,
                waited_ms = entry.waited.as_millis() as u64,
                "Operation timed out in admission queue"
            );
            entry.job.reject(AdmissionError::QueueTimeout { waited: entry.waited });
        }

        for entry in admitted {
            debug!(
                operation_id = %entry.id,
                priority = entry.priority,
                waited_ms = entry.waited.as_millis() as u64,
                "Operation admitted"
            );
            tokio::spawn(execute(Arc::clone(&shared), entry));
        }

        tokio::select! {
            () = shared.shutdown.cancelled() => break,
            () = shared.wake.notified() => {}
            () = sleep_for(wait) => {}
        }
    }

    let remaining = shared.state.lock().stop();
    let count = remaining.len();
    for entry in remaining {
        entry.job.reject(AdmissionError::SchedulerStopped);
    }
    debug!(rejected = count, "Admission scheduler stopped");
}

async fn sleep_for(wait: Option<std::time::Duration>) {
    match wait {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}

/// Run one admitted execution and report back to the scheduler
async fn execute(shared: Arc<Shared>, admitted: Admitted) {
    let Admitted { id, priority, rate_limit_attempts, job, .. } = admitted;
    let outcome = job.run().await;

    let failed = matches!(outcome, AttemptOutcome::Failed | AttemptOutcome::RateLimited(..));
    let (config, generation) = {
        let mut state = shared.state.lock();
        state.complete(Instant::now(), failed);
        (state.config.clone(), state.clear_generation())
    };
    shared.wake_scheduler();

    let AttemptOutcome::RateLimited(error, job) = outcome else {
        return;
    };

    if rate_limit_attempts >= config.max_rate_limit_requeues {
        warn!(
            operation_id = %id,
            requeues = rate_limit_attempts,
            "Rate limit requeues exhausted, surfacing error"
        );
        job.reject(AdmissionError::Operation(error.into_exhausted(rate_limit_attempts)));
        return;
    }

    let delay = {
        let state = shared.state.lock();
        state.rate_limit_delay(error.retry_after_ms(), rate_limit_attempts)
    };
    let next_priority = demoted_priority(priority);
    warn!(
        operation_id = %id,
        delay_ms = delay.as_millis() as u64,
        attempt = rate_limit_attempts + 1,
        priority = next_priority,
        "Rate limited, requeueing after backoff"
    );

    tokio::select! {
        () = shared.shutdown.cancelled() => {
            job.reject(AdmissionError::SchedulerStopped);
            return;
        }
        () = tokio::time::sleep(delay) => {}
    }

    if job.is_abandoned() {
        return;
    }

    {
        let mut state = shared.state.lock();
        if state.is_stopped() {
            drop(state);
            job.reject(AdmissionError::SchedulerStopped);
            return;
        }
        if state.clear_generation() != generation {
            drop(state);
            job.reject(AdmissionError::QueueCleared);
            return;
        }
        let attempts = rate_limit_attempts + 1;
        state.insert(id, next_priority, attempts, Placement::Front, Instant::now(), job);
    }
    shared.wake_scheduler();
}
