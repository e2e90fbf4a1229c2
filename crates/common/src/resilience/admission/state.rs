//! Scheduling state of the admission queue
//!
//! Everything here is synchronous and runs under the queue's mutex. The
//! scheduler task and the public API take the lock, mutate, collect the work
//! to do (jobs to spawn or reject) and release it before awaiting anything.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::time::Duration;

use apiguard_domain::constants::{
    MIN_POLL_DELAY_MS, MIN_PRIORITY, RATE_LIMIT_BACKOFF_BASE_MS, RATE_WINDOW_MS,
    WAIT_TIME_SMOOTHING,
};
use apiguard_domain::{RateLimitConfig, RateLimitStats};
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use super::job::Job;

/// Operation waiting for admission
pub(crate) struct PendingEntry {
    pub id: Uuid,
    pub priority: i32,
    /// Tie-breaker within a priority tier; lower runs first
    pub sequence: i64,
    pub enqueued_at: Instant,
    pub deadline: Instant,
    pub rate_limit_attempts: u32,
    pub job: Box<dyn Job>,
}

impl PartialEq for PendingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for PendingEntry {}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower sequence first
        self.priority.cmp(&other.priority).then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Where a (re-)inserted entry lands within its priority tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    Back,
    Front,
}

/// Admitted entry, handed to the scheduler for execution
pub(crate) struct Admitted {
    pub id: Uuid,
    pub priority: i32,
    pub rate_limit_attempts: u32,
    pub waited: Duration,
    pub job: Box<dyn Job>,
}

/// Entry that ran out of queue time
pub(crate) struct Expired {
    pub id: Uuid,
    pub waited: Duration,
    pub job: Box<dyn Job>,
}

pub(crate) struct QueueState {
    pub config: RateLimitConfig,
    pending: BinaryHeap<PendingEntry>,
    window: VecDeque<Instant>,
    in_flight: usize,
    next_back_sequence: i64,
    next_front_sequence: i64,
    clear_generation: u64,
    average_wait_ms: Option<f64>,
    total_requests: u64,
    total_errors: u64,
    last_request_time: Option<DateTime<Utc>>,
    stopped: bool,
}

impl QueueState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            pending: BinaryHeap::new(),
            window: VecDeque::new(),
            in_flight: 0,
            next_back_sequence: 0,
            next_front_sequence: -1,
            clear_generation: 0,
            average_wait_ms: None,
            total_requests: 0,
            total_errors: 0,
            last_request_time: None,
            stopped: false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn clear_generation(&self) -> u64 {
        self.clear_generation
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn queue_length(&self) -> usize {
        self.pending.len()
    }

    /// Insert an entry, stamping its sequence, wait start and deadline
    pub fn insert(
        &mut self,
        id: Uuid,
        priority: i32,
        rate_limit_attempts: u32,
        placement: Placement,
        now: Instant,
        job: Box<dyn Job>,
    ) {
        let sequence = match placement {
            Placement::Back => {
                let sequence = self.next_back_sequence;
                self.next_back_sequence += 1;
                sequence
            }
            Placement::Front => {
                let sequence = self.next_front_sequence;
                self.next_front_sequence -= 1;
                sequence
            }
        };

        self.pending.push(PendingEntry {
            id,
            priority,
            sequence,
            enqueued_at: now,
            deadline: now + self.config.queue_timeout(),
            rate_limit_attempts,
            job,
        });
    }

    /// Drop completion timestamps older than the rate window
    pub fn trim_window(&mut self, now: Instant) {
        let window = Duration::from_millis(RATE_WINDOW_MS);
        while let Some(oldest) = self.window.front() {
            if now.duration_since(*oldest) >= window {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether one more operation may start right now
    ///
    /// In-flight operations occupy rate slots, so the concurrency ceiling
    /// only matters when it is below the per-second limit.
    pub fn can_admit(&self) -> bool {
        let max_rps = self.config.max_requests_per_second as usize;
        let max_concurrent = self.config.max_concurrent_requests as usize;
        self.window.len() + self.in_flight < max_rps && self.in_flight < max_concurrent
    }

    /// Remove every entry whose deadline has passed
    pub fn take_expired(&mut self, now: Instant) -> Vec<Expired> {
        if !self.pending.iter().any(|entry| entry.deadline <= now) {
            return Vec::new();
        }

        let (expired, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.pending).into_iter().partition(|entry| entry.deadline <= now);
        self.pending = kept.into_iter().collect();

        expired
            .into_iter()
            .map(|entry| Expired {
                id: entry.id,
                waited: now.duration_since(entry.enqueued_at),
                job: entry.job,
            })
            .collect()
    }

    /// Admit entries in priority order while the limits allow
    ///
    /// Entries whose caller already gave up are discarded without counting
    /// against the limits.
    pub fn admit_ready(&mut self, now: Instant) -> Vec<Admitted> {
        let mut admitted = Vec::new();

        while self.can_admit() {
            let Some(entry) = self.pending.pop() else {
                break;
            };
            if entry.job.is_abandoned() {
                continue;
            }

            let waited = now.duration_since(entry.enqueued_at);
            self.record_wait(waited);
            self.in_flight += 1;
            self.total_requests += 1;
            self.last_request_time = Some(Utc::now());

            admitted.push(Admitted {
                id: entry.id,
                priority: entry.priority,
                rate_limit_attempts: entry.rate_limit_attempts,
                waited,
                job: entry.job,
            });
        }

        admitted
    }

    /// Record the end of an admitted execution
    pub fn complete(&mut self, now: Instant, failed: bool) {
        self.window.push_back(now);
        self.in_flight = self.in_flight.saturating_sub(1);
        if failed {
            self.total_errors += 1;
        }
    }

    /// How long the scheduler may sleep before something can change on its own
    ///
    /// `None` means only an external wake-up (enqueue, completion, config
    /// update) can make progress.
    pub fn next_wake(&self, now: Instant) -> Option<Duration> {
        let nearest_deadline = self.pending.iter().map(|entry| entry.deadline).min()?;
        let until_deadline = nearest_deadline.saturating_duration_since(now);

        let until_capacity = if self.can_admit() {
            Duration::ZERO
        } else {
            match self.window.front() {
                Some(oldest) => (*oldest + Duration::from_millis(RATE_WINDOW_MS))
                    .saturating_duration_since(now),
                None => Duration::from_millis(MIN_POLL_DELAY_MS),
            }
        };

        Some(until_capacity.min(until_deadline))
    }

    /// Remove all pending entries and start a new clear generation
    pub fn clear(&mut self) -> Vec<PendingEntry> {
        self.clear_generation += 1;
        std::mem::take(&mut self.pending).into_vec()
    }

    /// Mark the queue stopped and hand back everything still pending
    pub fn stop(&mut self) -> Vec<PendingEntry> {
        self.stopped = true;
        std::mem::take(&mut self.pending).into_vec()
    }

    /// Backoff before a rate-limited operation is requeued
    ///
    /// The server's `Retry-After` wins over the computed backoff but is
    /// capped at `max_backoff_delay_ms` like it.
    pub fn rate_limit_delay(&self, retry_after_ms: Option<u64>, attempt: u32) -> Duration {
        if let Some(retry_after_ms) = retry_after_ms {
            return Duration::from_millis(retry_after_ms.min(self.config.max_backoff_delay_ms));
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = RATE_LIMIT_BACKOFF_BASE_MS as f64 * self.config.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.config.max_backoff_delay_ms as f64);
        Duration::from_secs_f64(capped / 1000.0)
    }

    pub fn snapshot(&mut self, now: Instant) -> RateLimitStats {
        self.trim_window(now);
        RateLimitStats {
            requests_in_last_second: self.window.len(),
            queue_length: self.pending.len(),
            in_flight: self.in_flight,
            average_wait_time_ms: self.average_wait_ms.unwrap_or(0.0),
            total_requests: self.total_requests,
            total_errors: self.total_errors,
            last_request_time: self.last_request_time,
        }
    }

    fn record_wait(&mut self, waited: Duration) {
        let sample = waited.as_secs_f64() * 1000.0;
        self.average_wait_ms = Some(match self.average_wait_ms {
            Some(average) => average * (1.0 - WAIT_TIME_SMOOTHING) + sample * WAIT_TIME_SMOOTHING,
            None => sample,
        });
    }
}

/// Priority of an operation requeued after a rate-limit response
pub(crate) fn demoted_priority(priority: i32) -> i32 {
    priority.saturating_sub(1).max(MIN_PRIORITY)
}
