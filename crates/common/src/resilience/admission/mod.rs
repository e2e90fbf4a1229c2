//! Priority admission queue for calls to a rate-limited service
//!
//! - **Admission**: descending priority, FIFO within a tier, gated by a
//!   rolling one-second window of completions plus the operations in flight
//!   and by a concurrency ceiling
//! - **Rate-limit requeue**: an admitted operation that comes back rate
//!   limited is retried after a backoff at one lower priority, ahead of its
//!   new tier
//! - **Statistics**: snapshot counters and a smoothed queue wait, with health
//!   buckets through [`StatsReport`](apiguard_domain::StatsReport)

mod error;
mod job;
mod queue;
mod state;

pub use error::{AdmissionError, AdmissionResult};
pub use queue::{AdmissionQueue, AdmissionTicket};
