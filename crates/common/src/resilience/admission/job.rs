//! Type-erased operations held by the admission queue
//!
//! The scheduler never sees the caller's result type. Each enqueued
//! operation is wrapped in a [`TypedJob`] that owns the re-callable operation
//! and the sending half of the caller's result channel, and is stored as a
//! `Box<dyn Job>`.

use std::future::Future;

use apiguard_domain::{ClassifiedError, ErrorCategory};
use futures::future::BoxFuture;
use tokio::sync::oneshot;

use super::error::AdmissionError;

/// Result channel of one enqueued operation
pub(crate) type ResultSender<T> = oneshot::Sender<Result<T, AdmissionError>>;

/// How one admitted execution ended
pub(crate) enum AttemptOutcome {
    /// Result delivered to the caller
    Succeeded,
    /// Error delivered to the caller
    Failed,
    /// Caller stopped waiting; nothing delivered
    Abandoned,
    /// Rate limited; the job comes back for another admission
    RateLimited(ClassifiedError, Box<dyn Job>),
}

pub(crate) trait Job: Send {
    /// Run the operation once, consuming the job unless it must be requeued
    fn run(self: Box<Self>) -> BoxFuture<'static, AttemptOutcome>;

    /// Fail the caller without running the operation
    fn reject(self: Box<Self>, error: AdmissionError);

    /// Whether the caller has dropped its ticket
    fn is_abandoned(&self) -> bool;
}

pub(crate) struct TypedJob<T, F> {
    operation: F,
    sender: ResultSender<T>,
}

impl<T, F> TypedJob<T, F> {
    pub(crate) fn new(operation: F, sender: ResultSender<T>) -> Self {
        Self { operation, sender }
    }
}

impl<T, F, Fut> Job for TypedJob<T, F>
where
    T: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, ClassifiedError>> + Send + 'static,
{
    fn run(mut self: Box<Self>) -> BoxFuture<'static, AttemptOutcome> {
        Box::pin(async move {
            let attempt = (self.operation)();

            let result = tokio::select! {
                result = attempt => result,
                () = self.sender.closed() => return AttemptOutcome::Abandoned,
            };

            match result {
                Ok(value) => {
                    // The receiver may vanish between completion and send
                    let _ = self.sender.send(Ok(value));
                    AttemptOutcome::Succeeded
                }
                Err(error) if error.category() == ErrorCategory::RateLimit => {
                    AttemptOutcome::RateLimited(error, self)
                }
                Err(error) => {
                    let _ = self.sender.send(Err(AdmissionError::Operation(error)));
                    AttemptOutcome::Failed
                }
            }
        })
    }

    fn reject(self: Box<Self>, error: AdmissionError) {
        let _ = self.sender.send(Err(error));
    }

    fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }
}
