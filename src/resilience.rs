//! Retry executor with linear backoff, deadlines and cancellation.
//!
//! Every remote call made by the gateway goes through [`execute_with_retry`].
//! Attempts are strictly sequential: attempt N+1 starts only after attempt N
//! failed with a retryable error and its backoff elapsed. Both attempts and
//! backoff waits race against the caller's [`CallContext`].

use crate::constants::{DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_MAX_ATTEMPTS};
use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

/// Retry behavior for remote calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay unit; the wait after attempt k is `base_delay × k`.
    pub base_delay: Duration,
    /// Only retry errors classified as transient.
    pub transient_only: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            transient_only: true,
        }
    }
}

impl RetryPolicy {
    /// Execute once, never retry.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Retry every remote failure up to the attempt budget.
    pub fn retry_all(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            transient_only: false,
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Whether `err` may consume another attempt.
    pub fn should_retry(&self, err: &GatewayError) -> bool {
        !self.transient_only || err.is_retryable()
    }
}

/// Receiving side of a cancellation channel.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Check without waiting.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once cancellation is requested. Never resolves if the handle
    /// was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|&v| v).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Sending side of a cancellation channel.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Create a handle and its first signal.
    pub fn channel() -> (Self, CancelSignal) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, CancelSignal { receiver })
    }

    /// Another signal observing this handle.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Request cancellation of every call observing this handle.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

/// Deadline and cancellation for one dispatched call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub deadline: Option<Instant>,
    pub cancel: Option<CancelSignal>,
}

impl CallContext {
    /// No deadline, no cancellation.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Abort once `timeout` has elapsed from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: None,
        }
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel_on(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    /// Fail if the call was cancelled or its deadline passed.
    pub fn check(&self, started: Instant) -> Result<(), GatewayError> {
        if self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled) {
            return Err(GatewayError::Cancelled);
        }
        if self.deadline.is_some_and(|at| Instant::now() >= at) {
            return Err(deadline_exceeded(started));
        }
        Ok(())
    }

    /// Run `fut` unless cancellation or the deadline comes first.
    pub async fn guard<F: Future>(
        &self,
        started: Instant,
        fut: F,
    ) -> Result<F::Output, GatewayError> {
        let deadline = async {
            match self.deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending().await,
            }
        };
        let cancelled = async {
            match &self.cancel {
                Some(signal) => signal.cancelled().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(GatewayError::Cancelled),
            _ = deadline => Err(deadline_exceeded(started)),
            output = fut => Ok(output),
        }
    }
}

fn deadline_exceeded(started: Instant) -> GatewayError {
    GatewayError::DeadlineExceeded {
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub struct RetryResult<T> {
    pub result: Result<T, GatewayError>,
    /// Attempts actually started.
    pub attempts: u32,
    /// Total time spent, delays included.
    pub total_duration: Duration,
}

impl<T> RetryResult<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<T, GatewayError> {
        self.result
    }
}

/// Execute `operation` with bounded attempts and linear backoff.
///
/// A non-retryable error ends the call on the spot and is returned as is.
/// When the budget runs out on a retryable error the final error is wrapped in
/// [`GatewayError::RetriesExhausted`] (unless only one attempt was allowed).
///
/// # Example
///
/// ```ignore
/// let policy = RetryPolicy::default();
/// let outcome = execute_with_retry(&policy, &CallContext::unbounded(), || async {
///     adapter.execute(&request).await.into_result()
/// })
/// .await;
/// ```
pub async fn execute_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    ctx: &CallContext,
    mut operation: F,
) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let start = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let finish = |result: Result<T, GatewayError>, attempts: u32| RetryResult {
        result,
        attempts,
        total_duration: start.elapsed(),
    };

    let mut attempt = 0;
    loop {
        if let Err(abort) = ctx.check(start) {
            return finish(Err(abort), attempt);
        }
        attempt += 1;

        let err = match ctx.guard(start, operation()).await {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!("Remote call succeeded on attempt {}", attempt);
                }
                return finish(Ok(value), attempt);
            }
            Ok(Err(err)) => err,
            Err(abort) => return finish(Err(abort), attempt),
        };

        if !policy.should_retry(&err) {
            debug!("Non-retryable error, not retrying: {}", err);
            return finish(Err(err), attempt);
        }

        if attempt >= max_attempts {
            warn!("Remote call failed after {} attempts: {}", attempt, err);
            let err = if max_attempts > 1 {
                GatewayError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                }
            } else {
                err
            };
            return finish(Err(err), attempt);
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            "Retryable error on attempt {}/{}: {}; retrying in {:?}",
            attempt, max_attempts, err, delay
        );
        if let Err(abort) = ctx.guard(start, sleep(delay)).await {
            return finish(Err(abort), attempt);
        }
    }
}
