//! Bounded exponential backoff around provider operations.
//!
//! [`RetryPolicy`] describes the schedule; [`Retrier`] runs an operation
//! under it. Only transient kinds ([`RelayError::is_retryable`]) consume
//! further attempts, and after exhaustion the last classified error is
//! returned untouched so callers can still match on its kind.

use std::{future::Future, sync::Arc, time::Duration};

use hookrelay_core::{Clock, DispatchEvent, EventHandler, RetryScheduledEvent};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{RelayError, Result};

/// Retry schedule for provider operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the initial one.
    pub max_attempts: u32,

    /// Delay before the first retry; doubles for every retry after it.
    pub base_delay: Duration,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Jitter percentage (0.0 to 1.0). Zero disables jitter.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Returns the delay to wait after the `failed_attempt`-th attempt failed.
    ///
    /// Produces `base, 2*base, 4*base, ...` capped at `max_delay`, then
    /// applies jitter.
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(20);
        let multiplier = 2_u32.saturating_pow(exponent);
        let delay = std::cmp::min(self.base_delay.saturating_mul(multiplier), self.max_delay);

        std::cmp::min(apply_jitter(delay, self.jitter_factor), self.max_delay)
    }
}

/// Randomizes a delay by ±`jitter_factor` to spread out retry storms.
///
/// A NaN or non-positive factor leaves the delay untouched.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor.is_nan() || jitter_factor <= 0.0 {
        return duration;
    }

    let clamped_jitter = jitter_factor.clamp(0.0, 1.0);

    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * clamped_jitter;
    let jitter_offset = rng.random_range(-jitter_range..=jitter_range);
    let jittered_secs = duration.as_secs_f64() + jitter_offset;

    Duration::from_secs_f64(jittered_secs.max(0.0))
}

/// Executes operations under a [`RetryPolicy`].
///
/// Sleeps through the injected [`Clock`] and reports every scheduled retry
/// to the injected [`EventHandler`].
#[derive(Debug, Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventHandler>,
}

impl Retrier {
    /// Creates a retrier.
    pub fn new(policy: RetryPolicy, clock: Arc<dyn Clock>, events: Arc<dyn EventHandler>) -> Self {
        Self { policy, clock, events }
    }

    /// Runs `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last error once all
    /// attempts are exhausted.
    pub async fn execute<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with_cancel(operation, &CancellationToken::new(), f).await
    }

    /// Like [`Retrier::execute`], but abandons the in-flight attempt and any
    /// pending backoff as soon as `cancel` fires.
    ///
    /// # Errors
    ///
    /// As [`Retrier::execute`]; additionally returns an `Internal` error with
    /// code `cancelled` when cancellation wins.
    pub async fn execute_with_cancel<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut f: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled(operation)),
                outcome = f() => outcome,
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_retryable() {
                debug!(operation, attempt, error = %error, "operation failed permanently");
                return Err(error);
            }

            if attempt >= max_attempts {
                debug!(operation, attempts = attempt, error = %error, "retry attempts exhausted");
                return Err(error);
            }

            let delay = self.policy.delay_for(attempt);
            attempt += 1;

            self.events
                .handle_event(DispatchEvent::RetryScheduled(RetryScheduledEvent {
                    operation: operation.to_string(),
                    attempt,
                    max_attempts,
                    delay,
                    error_code: error.code().to_string(),
                    error_message: error.to_string(),
                    scheduled_at: self.clock.now_utc(),
                }))
                .await;

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled(operation)),
                () = self.clock.sleep(delay) => {},
            }
        }
    }
}

fn cancelled(operation: &str) -> RelayError {
    RelayError::internal("cancelled", format!("{operation} cancelled before completion"))
}
