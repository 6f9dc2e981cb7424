//! Retry driver for the fetch phase.
//!
//! Retryability is a property of [`PipelineError`] itself, so the driver
//! needs no per-call classification: it re-runs an operation exactly when
//! the error it returned reports as retryable and the budget allows.

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::PipelineError;

/// Backoff schedule for one class of fetches.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries granted after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further one.
    pub base_delay: Duration,
    /// Ceiling no computed delay may exceed.
    pub max_delay: Duration,
    /// Spread concurrent retries out by scaling each delay by a random
    /// factor in [1.0, 1.5).
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let doubled = self
            .base_delay
            .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let capped = doubled.min(self.max_delay);
        if !self.jitter {
            return capped;
        }
        capped
            .mul_f64(rand::rng().random_range(1.0..1.5))
            .min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails terminally, exhausts the
/// policy's budget, or `token` is cancelled.
///
/// The closure receives the 0-indexed attempt number. Cancellation is
/// honored between attempts and during backoff sleeps; an attempt already
/// in flight always runs to completion.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    mut operation: F,
) -> Result<T, PipelineError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let mut attempt = 0u32;
    loop {
        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_retryable() || attempt >= policy.max_retries {
            return Err(err);
        }

        let delay = policy.delay_for(attempt);
        warn!(
            attempt = attempt + 1,
            remaining = policy.max_retries - attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient failure, backing off"
        );
        tokio::select! {
            _ = token.cancelled() => return Err(PipelineError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
