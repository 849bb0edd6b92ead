//! Per-call deadline and exponential backoff around inference calls.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{InferenceClient, InferenceError, InferenceOutput, InferenceParams};

/// Retry policy for transient inference failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Deadline for a single call, in seconds.
    pub call_timeout_secs: u64,
}

impl RetryPolicy {
    /// Calculate the backoff delay for a given attempt number (0-indexed).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let delay =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32 - 1);
        (delay as u64).min(self.max_backoff_ms)
    }

    /// Whether another retry is allowed given the attempt count.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms(attempt))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for RetryPolicy {
    /// Default: 3 retries, 2s initial backoff, 2x multiplier, 30s max, 120s per call.
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 2_000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
            call_timeout_secs: 120,
        }
    }
}

/// Invoke with a per-call deadline, retrying transient failures with backoff.
///
/// An in-flight call is never interrupted by `cancel`; cancellation only
/// stops further retries, and the last error is returned.
pub async fn invoke_with_retry(
    client: &dyn InferenceClient,
    prompt: &str,
    params: &InferenceParams,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<InferenceOutput, InferenceError> {
    let deadline = policy.call_timeout();
    let mut attempt = 0u32;

    loop {
        let result = match tokio::time::timeout(deadline, client.invoke(prompt, params)).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout(deadline)),
        };

        let err = match result {
            Ok(output) => return Ok(output),
            Err(err) => err,
        };

        if !err.is_retryable() || !policy.should_retry(attempt) || cancel.is_cancelled() {
            return Err(err);
        }

        attempt += 1;
        let backoff = policy.backoff_duration(attempt);
        warn!(
            attempt,
            max_retries = policy.max_retries,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "Transient inference error — retrying"
        );

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = cancel.cancelled() => return Err(err),
        }
    }
}
