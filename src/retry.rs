//! Retry logic with exponential backoff
//!
//! Used by runners for the optional in-process retry of a single job. The
//! default configuration performs no retries: the orchestrator's second pass is
//! the primary recovery mechanism, and this is an additional knob on top.
//!
//! Backoff sleeps are cancellation-aware: once the run is cancelled, no further
//! attempt is started and the last error is returned immediately.
//!
//! # Example
//!
//! ```no_run
//! use sopti::config::RetryConfig;
//! use sopti::retry::download_with_retry;
//! use sopti::types::{FailureReason, Outcome};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<Outcome, FailureReason> {
//! let config = RetryConfig {
//!     max_attempts: 2,
//!     ..Default::default()
//! };
//! let cancel = CancellationToken::new();
//! download_with_retry(&config, &cancel, || async {
//!     Err(FailureReason::ToolExit {
//!         code: Some(1),
//!         detail: Some("HTTPError: 429".into()),
//!     })
//! })
//! .await
//! # }
//! ```

use crate::config::RetryConfig;
use crate::types::FailureReason;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (tool crashed, rate limited, pipe broke) should return `true`.
/// Permanent failures (binary missing, run cancelled) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FailureReason {
    fn is_retryable(&self) -> bool {
        match self {
            // Never retry past a cancellation
            FailureReason::Cancelled => false,
            // The tool ran and failed; most failures are upstream hiccups
            FailureReason::ToolExit { .. } => true,
            // A binary that cannot be started will not start on the next try either
            FailureReason::Spawn { .. } => false,
            FailureReason::Other { .. } => true,
        }
    }
}

/// Run `operation`, retrying retryable failures with exponential backoff
///
/// Returns the first success, or the last error once `config.max_attempts`
/// retries are spent, the error is not retryable, or `cancel` fires during a
/// backoff sleep.
pub async fn download_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        tracing::debug!(error = %e, "Retry abandoned, run cancelled");
                        return Err(e);
                    }
                    () = tokio::time::sleep(jittered_delay) => {}
                }

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() && config.max_attempts > 0 {
                    tracing::debug!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
