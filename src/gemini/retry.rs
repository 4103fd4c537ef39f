//! Retry and backoff for rate-limited Gemini API calls.
//!
//! Only failures carrying a rate-limit signature are retried; everything else
//! is handed back to the caller untouched on the first occurrence.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::progress::{Progress, ProgressEvent};

/// Default number of retries after the first rate-limited attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay before the first retry. Generative endpoints recover slowly, so this
/// starts high and doubles on every further retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(5000);

/// Retry budget for a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `initial * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }
}

/// Errors that can tell whether the remote side was throttling us.
pub trait RateLimitSignature {
    fn is_rate_limited(&self) -> bool;
}

/// Fallback classifier for failures that only expose a message.
///
/// Matches an HTTP 429 code or the `RESOURCE_EXHAUSTED` status in any case.
pub fn message_has_rate_limit_signature(message: &str) -> bool {
    message.contains("429") || message.to_lowercase().contains("resource_exhausted")
}

/// Run `op`, retrying with exponential backoff while it fails rate-limited.
///
/// Each retry emits a [`ProgressEvent::RateLimited`] before sleeping. A
/// non-rate-limit failure, or a rate-limit failure once `max_retries` retries
/// have been spent, is returned as-is.
pub async fn call_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    progress: &Progress,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RateLimitSignature + Display,
{
    let mut attempt = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_rate_limited() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay_for(attempt);

                log::warn!(
                    "Rate limited (retry {}/{}): {}. Retrying in {:?}...",
                    attempt,
                    policy.max_retries,
                    error,
                    delay
                );
                progress.emit(ProgressEvent::RateLimited {
                    attempt,
                    max_retries: policy.max_retries,
                    delay,
                });

                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                if error.is_rate_limited() {
                    log::error!(
                        "Rate limit exceeded after {} attempts. Giving up.",
                        attempt + 1
                    );
                }
                return Err(error);
            }
        }
    }
}
