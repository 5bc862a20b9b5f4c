//! Capped fixed-delay retry for session requests.
//!
//! Login and enumeration requests are retried a fixed number of times with a
//! constant pause between attempts. Unlike a hard process exit, exhaustion is
//! returned to the caller as the last error.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use media_rescue_core::session::{RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::new(3, Duration::from_secs(10));
//! assert_eq!(
//!     policy.should_retry(1),
//!     RetryDecision::Retry { delay: Duration::from_secs(10), attempt: 2 }
//! );
//! assert!(matches!(policy.should_retry(3), RetryDecision::DoNotRetry { .. }));
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::SessionError;

/// Default maximum attempts per session request.
pub const DEFAULT_LOGIN_MAX_ATTEMPTS: u32 = 10;

/// Default pause between session request attempts.
pub const DEFAULT_LOGIN_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Decision on whether to retry a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed).
        attempt: u32,
    },

    /// Give up.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Fixed-delay retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,
    /// Pause between attempts.
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_LOGIN_MAX_ATTEMPTS,
            delay: DEFAULT_LOGIN_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the pause between attempts.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Decides what to do after `attempt` (1-indexed) has failed.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }
        RetryDecision::Retry {
            delay: self.delay,
            attempt: attempt + 1,
        }
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the policy gives up.
///
/// # Errors
///
/// Returns the last error produced by `operation`.
pub async fn retry_fixed<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, SessionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SessionError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if !error.is_retryable() => return Err(error),
            Err(error) => match policy.should_retry(attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    log_retry(label, attempt, delay, &error);
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(label, attempt, reason, "giving up");
                    return Err(error);
                }
            },
        }
    }
}

fn log_retry(label: &str, attempt: u32, delay: Duration, error: &impl Display) {
    warn!(
        label,
        attempt,
        delay_secs = delay.as_secs_f64(),
        error = %error,
        "request failed; retrying"
    );
}
