//! Retry logic with exponential backoff for handling transient failures.
//!
//! Network calls made during checkout must fail fast: every attempt runs
//! under a timeout, only transient failures are retried, and the number of
//! retries is bounded. Whatever error remains is handed back to the caller
//! so the checkout can surface it instead of spinning.
//!
//! # Example
//!
//! ```rust
//! use storefront_runtime::retry::{RetryPolicy, RetryableError, retry_transient};
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! enum LookupError {
//!     Busy,
//!     TimedOut,
//! }
//!
//! impl std::fmt::Display for LookupError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl RetryableError for LookupError {
//!     fn is_transient(&self) -> bool {
//!         matches!(self, Self::Busy | Self::TimedOut)
//!     }
//!
//!     fn timed_out(_after: Duration) -> Self {
//!         Self::TimedOut
//!     }
//! }
//!
//! # async fn example() -> Result<(), LookupError> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(2)
//!     .initial_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(2))
//!     .multiplier(2.0)
//!     .build();
//!
//! let stock = retry_transient(policy, "stock.lookup", || async {
//!     Ok::<_, LookupError>(42)
//! })
//! .await?;
//! assert_eq!(stock, 42);
//! # Ok(())
//! # }
//! ```

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 2
/// - `initial_delay`: 200ms
/// - `max_delay`: 2 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
/// - `attempt_timeout`: 10 seconds
/// - `jitter`: off
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: usize,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Upper bound for a single attempt
    pub attempt_timeout: Duration,
    /// Add up to 25% random extra delay to each backoff
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
            attempt_timeout: None,
            jitter: false,
        }
    }

    /// A policy that never retries but still bounds the single attempt.
    #[must_use]
    pub fn no_retry(attempt_timeout: Duration) -> Self {
        Self::builder()
            .max_retries(0)
            .attempt_timeout(attempt_timeout)
            .build()
    }

    /// Calculate delay for a given attempt number.
    ///
    /// Uses exponential backoff: delay = `initial_delay` * (multiplier ^ attempt),
    /// capped at `max_delay`. With jitter enabled the capped delay grows by a
    /// random amount of at most a quarter.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let base = if attempt == 0 {
            self.initial_delay
        } else {
            let delay_ms =
                self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
            Duration::from_millis(delay_ms as u64).min(self.max_delay)
        };

        if self.jitter {
            let extra_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 4);
            base + Duration::from_millis(extra_ms)
        } else {
            base
        }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    attempt_timeout: Option<Duration>,
    jitter: bool,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Set the timeout applied to each individual attempt.
    #[must_use]
    pub const fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Enable randomized extra delay.
    #[must_use]
    pub const fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(2),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_millis(200)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(2)),
            multiplier: self.multiplier.unwrap_or(2.0),
            attempt_timeout: self.attempt_timeout.unwrap_or(Duration::from_secs(10)),
            jitter: self.jitter,
        }
    }
}

/// Errors that know whether a retry could help.
///
/// Implemented by the boundary error types of the network adapters.
pub trait RetryableError: std::fmt::Display {
    /// `true` for failures that may succeed on another attempt
    /// (timeouts, connection errors, 5xx, 429).
    fn is_transient(&self) -> bool;

    /// Error value for an attempt cut off by the policy's timeout.
    fn timed_out(after: Duration) -> Self;
}

/// Retry an async operation with custom retry logic.
///
/// The predicate decides whether an error should trigger a retry; errors it
/// rejects are returned immediately.
///
/// # Errors
///
/// Returns the first non-retryable error, or the last error once retries
/// are exhausted.
async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            },
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::warn!(error = %err, "Error is not retryable, failing immediately");
                    return Err(err);
                }

                if attempt >= policy.max_retries {
                    tracing::error!(attempt, error = %err, "Operation failed after max retries");
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Operation failed, retrying..."
                );

                sleep(delay).await;
                attempt += 1;
            },
        }
    }
}

/// Retry a network call that reports its own transience.
///
/// Each attempt is bounded by `policy.attempt_timeout`; a timed-out attempt
/// counts as a transient failure. Permanent failures are returned at once.
///
/// # Errors
///
/// Returns the first permanent error, or the last transient one once
/// retries are exhausted.
pub async fn retry_transient<F, Fut, T, E>(
    policy: RetryPolicy,
    operation_name: &'static str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let attempt_timeout = policy.attempt_timeout;
    let result = retry_with_predicate(
        policy,
        || {
            let attempt = operation();
            async move {
                match tokio::time::timeout(attempt_timeout, attempt).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(E::timed_out(attempt_timeout)),
                }
            }
        },
        |err: &E| err.is_transient(),
    )
    .await;

    if let Err(ref error) = result {
        metrics::counter!("retry.exhausted", "operation" => operation_name).increment(1);
        tracing::warn!(operation = operation_name, error = %error, "Network call failed");
    }
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    enum CallError {
        Unavailable,
        Rejected,
        TimedOut,
    }

    impl std::fmt::Display for CallError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl RetryableError for CallError {
        fn is_transient(&self) -> bool {
            matches!(self, Self::Unavailable | Self::TimedOut)
        }

        fn timed_out(_after: Duration) -> Self {
            Self::TimedOut
        }
    }

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(max_retries)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5))
            .attempt_timeout(Duration::from_millis(50))
            .build()
    }

    #[test]
    fn test_retry_policy_delay_calculation() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(100))
            .multiplier(2.0)
            .max_delay(Duration::from_secs(10))
            .build();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn test_retry_policy_max_delay_cap() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(1000))
            .multiplier(10.0)
            .max_delay(Duration::from_secs(2))
            .build();

        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(2));
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(400))
            .jitter(true)
            .build();

        for _ in 0..20 {
            let delay = policy.delay_for_attempt(0);
            assert!(delay >= Duration::from_millis(400));
            assert!(delay <= Duration::from_millis(500));
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_transient(fast_policy(3), "verify_payment", || {
            let c = Arc::clone(&counter_clone);
            async move {
                let attempt = c.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 {
                    Err(CallError::Unavailable)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_exhausted() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result: Result<(), _> = retry_transient(fast_policy(2), "create_order", || {
            let c = Arc::clone(&counter_clone);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(CallError::Unavailable)
            }
        })
        .await;

        assert_eq!(result, Err(CallError::Unavailable));
        assert_eq!(counter.load(Ordering::SeqCst), 3); // Initial + 2 retries
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result: Result<(), _> = retry_transient(fast_policy(5), "create_order", || {
            let c = Arc::clone(&counter_clone);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(CallError::Rejected)
            }
        })
        .await;

        assert_eq!(result, Err(CallError::Rejected));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let result: Result<u8, CallError> = retry_transient(fast_policy(1), "verify", || async {
            sleep(Duration::from_secs(5)).await;
            Ok(1)
        })
        .await;

        assert_eq!(result.unwrap_err(), CallError::TimedOut);
    }
}
