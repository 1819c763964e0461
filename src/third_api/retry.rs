//! Bounded retry loop for provider calls.
//!
//! The [`RetryDriver`] runs one provider operation until it yields a usable
//! payload, applying the classifier's [`RetryVerdict`]s:
//!
//! - [`RetryVerdict::Fatal`] - stop immediately, no retry
//! - [`RetryVerdict::RetryNow`] - sleep a random jitter and retry, bounded only
//!   by the attempt budget
//! - [`RetryVerdict::RetryLater`] - sleep a random jitter and retry at most
//!   `max_retry_later` times
//!
//! Attempts are strictly sequential; there are never two requests in flight
//! for the same call.
//!
//! # Example
//!
//! ```
//! use third_api_core::third_api::{RetryDriver, RetryVerdict};
//!
//! # async fn example() {
//! let driver = RetryDriver::default();
//! let payload = driver
//!     .run(|| async { RetryVerdict::Success(serde_json::json!({"ok": true})) })
//!     .await;
//! assert!(payload.is_ok());
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tracing::{debug, instrument};

use super::classify::RetryVerdict;

/// Default attempt budget; effectively unbounded for per-second throttling.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 500;

/// Default number of tolerated retry-later verdicts.
pub const DEFAULT_MAX_RETRY_LATER: u32 = 10;

/// Upper bound (exclusive) of the jitter slept between attempts.
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(1000);

/// Why a retry loop gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryFailure {
    /// A fatal verdict, or too many retry-later verdicts.
    Fatal(String),
    /// The attempt budget ran out while the provider kept throttling.
    Exhausted(String),
}

/// Sequential retry loop with uniform random jitter.
///
/// # Default Values
///
/// - `max_attempts`: 500
/// - `max_retry_later`: 10
/// - jitter: uniform in `[0, 1000)` ms
#[derive(Debug, Clone)]
pub struct RetryDriver {
    max_attempts: u32,
    max_retry_later: u32,
    max_jitter: Duration,
}

impl Default for RetryDriver {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_retry_later: DEFAULT_MAX_RETRY_LATER,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryDriver {
    /// Creates a driver with custom budgets.
    ///
    /// `max_attempts` includes the initial attempt and is at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, max_retry_later: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            max_retry_later,
            ..Self::default()
        }
    }

    /// Overrides the jitter ceiling; `Duration::ZERO` disables sleeping.
    #[must_use]
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Returns the configured attempt budget.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the configured retry-later budget.
    #[must_use]
    pub fn max_retry_later(&self) -> u32 {
        self.max_retry_later
    }

    /// Runs `op` until it succeeds, fails fatally or exhausts a budget.
    ///
    /// # Errors
    ///
    /// Returns [`RetryFailure::Fatal`] on a fatal verdict or when retry-later
    /// verdicts exceed `max_retry_later`, and [`RetryFailure::Exhausted`] when
    /// `max_attempts` calls were made without success.
    #[instrument(skip_all, fields(max_attempts = self.max_attempts, max_retry_later = self.max_retry_later))]
    pub async fn run<F, Fut>(&self, mut op: F) -> Result<Value, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RetryVerdict>,
    {
        let mut retry_later_count: u32 = 0;

        for attempt in 1..=self.max_attempts {
            match op().await {
                RetryVerdict::Success(payload) => return Ok(payload),
                RetryVerdict::Fatal(message) => {
                    debug!(attempt, %message, "fatal verdict, not retrying");
                    return Err(RetryFailure::Fatal(message));
                }
                RetryVerdict::RetryLater => {
                    retry_later_count += 1;
                    if retry_later_count > self.max_retry_later {
                        debug!(attempt, retry_later_count, "retry-later limit reached");
                        return Err(RetryFailure::Fatal(
                            "retry-later limit exceeded".to_string(),
                        ));
                    }
                    debug!(attempt, retry_later_count, "provider asked to retry later");
                }
                RetryVerdict::RetryNow => {
                    debug!(attempt, "provider per-second limit hit");
                }
            }

            if attempt < self.max_attempts {
                self.sleep_jitter().await;
            }
        }

        Err(RetryFailure::Exhausted(format!(
            "max attempts ({}) exhausted",
            self.max_attempts
        )))
    }

    async fn sleep_jitter(&self) {
        let jitter = self.calculate_jitter();
        if !jitter.is_zero() {
            tokio::time::sleep(jitter).await;
        }
    }

    /// Generates random jitter in `[0, max_jitter)`.
    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(&self) -> Duration {
        let ceiling_ms = self.max_jitter.as_millis() as u64;
        if ceiling_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(0..ceiling_ms))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instant_driver() -> RetryDriver {
        RetryDriver::default().with_max_jitter(Duration::ZERO)
    }

    #[test]
    fn test_default_budgets() {
        let driver = RetryDriver::default();
        assert_eq!(driver.max_attempts(), 500);
        assert_eq!(driver.max_retry_later(), 10);
        assert_eq!(driver.max_jitter, Duration::from_millis(1000));
    }

    #[test]
    fn test_max_attempts_minimum_is_one() {
        assert_eq!(RetryDriver::new(0, 3).max_attempts(), 1);
    }

    #[test]
    fn test_jitter_within_bounds() {
        let driver = RetryDriver::default();
        for _ in 0..100 {
            let jitter = driver.calculate_jitter();
            assert!(jitter < Duration::from_millis(1000), "jitter {jitter:?} too large");
        }
    }

    #[test]
    fn test_zero_jitter_ceiling() {
        assert_eq!(instant_driver().calculate_jitter(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_retry_now_three_times_then_success() {
        let calls = Cell::new(0u32);
        let result = instant_driver()
            .run(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n <= 3 {
                        RetryVerdict::RetryNow
                    } else {
                        RetryVerdict::Success(serde_json::json!({"n": n}))
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap()["n"], 4);
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn test_retry_now_does_not_consume_retry_later_budget() {
        let calls = Cell::new(0u32);
        let result = RetryDriver::new(500, 0)
            .with_max_jitter(Duration::ZERO)
            .run(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n <= 20 {
                        RetryVerdict::RetryNow
                    } else {
                        RetryVerdict::Success(serde_json::json!({}))
                    }
                }
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.get(), 21);
    }

    #[tokio::test]
    async fn test_retry_later_limit_fails_after_eleventh_verdict() {
        let calls = Cell::new(0u32);
        let result = instant_driver()
            .run(|| {
                calls.set(calls.get() + 1);
                async { RetryVerdict::RetryLater }
            })
            .await;

        assert_eq!(
            result.unwrap_err(),
            RetryFailure::Fatal("retry-later limit exceeded".to_string())
        );
        assert_eq!(calls.get(), 11, "must never attempt a 12th call");
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let calls = Cell::new(0u32);
        let result = instant_driver()
            .run(|| {
                calls.set(calls.get() + 1);
                async { RetryVerdict::Fatal("bad url".to_string()) }
            })
            .await;

        assert_eq!(result.unwrap_err(), RetryFailure::Fatal("bad url".to_string()));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_attempt_budget_exhausted() {
        let calls = Cell::new(0u32);
        let result = RetryDriver::new(5, 10)
            .with_max_jitter(Duration::ZERO)
            .run(|| {
                calls.set(calls.get() + 1);
                async { RetryVerdict::RetryNow }
            })
            .await;

        assert!(matches!(result, Err(RetryFailure::Exhausted(msg)) if msg.contains('5')));
        assert_eq!(calls.get(), 5);
    }

    #[tokio::test]
    async fn test_small_real_jitter_still_completes() {
        let calls = Cell::new(0u32);
        let result = RetryDriver::default()
            .with_max_jitter(Duration::from_millis(5))
            .run(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n == 1 {
                        RetryVerdict::RetryLater
                    } else {
                        RetryVerdict::Success(serde_json::json!({}))
                    }
                }
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.get(), 2);
    }
}
