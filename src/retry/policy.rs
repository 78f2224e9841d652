//! Retry budget and backoff schedule.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Growth of the delay between attempts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Wait `base_backoff` between every attempt.
    Fixed,
    /// Double the delay after every failed attempt, up to `max_backoff`.
    #[default]
    Exponential,
}

/// How many times to attempt an operation and how long to wait in between.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use streamwire::retry::{BackoffStrategy, RetryPolicy};
///
/// let policy = RetryPolicy {
///     attempts: 4,
///     base_backoff: Duration::from_millis(100),
///     max_backoff: Duration::from_millis(250),
///     strategy: BackoffStrategy::Exponential,
/// };
/// assert_eq!(policy.delay_for(1), Duration::from_millis(100));
/// assert_eq!(policy.delay_for(2), Duration::from_millis(200));
/// assert_eq!(policy.delay_for(3), Duration::from_millis(250));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the first retry.
    pub base_backoff: Duration,
    /// Ceiling on any single delay.
    pub max_backoff: Duration,
    /// Delay growth between retries.
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Policy making a single attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            attempts: 1,
            ..Self::default()
        }
    }

    /// Clamp the policy to usable bounds.
    ///
    /// At least one attempt is made, and `max_backoff` is never below
    /// `base_backoff`.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            attempts: self.attempts.max(1),
            max_backoff: self.max_backoff.max(self.base_backoff),
            ..self
        }
    }

    /// Delay to wait before retry number `retry` (starting at 1).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_backoff,
            BackoffStrategy::Exponential => {
                let factor = 1_u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
                self.base_backoff.saturating_mul(factor)
            }
        };
        delay.min(self.max_backoff.max(self.base_backoff))
    }
}
