//! Retry policy for icons that failed to load.

use std::time::{Duration, Instant};

use crate::storage::{FailureKind, FailureRecord};

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default upper bound for the retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5 * 60);

/// Default number of failures after which an icon is given up on.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Decides whether a missing icon may be requested again.
///
/// Icons the API reported as nonexistent are never retried. Icons that
/// failed because no host answered are retried with exponential backoff
/// until `max_attempts` failures have been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn never() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay required after the given number of failures.
    pub fn cooldown(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Returns true if the failure no longer blocks a new request.
    pub fn allows_retry(&self, record: &FailureRecord, now: Instant) -> bool {
        match record.kind {
            FailureKind::NotFound => false,
            FailureKind::Unavailable => {
                record.attempts < self.max_attempts
                    && now.saturating_duration_since(record.failed_at)
                        >= self.cooldown(record.attempts)
            }
        }
    }

    /// Returns true if the failure will never be retried.
    pub fn is_permanent(&self, record: &FailureRecord) -> bool {
        record.kind == FailureKind::NotFound || record.attempts >= self.max_attempts
    }
}
