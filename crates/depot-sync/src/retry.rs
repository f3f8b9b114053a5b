//! # Retry Policy
//!
//! Turns a failed attempt into the bookkeeping written back to the queue.
//!
//! ```text
//! RemoteError ──retry_class()──┬── Permanent ──► terminal, retry_count unchanged
//!                              │
//!                              └── Retryable ──► retry_count + 1
//!                                                  ├── == max_retries ► terminal
//!                                                  └── otherwise ────► next_attempt_at
//!                                                                      = now + delay(n)
//! ```
//!
//! `delay(n) = min(initial * 2^(n-1), max)` plus up to `jitter_ratio` of it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use depot_db::AttemptFailure;

use crate::error::{RemoteError, RetryClass};

/// Largest doubling exponent; 2^16 × the initial delay is past any sane cap.
const MAX_EXPONENT: u32 = 16;

/// Hard ceiling on any delay before jitter, whatever the policy says.
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Backoff and cap settings for transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub jitter_ratio: f64,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(300),
            jitter_ratio: 0.2,
            max_retries: 8,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `retry_count + 1`, without jitter.
    pub fn base_delay(&self, retry_count: u32) -> Duration {
        let exp = retry_count.saturating_sub(1).min(MAX_EXPONENT);
        self.initial
            .saturating_mul(1 << exp)
            .min(self.max)
            .min(MAX_DELAY)
    }

    /// Delay before attempt `retry_count + 1`, with random jitter on top.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let base = self.base_delay(retry_count);
        let spread = (base.as_millis() as f64 * self.jitter_ratio) as u64;
        if spread == 0 {
            return base;
        }

        let jitter = rand::thread_rng().gen_range(0..=spread);
        base.saturating_add(Duration::from_millis(jitter))
    }

    /// Decides what a failed attempt writes back to the queue.
    ///
    /// ## Arguments
    /// * `retry_count` - The row's count before this attempt
    /// * `error` - Why the attempt failed
    /// * `now` - Attempt time, the base for `next_attempt_at`
    pub fn failure_for(
        &self,
        retry_count: i64,
        error: &RemoteError,
        now: DateTime<Utc>,
    ) -> AttemptFailure {
        match error.retry_class() {
            RetryClass::Permanent => AttemptFailure {
                retry_count,
                terminal: true,
                error: error.to_string(),
                next_attempt_at: None,
            },
            RetryClass::Retryable => {
                let attempts = retry_count.saturating_add(1);

                if attempts >= i64::from(self.max_retries) {
                    return AttemptFailure {
                        retry_count: attempts,
                        terminal: true,
                        error: format!("retry limit reached: {}", error),
                        next_attempt_at: None,
                    };
                }

                let delay = self.delay(u32::try_from(attempts).unwrap_or(u32::MAX));
                let next = chrono::Duration::from_std(delay)
                    .map(|d| now + d)
                    .unwrap_or(now);

                AttemptFailure {
                    retry_count: attempts,
                    terminal: false,
                    error: error.to_string(),
                    next_attempt_at: Some(next),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(300),
            jitter_ratio: 0.2,
            max_retries: 5,
        }
    }

    #[test]
    fn test_base_delay_doubles_then_caps() {
        let p = policy();
        assert_eq!(p.base_delay(1), Duration::from_secs(2));
        assert_eq!(p.base_delay(2), Duration::from_secs(4));
        assert_eq!(p.base_delay(3), Duration::from_secs(8));
        assert_eq!(p.base_delay(8), Duration::from_secs(256));
        assert_eq!(p.base_delay(9), Duration::from_secs(300));
        assert_eq!(p.base_delay(1_000), Duration::from_secs(300));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let p = policy();
        for n in 1..12 {
            let base = p.base_delay(n);
            for _ in 0..50 {
                let d = p.delay(n);
                assert!(d >= base);
                assert!(d <= base + base / 5);
            }
        }

        let exact = RetryPolicy { jitter_ratio: 0.0, ..policy() };
        assert_eq!(exact.delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_transient_failure_schedules_retry() {
        let now = Utc::now();
        let failure = policy().failure_for(0, &RemoteError::Timeout(15_000), now);

        assert_eq!(failure.retry_count, 1);
        assert!(!failure.terminal);
        let next = failure.next_attempt_at.unwrap();
        assert!(next >= now + chrono::Duration::seconds(2));
        assert!(next <= now + chrono::Duration::milliseconds(2_400));
    }

    #[test]
    fn test_unbounded_policy_does_not_overflow_schedule() {
        let policy = RetryPolicy {
            initial: Duration::MAX,
            max: Duration::MAX,
            ..policy()
        };
        let now = Utc::now();
        let failure = policy.failure_for(3, &RemoteError::Timeout(15_000), now);

        assert!(!failure.terminal);
        let wait = failure.next_attempt_at.unwrap() - now;
        assert!(wait >= chrono::Duration::days(1));
        assert!(wait <= chrono::Duration::hours(29));
    }

    #[test]
    fn test_retry_cap_holds_the_line() {
        let failure = policy().failure_for(
            4,
            &RemoteError::from_status(503, "down"),
            Utc::now(),
        );

        assert_eq!(failure.retry_count, 5);
        assert!(failure.terminal);
        assert!(failure.next_attempt_at.is_none());
        assert!(failure.error.starts_with("retry limit reached"));
    }

    #[test]
    fn test_rejection_is_terminal_without_counting() {
        let failure = policy().failure_for(
            2,
            &RemoteError::from_status(400, "unknown sku"),
            Utc::now(),
        );

        assert_eq!(failure.retry_count, 2);
        assert!(failure.terminal);
        assert!(failure.next_attempt_at.is_none());
        assert!(failure.error.contains("unknown sku"));
    }
}
