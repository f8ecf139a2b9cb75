//! Retry policy: decides backoff delays.

use std::time::Duration;

/// Backoff policy for failed jobs.
///
/// `next_delay` is a pure function of the attempt count, so the schedule for
/// a given job is deterministic and monotonically non-decreasing: repeated
/// failures are spaced increasingly far apart, up to `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Policy with a custom base delay, keeping the default multiplier/cap.
    pub fn with_base(base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..Self::default()
        }
    }

    /// Delay before the next retry, given the number of failed attempts so
    /// far (1-indexed: the first failure passes 1).
    ///
    /// delay = base_delay * multiplier^(attempts - 1), capped at max_delay.
    /// `attempts == 0` behaves like 1, and overflow saturates at the cap, so
    /// this is total for any input.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}
