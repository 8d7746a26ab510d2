//! # Reconnect policy for a lost broker connection.
//!
//! [`ReconnectPolicy`] controls how many times the connection manager retries
//! after the broker drops the connection, and how long it waits before each try.
//! It is parameterized by:
//! - [`ReconnectPolicy::max_attempts`] the retry budget;
//! - [`ReconnectPolicy::delay`] the linear delay step.
//!
//! The wait before attempt `i` (0-indexed) is `i × delay`: the first retry is
//! immediate, later ones back off linearly. Once the budget is spent the manager
//! stops retrying for good (fail-stop).
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use queue_worker::ReconnectPolicy;
//!
//! let policy = ReconnectPolicy {
//!     max_attempts: 3,
//!     delay: Duration::from_secs(2),
//! };
//!
//! assert_eq!(policy.delay_for(0), Duration::ZERO);
//! assert_eq!(policy.delay_for(1), Duration::from_secs(2));
//! assert_eq!(policy.delay_for(2), Duration::from_secs(4));
//! assert_eq!(policy.schedule().count(), 3);
//! ```

use std::time::Duration;

/// Linear, bounded reconnect policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Number of reconnect attempts before giving up.
    pub max_attempts: u32,
    /// Delay step; attempt `i` waits `i × delay`.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    /// Returns a policy with:
    /// - `max_attempts = 120`;
    /// - `delay = 2s`.
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_MAX_RECONNECT,
            delay: crate::config::DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Computes the wait before the given attempt (0-indexed).
    ///
    /// Saturates at [`Duration::MAX`] instead of overflowing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay.checked_mul(attempt).unwrap_or(Duration::MAX)
    }

    /// Iterates `(attempt, wait)` pairs for the whole budget.
    pub fn schedule(&self) -> impl Iterator<Item = (u32, Duration)> + '_ {
        (0..self.max_attempts).map(move |i| (i, self.delay_for(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_is_immediate() {
        let policy = ReconnectPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(0), Duration::ZERO);
    }

    #[test]
    fn delay_grows_linearly() {
        let policy = ReconnectPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(100),
        };
        let waits: Vec<_> = policy.schedule().map(|(_, d)| d).collect();
        assert_eq!(
            waits,
            vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
                Duration::from_millis(400),
            ]
        );
    }

    #[test]
    fn zero_budget_schedules_nothing() {
        let policy = ReconnectPolicy {
            max_attempts: 0,
            delay: Duration::from_secs(1),
        };
        assert_eq!(policy.schedule().count(), 0);
    }

    #[test]
    fn huge_attempt_saturates() {
        let policy = ReconnectPolicy {
            max_attempts: u32::MAX,
            delay: Duration::MAX,
        };
        assert_eq!(policy.delay_for(2), Duration::MAX);
    }
}
