//! Token accrual rate.

use std::time::Duration;

/// `count` tokens accrue per `window` of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefillRate {
    count: u64,
    window: Duration,
}

impl RefillRate {
    /// Create a new refill rate.
    ///
    /// A zero `window` never accrues anything.
    pub fn new(count: u64, window: Duration) -> Self {
        Self { count, window }
    }

    /// Tokens added per window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Length of one window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whole tokens earned over `elapsed`, truncated toward zero.
    ///
    /// Integer nanosecond arithmetic, so frequent calls don't drift.
    pub fn tokens_for(&self, elapsed: Duration) -> u64 {
        let window_ns = self.window.as_nanos();
        if window_ns == 0 {
            return 0;
        }

        let tokens = elapsed.as_nanos() * u128::from(self.count) / window_ns;
        u64::try_from(tokens).unwrap_or(u64::MAX)
    }
}
