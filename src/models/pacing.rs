//! Adaptive pacing between consecutive follow attempts.

use std::time::Duration;

/// Starting delay between follows.
const INITIAL_INTERVAL: Duration = Duration::from_millis(2000);
/// Never pace faster than this.
const MIN_INTERVAL: Duration = Duration::from_millis(1000);
/// Never pace slower than this.
const MAX_INTERVAL: Duration = Duration::from_millis(10_000);
/// Successes in a row before the interval shrinks.
const SUCCESS_STREAK: u32 = 5;
/// Shrink factor applied after a success streak.
const SHRINK_FACTOR: f64 = 0.8;
/// Per-failure growth step: interval *= 1 + step * consecutive_failures.
const GROWTH_STEP: f64 = 0.5;

/// Delay state adapted by recent success/failure history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingState {
    interval: Duration,
    consecutive_successes: u32,
    consecutive_failures: u32,
}

impl PacingState {
    pub fn new() -> Self {
        Self {
            interval: INITIAL_INTERVAL,
            consecutive_successes: 0,
            consecutive_failures: 0,
        }
    }

    /// Current delay before the next dispatch.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record a successful (or idempotent duplicate) follow.
    ///
    /// After enough consecutive successes the interval shrinks, floored
    /// at the minimum, and the streak counter resets.
    pub fn record_success(&mut self) {
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;

        if self.consecutive_successes >= SUCCESS_STREAK {
            let shrunk = self.interval.as_secs_f64() * SHRINK_FACTOR;
            self.interval = Duration::from_secs_f64(shrunk).max(MIN_INTERVAL);
            self.consecutive_successes = 0;
        }
    }

    /// Record a failed follow; grows the interval with the failure streak.
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;

        let factor = 1.0 + GROWTH_STEP * f64::from(self.consecutive_failures);
        let grown = self.interval.as_secs_f64() * factor;
        self.interval = Duration::from_secs_f64(grown).min(MAX_INTERVAL);
    }
}

impl Default for PacingState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_two_seconds() {
        assert_eq!(PacingState::new().interval(), Duration::from_millis(2000));
    }

    #[test]
    fn test_shrinks_after_five_successes() {
        let mut pacing = PacingState::new();
        for _ in 0..4 {
            pacing.record_success();
        }
        assert_eq!(pacing.interval(), Duration::from_millis(2000));
        pacing.record_success();
        assert_eq!(pacing.interval(), Duration::from_millis(1600));
    }

    #[test]
    fn test_never_drops_below_floor() {
        let mut pacing = PacingState::new();
        for _ in 0..100 {
            pacing.record_success();
        }
        assert_eq!(pacing.interval(), MIN_INTERVAL);
    }

    #[test]
    fn test_grows_with_failure_streak() {
        let mut pacing = PacingState::new();
        pacing.record_failure();
        // 2000 * 1.5
        assert_eq!(pacing.interval(), Duration::from_millis(3000));
        pacing.record_failure();
        // 3000 * 2.0
        assert_eq!(pacing.interval(), Duration::from_millis(6000));
    }

    #[test]
    fn test_never_exceeds_cap() {
        let mut pacing = PacingState::new();
        for _ in 0..10 {
            pacing.record_failure();
        }
        assert_eq!(pacing.interval(), MAX_INTERVAL);
    }

    #[test]
    fn test_failure_resets_success_streak() {
        let mut pacing = PacingState::new();
        for _ in 0..4 {
            pacing.record_success();
        }
        pacing.record_failure();
        // Back to zero: five more successes needed before shrinking
        for _ in 0..4 {
            pacing.record_success();
        }
        assert_eq!(pacing.interval(), Duration::from_millis(3000));
    }
}
