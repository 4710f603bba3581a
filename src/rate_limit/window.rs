//! A single fixed-reset quota window.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Budget of consumable units over a fixed duration.
///
/// The window resets in place: once more than `window` has elapsed since
/// `reset_at`, consumption drops to zero and `reset_at` moves to now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindow {
    /// Units consumed since the last reset.
    pub consumed: u32,
    /// Maximum units per window.
    pub limit: u32,
    /// Start of the current window.
    pub reset_at: DateTime<Utc>,
    /// Window duration.
    pub window: Duration,
}

impl RateWindow {
    pub fn new(limit: u32, window: Duration, now: DateTime<Utc>) -> Self {
        Self {
            consumed: 0,
            limit,
            reset_at: now,
            window,
        }
    }

    fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.reset_at).num_milliseconds()
    }

    fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }

    /// Reset the window if it has expired.
    pub fn reclaim(&mut self, now: DateTime<Utc>) {
        if self.elapsed_ms(now) > self.window_ms() {
            self.consumed = 0;
            self.reset_at = now;
        }
    }

    /// Would consuming `cost` more units exceed the limit?
    pub fn would_exceed(&self, cost: u32) -> bool {
        self.consumed + cost > self.limit
    }

    /// Time remaining until this window resets.
    pub fn wait_until_reset(&self, now: DateTime<Utc>) -> Duration {
        let remaining = self.window_ms() - self.elapsed_ms(now);
        Duration::from_millis(remaining.max(0) as u64)
    }

    /// Consume units without checking the limit.
    pub fn consume(&mut self, cost: u32) {
        self.consumed = self.consumed.saturating_add(cost);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_reclaim_only_after_expiry() {
        let start = Utc::now();
        let mut window = RateWindow::new(100, Duration::from_secs(60), start);
        window.consume(40);

        window.reclaim(start + TimeDelta::seconds(60));
        assert_eq!(window.consumed, 40);

        let later = start + TimeDelta::seconds(61);
        window.reclaim(later);
        assert_eq!(window.consumed, 0);
        assert_eq!(window.reset_at, later);
    }

    #[test]
    fn test_would_exceed_at_boundary() {
        let mut window = RateWindow::new(10, Duration::from_secs(60), Utc::now());
        window.consume(7);
        assert!(!window.would_exceed(3));
        assert!(window.would_exceed(4));
    }

    #[test]
    fn test_wait_until_reset() {
        let start = Utc::now();
        let window = RateWindow::new(10, Duration::from_secs(60), start);
        let wait = window.wait_until_reset(start + TimeDelta::seconds(15));
        assert_eq!(wait, Duration::from_secs(45));
    }

    #[test]
    fn test_wait_never_negative() {
        let start = Utc::now();
        let window = RateWindow::new(10, Duration::from_secs(60), start);
        let wait = window.wait_until_reset(start + TimeDelta::seconds(90));
        assert_eq!(wait, Duration::ZERO);
    }
}
