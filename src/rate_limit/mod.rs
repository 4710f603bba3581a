//! Quota-aware rate limiter.
//!
//! Tracks consumption across three independent windows (points per hour,
//! points per day, requests per five minutes) and decides whether a
//! follow may be dispatched. One shared instance is injected into every
//! component that spends quota; clones share the same state.

mod persistence;
mod window;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

pub(crate) use persistence::open_db;
pub use persistence::{load_quota_state, save_quota_state};
pub use window::RateWindow;

/// Which window denied an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Hourly,
    Daily,
    Api,
}

impl LimitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LimitKind::Hourly => "hourly",
            LimitKind::Daily => "daily",
            LimitKind::Api => "api",
        }
    }
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The operation may proceed.
    Granted,
    /// A window would be exceeded; retry after `wait`.
    Denied { wait: Duration, kind: LimitKind },
}

impl Admission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Admission::Granted)
    }
}

/// Kind of operation being metered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Follow record creation: costs points and a request unit.
    Follow,
    /// Read-only call (profile/follower fetches): request unit only.
    Read,
}

/// Window limits and costs.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Points per hour.
    pub hourly_point_limit: u32,
    /// Points per day.
    pub daily_point_limit: u32,
    /// Requests per request window.
    pub request_limit: u32,
    pub hourly_window: Duration,
    pub daily_window: Duration,
    pub request_window: Duration,
    /// Point cost of one follow (CREATE operation).
    pub follow_point_cost: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            hourly_point_limit: 5_000,
            daily_point_limit: 35_000,
            request_limit: 3_000,
            hourly_window: Duration::from_secs(3_600),
            daily_window: Duration::from_secs(86_400),
            request_window: Duration::from_secs(300),
            follow_point_cost: 3,
        }
    }
}

/// The three concurrent quota windows.
#[derive(Debug)]
pub(crate) struct QuotaState {
    pub(crate) hourly: RateWindow,
    pub(crate) daily: RateWindow,
    pub(crate) requests: RateWindow,
}

impl QuotaState {
    fn reclaim(&mut self, now: DateTime<Utc>) {
        self.hourly.reclaim(now);
        self.daily.reclaim(now);
        self.requests.reclaim(now);
    }
}

/// Point-in-time view of one window, for status display and persistence.
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    pub kind: LimitKind,
    pub consumed: u32,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
    pub window: Duration,
}

/// Clock used by the limiter; swappable so tests control time.
type NowFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Shared quota tracker.
pub struct RateLimiter {
    pub(crate) config: RateLimitConfig,
    pub(crate) state: Arc<RwLock<QuotaState>>,
    now_fn: NowFn,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter with default service quotas.
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    /// Create a limiter with custom quotas.
    pub fn with_config(config: RateLimitConfig) -> Self {
        let now = Utc::now();
        let state = QuotaState {
            hourly: RateWindow::new(config.hourly_point_limit, config.hourly_window, now),
            daily: RateWindow::new(config.daily_point_limit, config.daily_window, now),
            requests: RateWindow::new(config.request_limit, config.request_window, now),
        };
        Self {
            config,
            state: Arc::new(RwLock::new(state)),
            now_fn: Arc::new(Utc::now),
        }
    }

    /// Replace the clock (tests drive virtual time through this).
    #[cfg(test)]
    pub(crate) fn with_now_fn(mut self, now_fn: NowFn) -> Self {
        self.now_fn = now_fn;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now_fn)()
    }

    /// Decide whether a follow may be dispatched right now.
    pub async fn check_admission(&self) -> Admission {
        self.check_admission_at(self.now()).await
    }

    /// Admission check against an explicit clock.
    ///
    /// Expired windows are reclaimed first. Checks run in fixed order
    /// (hourly, daily, request count); the first window that would be
    /// exceeded determines the reported reason and wait.
    pub(crate) async fn check_admission_at(&self, now: DateTime<Utc>) -> Admission {
        let mut state = self.state.write().await;
        state.reclaim(now);

        let points = self.config.follow_point_cost;
        if state.hourly.would_exceed(points) {
            return Admission::Denied {
                wait: state.hourly.wait_until_reset(now),
                kind: LimitKind::Hourly,
            };
        }
        if state.daily.would_exceed(points) {
            return Admission::Denied {
                wait: state.daily.wait_until_reset(now),
                kind: LimitKind::Daily,
            };
        }
        if state.requests.would_exceed(1) {
            return Admission::Denied {
                wait: state.requests.wait_until_reset(now),
                kind: LimitKind::Api,
            };
        }
        Admission::Granted
    }

    /// Record consumption for an operation, regardless of its outcome.
    pub async fn record(&self, op: Operation) {
        self.record_at(op, self.now()).await;
    }

    pub(crate) async fn record_at(&self, op: Operation, now: DateTime<Utc>) {
        let mut state = self.state.write().await;
        state.reclaim(now);

        if op == Operation::Follow {
            let points = self.config.follow_point_cost;
            state.hourly.consume(points);
            state.daily.consume(points);
        }
        state.requests.consume(1);

        debug!(
            hourly = state.hourly.consumed,
            daily = state.daily.consumed,
            requests = state.requests.consumed,
            "quota consumed"
        );
    }

    /// Snapshot all windows after reclaiming expired ones.
    pub async fn snapshot(&self) -> Vec<WindowSnapshot> {
        let now = self.now();
        let mut state = self.state.write().await;
        state.reclaim(now);

        [
            (LimitKind::Hourly, &state.hourly),
            (LimitKind::Daily, &state.daily),
            (LimitKind::Api, &state.requests),
        ]
        .into_iter()
        .map(|(kind, w)| WindowSnapshot {
            kind,
            consumed: w.consumed,
            limit: w.limit,
            reset_at: w.reset_at,
            window: w.window,
        })
        .collect()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RateLimiter {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: self.state.clone(),
            now_fn: self.now_fn.clone(),
        }
    }
}
