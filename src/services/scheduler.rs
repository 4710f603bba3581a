//! Paced follow scheduler.
//!
//! Owns the target queue and drains it one attempt at a time: consult
//! the rate limiter, wait the pacing interval, dispatch, adapt pacing
//! from the outcome. Quota denials re-enqueue the target at the queue
//! head and suspend until the denying window resets.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::client::{ClientError, FollowApi};
use crate::models::{FollowStats, FollowTarget, PacingState, SchedulerState, WorkerCommand};
use crate::rate_limit::{Admission, LimitKind, Operation, RateLimiter};

/// Fallback suspension when a denial carries no usable wait time.
const DEFAULT_QUOTA_WAIT: Duration = Duration::from_millis(120_000);

/// Events emitted to the controller during a follow run.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// Run started with this many queued targets.
    Started { total: usize },
    /// Follow succeeded.
    Followed { handle: String },
    /// Already following; idempotent success.
    AlreadyFollowing { handle: String },
    /// Local quota denied the attempt; target re-queued.
    QuotaDenied {
        handle: String,
        wait: Duration,
        kind: LimitKind,
    },
    /// The remote service reported a rate limit after admission.
    RemoteRateLimited { handle: String, message: String },
    /// Attempt failed; target dropped.
    Failed { handle: String, error: String },
    /// Worker paused by operator.
    Paused,
    /// Worker resumed.
    Resumed,
    /// Run finished; final statistics.
    Finished { stats: FollowStats },
}

/// Single-task worker that follows queued targets at a paced rate.
pub struct FollowScheduler<C: FollowApi> {
    client: Arc<C>,
    limiter: RateLimiter,
    queue: VecDeque<FollowTarget>,
    stats: FollowStats,
    pacing: PacingState,
    state: SchedulerState,
    events: mpsc::Sender<SchedulerEvent>,
    commands: mpsc::Receiver<WorkerCommand>,
    commands_closed: bool,
    pause_pending: bool,
}

impl<C: FollowApi + 'static> FollowScheduler<C> {
    pub fn new(
        client: Arc<C>,
        limiter: RateLimiter,
        events: mpsc::Sender<SchedulerEvent>,
        commands: mpsc::Receiver<WorkerCommand>,
    ) -> Self {
        Self {
            client,
            limiter,
            queue: VecDeque::new(),
            stats: FollowStats::default(),
            pacing: PacingState::new(),
            state: SchedulerState::Idle,
            events,
            commands,
            commands_closed: false,
            pause_pending: false,
        }
    }

    /// Drain the queue to completion (or until stopped).
    ///
    /// Returns the final statistics; errors only on fatal conditions
    /// (authentication failure).
    pub async fn run(mut self, targets: Vec<FollowTarget>) -> anyhow::Result<FollowStats> {
        self.queue = VecDeque::from(targets);
        self.stats = FollowStats::new(self.queue.len());
        self.pacing = PacingState::new();
        self.state = SchedulerState::Running;

        info!("starting follow run with {} targets", self.stats.total);
        self.emit(SchedulerEvent::Started {
            total: self.stats.total,
        })
        .await;

        while matches!(
            self.state,
            SchedulerState::Running | SchedulerState::Paused
        ) {
            // Loop boundary: apply any pending control messages
            self.drain_commands().await;
            if self.state == SchedulerState::Stopped {
                break;
            }
            if self.state == SchedulerState::Paused && !self.wait_while_paused().await {
                break;
            }

            let Some(target) = self.queue.pop_front() else {
                break;
            };

            match self.limiter.check_admission().await {
                Admission::Denied { wait, kind } => {
                    let wait = if wait.is_zero() {
                        DEFAULT_QUOTA_WAIT
                    } else {
                        wait
                    };
                    self.stats.rate_limited += 1;
                    warn!("quota denied ({kind}), suspending for {wait:?}");
                    self.emit(SchedulerEvent::QuotaDenied {
                        handle: target.handle.clone(),
                        wait,
                        kind,
                    })
                    .await;
                    // Same target retries first once the window resets
                    self.queue.push_front(target);
                    if !self.suspend(wait).await {
                        break;
                    }
                    continue;
                }
                Admission::Granted => {}
            }

            // Pacing delay before the dispatch
            if !self.suspend(self.pacing.interval()).await {
                // Stopped before dispatch: the target was not consumed
                self.queue.push_front(target);
                break;
            }

            self.dispatch(target).await?;
        }

        self.state = SchedulerState::Stopped;
        info!(
            "follow run finished: {}/{} successful, {} rate limited",
            self.stats.successful, self.stats.total, self.stats.rate_limited
        );
        self.emit(SchedulerEvent::Finished { stats: self.stats })
            .await;
        Ok(self.stats)
    }

    /// Dispatch one admitted attempt and record its outcome.
    ///
    /// Consumption is recorded for every dispatched attempt, success or
    /// not. A stop arriving mid-flight lets the attempt complete
    /// (Draining) and halts afterwards.
    async fn dispatch(&mut self, target: FollowTarget) -> anyhow::Result<()> {
        let handle = target.handle.clone();
        let client = self.client.clone();
        let attempt = async move {
            let did = match target.did {
                Some(did) => did,
                None => client.resolve_profile(&target.handle).await?.did,
            };
            client.follow(&did).await
        };
        tokio::pin!(attempt);

        let outcome = loop {
            if self.commands_closed {
                break (&mut attempt).await;
            }
            tokio::select! {
                res = &mut attempt => break res,
                cmd = self.commands.recv() => match cmd {
                    None => self.commands_closed = true,
                    Some(WorkerCommand::Stop) => self.state = SchedulerState::Draining,
                    Some(WorkerCommand::Pause) => self.pause_pending = true,
                    Some(WorkerCommand::Resume) => self.pause_pending = false,
                },
            }
        };

        self.limiter.record(Operation::Follow).await;
        self.stats.processed += 1;

        match outcome {
            Ok(()) => {
                self.stats.successful += 1;
                self.pacing.record_success();
                info!("followed @{}", handle);
                self.emit(SchedulerEvent::Followed { handle }).await;
            }
            Err(ClientError::AlreadyFollowing(_)) => {
                self.stats.successful += 1;
                self.pacing.record_success();
                self.emit(SchedulerEvent::AlreadyFollowing { handle }).await;
            }
            Err(ClientError::RateLimited { message, .. }) => {
                self.stats.rate_limited += 1;
                self.pacing.record_failure();
                warn!("remote rate limit while following @{}: {}", handle, message);
                self.emit(SchedulerEvent::RemoteRateLimited { handle, message })
                    .await;
            }
            Err(ClientError::Auth(message)) => {
                self.emit(SchedulerEvent::Failed {
                    handle,
                    error: message.clone(),
                })
                .await;
                self.state = SchedulerState::Stopped;
                return Err(anyhow::anyhow!("authentication failed: {message}"));
            }
            Err(err) => {
                self.pacing.record_failure();
                warn!("failed to follow @{}: {}", handle, err);
                self.emit(SchedulerEvent::Failed {
                    handle,
                    error: err.to_string(),
                })
                .await;
            }
        }

        if self.state == SchedulerState::Draining {
            self.state = SchedulerState::Stopped;
        } else if self.pause_pending {
            self.pause_pending = false;
            self.state = SchedulerState::Paused;
            self.emit(SchedulerEvent::Paused).await;
        }
        Ok(())
    }

    /// Apply all queued commands without blocking.
    async fn drain_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(cmd) => self.apply_command(cmd).await,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.commands_closed = true;
                    break;
                }
            }
        }
    }

    async fn apply_command(&mut self, cmd: WorkerCommand) {
        match cmd {
            WorkerCommand::Pause => {
                if self.state == SchedulerState::Running {
                    self.state = SchedulerState::Paused;
                    info!("scheduler paused");
                    self.emit(SchedulerEvent::Paused).await;
                }
            }
            WorkerCommand::Resume => {
                if self.state == SchedulerState::Paused {
                    self.state = SchedulerState::Running;
                    info!("scheduler resumed");
                    self.emit(SchedulerEvent::Resumed).await;
                }
            }
            WorkerCommand::Stop => {
                self.state = SchedulerState::Stopped;
            }
        }
    }

    /// Block until resumed. Returns false if the worker should stop.
    async fn wait_while_paused(&mut self) -> bool {
        while self.state == SchedulerState::Paused {
            match self.commands.recv().await {
                Some(cmd) => self.apply_command(cmd).await,
                None => {
                    // Controller gone while paused: nothing can resume us
                    self.commands_closed = true;
                    self.state = SchedulerState::Stopped;
                    return false;
                }
            }
        }
        self.state == SchedulerState::Running
    }

    /// Sleep while staying responsive to commands.
    ///
    /// Returns false if a stop arrived; pause holds the worker here and
    /// the remaining sleep continues after resume.
    async fn suspend(&mut self, duration: Duration) -> bool {
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        loop {
            if self.commands_closed {
                (&mut sleep).await;
                return true;
            }
            tokio::select! {
                () = &mut sleep => return true,
                cmd = self.commands.recv() => match cmd {
                    None => self.commands_closed = true,
                    Some(WorkerCommand::Stop) => {
                        self.state = SchedulerState::Stopped;
                        return false;
                    }
                    Some(WorkerCommand::Pause) => {
                        self.state = SchedulerState::Paused;
                        self.emit(SchedulerEvent::Paused).await;
                        if !self.wait_while_paused().await {
                            return false;
                        }
                    }
                    Some(WorkerCommand::Resume) => {}
                },
            }
        }
    }

    async fn emit(&self, event: SchedulerEvent) {
        let _ = self.events.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Profile;
    use crate::rate_limit::RateLimitConfig;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Outcome {
        Success,
        Duplicate,
        RateLimited,
        NotFound,
        AuthExpired,
        Flaky,
    }

    struct MockApi {
        outcomes: HashMap<String, Outcome>,
        followed: Mutex<Vec<String>>,
        follow_delay: Duration,
    }

    impl MockApi {
        fn new(outcomes: &[(&str, Outcome)]) -> Self {
            Self {
                outcomes: outcomes
                    .iter()
                    .map(|(h, o)| (h.to_string(), *o))
                    .collect(),
                followed: Mutex::new(Vec::new()),
                follow_delay: Duration::ZERO,
            }
        }

        fn followed(&self) -> Vec<String> {
            self.followed.lock().unwrap().clone()
        }

        fn outcome_for_did(&self, did: &str) -> Outcome {
            let handle = did.trim_start_matches("did:plc:");
            self.outcomes.get(handle).copied().unwrap_or(Outcome::Success)
        }
    }

    #[async_trait]
    impl FollowApi for MockApi {
        async fn resolve_profile(&self, handle: &str) -> Result<Profile, ClientError> {
            if let Some(Outcome::NotFound) = self.outcomes.get(handle) {
                return Err(ClientError::NotFound(handle.to_string()));
            }
            Ok(Profile {
                did: format!("did:plc:{handle}"),
                handle: handle.to_string(),
                display_name: None,
            })
        }

        async fn follow(&self, did: &str) -> Result<(), ClientError> {
            if !self.follow_delay.is_zero() {
                tokio::time::sleep(self.follow_delay).await;
            }
            match self.outcome_for_did(did) {
                Outcome::Success => {
                    self.followed.lock().unwrap().push(did.to_string());
                    Ok(())
                }
                Outcome::Duplicate => Err(ClientError::AlreadyFollowing(did.to_string())),
                Outcome::RateLimited => Err(ClientError::RateLimited {
                    message: "Rate Limit Exceeded".to_string(),
                    retry_after: None,
                }),
                Outcome::AuthExpired => Err(ClientError::Auth("token expired".to_string())),
                Outcome::Flaky => Err(ClientError::Unexpected("boom".to_string())),
                Outcome::NotFound => Err(ClientError::NotFound(did.to_string())),
            }
        }

        async fn list_followers(&self, _actor: &str) -> Result<Vec<crate::client::FollowerEntry>, ClientError> {
            Ok(Vec::new())
        }

        async fn session_did(&self) -> Option<String> {
            Some("did:plc:me".to_string())
        }
    }

    struct Harness {
        cmd_tx: mpsc::Sender<WorkerCommand>,
        events: mpsc::Receiver<SchedulerEvent>,
    }

    fn scheduler_with(
        api: Arc<MockApi>,
        limiter: RateLimiter,
    ) -> (FollowScheduler<MockApi>, Harness) {
        let (event_tx, events) = mpsc::channel(256);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let scheduler = FollowScheduler::new(api, limiter, event_tx, cmd_rx);
        (scheduler, Harness { cmd_tx, events })
    }

    fn targets(handles: &[&str]) -> Vec<FollowTarget> {
        handles.iter().copied().map(FollowTarget::new).collect()
    }

    fn collect(events: &mut mpsc::Receiver<SchedulerEvent>) -> Vec<SchedulerEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = events.try_recv() {
            out.push(ev);
        }
        out
    }

    /// Clock that follows tokio's (paused) timeline instead of the wall.
    fn virtual_clock() -> Arc<dyn Fn() -> chrono::DateTime<chrono::Utc> + Send + Sync> {
        let start_instant = tokio::time::Instant::now();
        let start_utc = chrono::Utc::now();
        Arc::new(move || {
            let elapsed = start_instant.elapsed();
            start_utc + chrono::Duration::from_std(elapsed).unwrap_or_default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_targets_succeed() {
        let api = Arc::new(MockApi::new(&[]));
        let (scheduler, mut harness) = scheduler_with(api.clone(), RateLimiter::new());

        let stats = scheduler
            .run(targets(&["alice.test", "bob.test"]))
            .await
            .unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.rate_limited, 0);
        assert_eq!(stats.processed, 2);
        assert_eq!(
            api.followed(),
            vec!["did:plc:alice.test", "did:plc:bob.test"]
        );

        let events = collect(&mut harness.events);
        assert!(matches!(events.last(), Some(SchedulerEvent::Finished { .. })));
        drop(harness.cmd_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_denial_requeues_and_retries() {
        // Request window admits a single call; pre-spend it so the
        // first admission is denied.
        let limiter = RateLimiter::with_config(RateLimitConfig {
            request_limit: 1,
            ..Default::default()
        })
        .with_now_fn(virtual_clock());
        limiter.record(Operation::Read).await;

        let api = Arc::new(MockApi::new(&[]));
        let (scheduler, mut harness) = scheduler_with(api.clone(), limiter);

        let stats = scheduler.run(targets(&["alice.test"])).await.unwrap();

        // Denied, suspended until the window reset, then retried and
        // succeeded. Exactly one follow went out: no loss, no
        // duplication.
        assert!(stats.rate_limited >= 1);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.processed, 1);
        assert_eq!(api.followed(), vec!["did:plc:alice.test"]);

        let events = collect(&mut harness.events);
        let denied = events.iter().find_map(|ev| match ev {
            SchedulerEvent::QuotaDenied { handle, kind, wait } => {
                Some((handle.clone(), *kind, *wait))
            }
            _ => None,
        });
        let (handle, kind, wait) = denied.expect("expected a QuotaDenied event");
        assert_eq!(handle, "alice.test");
        assert_eq!(kind, LimitKind::Api);
        assert!(wait <= Duration::from_secs(300));
        drop(harness.cmd_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_counts_as_success() {
        let api = Arc::new(MockApi::new(&[("alice.test", Outcome::Duplicate)]));
        let (scheduler, harness) = scheduler_with(api, RateLimiter::new());

        let stats = scheduler.run(targets(&["alice.test"])).await.unwrap();

        assert_eq!(stats.successful, 1);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.rate_limited, 0);
        drop(harness);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_rate_limit_drops_target_with_backoff() {
        let api = Arc::new(MockApi::new(&[("alice.test", Outcome::RateLimited)]));
        let (scheduler, mut harness) = scheduler_with(api.clone(), RateLimiter::new());

        let stats = scheduler
            .run(targets(&["alice.test", "bob.test"]))
            .await
            .unwrap();

        // alice dropped after the remote rejection, bob still processed
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.rate_limited, 1);
        assert_eq!(api.followed(), vec!["did:plc:bob.test"]);

        let events = collect(&mut harness.events);
        assert!(events
            .iter()
            .any(|ev| matches!(ev, SchedulerEvent::RemoteRateLimited { .. })));
        drop(harness.cmd_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_skipped_without_retry() {
        let api = Arc::new(MockApi::new(&[("ghost.test", Outcome::NotFound)]));
        let (scheduler, harness) = scheduler_with(api.clone(), RateLimiter::new());

        let stats = scheduler
            .run(targets(&["ghost.test", "bob.test"]))
            .await
            .unwrap();

        assert_eq!(stats.processed, 2);
        assert_eq!(stats.successful, 1);
        assert_eq!(api.followed(), vec!["did:plc:bob.test"]);
        drop(harness);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_grows_interval_success_shrinks() {
        let api = Arc::new(MockApi::new(&[("flaky.test", Outcome::Flaky)]));
        let (mut scheduler, harness) = scheduler_with(api, RateLimiter::new());

        scheduler.stats = FollowStats::new(1);
        let before = scheduler.pacing.interval();
        scheduler.dispatch(FollowTarget::new("flaky.test")).await.unwrap();
        assert!(scheduler.pacing.interval() > before);

        // Five successes shrink it back below the failed level
        let after_failure = scheduler.pacing.interval();
        for _ in 0..5 {
            scheduler.dispatch(FollowTarget::new("ok.test")).await.unwrap();
        }
        assert!(scheduler.pacing.interval() < after_failure);
        drop(harness);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_dispatch() {
        let api = Arc::new(MockApi::new(&[]));
        let (scheduler, harness) = scheduler_with(api.clone(), RateLimiter::new());

        harness.cmd_tx.send(WorkerCommand::Stop).await.unwrap();
        let stats = scheduler
            .run(targets(&["alice.test", "bob.test"]))
            .await
            .unwrap();

        assert_eq!(stats.processed, 0);
        assert!(api.followed().is_empty());
        drop(harness);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_flight_lets_attempt_complete() {
        let mut api = MockApi::new(&[]);
        api.follow_delay = Duration::from_secs(5);
        let api = Arc::new(api);
        let (scheduler, harness) = scheduler_with(api.clone(), RateLimiter::new());

        let cmd_tx = harness.cmd_tx.clone();
        tokio::spawn(async move {
            // Lands inside the first attempt (2s pacing + 5s in flight)
            tokio::time::sleep(Duration::from_secs(3)).await;
            let _ = cmd_tx.send(WorkerCommand::Stop).await;
        });

        let stats = scheduler
            .run(targets(&["alice.test", "bob.test"]))
            .await
            .unwrap();

        // First attempt completed, second never dispatched
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.successful, 1);
        assert_eq!(api.followed(), vec!["did:plc:alice.test"]);
        drop(harness);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let api = Arc::new(MockApi::new(&[]));
        let (scheduler, mut harness) = scheduler_with(api.clone(), RateLimiter::new());

        harness.cmd_tx.send(WorkerCommand::Pause).await.unwrap();
        let cmd_tx = harness.cmd_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let _ = cmd_tx.send(WorkerCommand::Resume).await;
        });

        let stats = scheduler.run(targets(&["alice.test"])).await.unwrap();

        assert_eq!(stats.successful, 1);
        let events = collect(&mut harness.events);
        assert!(events.iter().any(|ev| matches!(ev, SchedulerEvent::Paused)));
        assert!(events.iter().any(|ev| matches!(ev, SchedulerEvent::Resumed)));
        drop(harness.cmd_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_still_persists_consumption() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.db");

        let limiter = RateLimiter::new();
        let api = Arc::new(MockApi::new(&[("alice.test", Outcome::AuthExpired)]));
        let (scheduler, harness) = scheduler_with(api, limiter.clone());

        // Attempt dispatched, then the session dies: the run errors out
        assert!(scheduler.run(targets(&["alice.test"])).await.is_err());

        // Controller saves quota after the worker exits, error or not
        crate::rate_limit::save_quota_state(&limiter, &db_path)
            .await
            .unwrap();
        let restored = RateLimiter::new();
        crate::rate_limit::load_quota_state(&restored, &db_path)
            .await
            .unwrap();

        let snapshot = restored.snapshot().await;
        assert_eq!(snapshot[0].consumed, 3); // hourly points
        assert_eq!(snapshot[2].consumed, 1); // request unit
        drop(harness);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumption_recorded_even_on_failure() {
        let limiter = RateLimiter::new();
        let api = Arc::new(MockApi::new(&[("flaky.test", Outcome::Flaky)]));
        let (scheduler, harness) = scheduler_with(api, limiter.clone());

        scheduler.run(targets(&["flaky.test"])).await.unwrap();

        let snapshot = limiter.snapshot().await;
        assert_eq!(snapshot[0].consumed, 3); // hourly points
        assert_eq!(snapshot[2].consumed, 1); // request unit
        drop(harness);
    }
}
