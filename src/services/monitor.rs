//! Follower monitor worker.
//!
//! Polls the authenticated account's follower list, diffs it against
//! the set seen so far, and follows back anyone new under the same
//! quota and pacing discipline as the bulk scheduler.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::client::{ClientError, FollowApi, FollowerEntry};
use crate::models::{FollowTarget, WorkerCommand};
use crate::rate_limit::{Admission, Operation, RateLimiter};

/// Fallback suspension when a denial carries no usable wait time.
const DEFAULT_QUOTA_WAIT: Duration = Duration::from_millis(120_000);

/// Timing knobs for the monitoring loop.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay between follower checks.
    pub poll_interval: Duration,
    /// Delay between consecutive follow-backs within one cycle.
    pub follow_delay: Duration,
    /// Cooldown after a failed polling cycle.
    pub error_cooldown: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            follow_delay: Duration::from_secs(2),
            error_cooldown: Duration::from_secs(30),
        }
    }
}

/// Events emitted to the controller while monitoring.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// Baseline follower set captured.
    Initialized { known: usize },
    /// A polling cycle discovered new followers.
    NewFollowers { count: usize },
    /// Outcome of one follow-back attempt.
    FollowResult { handle: String, success: bool },
    /// A polling cycle failed; the loop continues after a cooldown.
    CycleError { error: String },
    /// Worker paused by operator.
    Paused,
    /// Worker resumed.
    Resumed,
}

/// Single-task worker that follows back new followers.
pub struct FollowerMonitor<C: FollowApi> {
    client: Arc<C>,
    limiter: RateLimiter,
    config: MonitorConfig,
    known: HashSet<String>,
    initialized: bool,
}

impl<C: FollowApi + 'static> FollowerMonitor<C> {
    pub fn new(client: Arc<C>, limiter: RateLimiter, config: MonitorConfig) -> Self {
        Self {
            client,
            limiter,
            config,
            known: HashSet::new(),
            initialized: false,
        }
    }

    /// Capture the current follower set as the baseline.
    ///
    /// Idempotent: a second call does not re-fetch.
    pub async fn initialize(&mut self) -> Result<usize, ClientError> {
        if self.initialized {
            return Ok(self.known.len());
        }

        let actor = self
            .client
            .session_did()
            .await
            .ok_or_else(|| ClientError::Auth("not logged in".to_string()))?;
        let followers = self.client.list_followers(&actor).await?;
        self.limiter.record(Operation::Read).await;

        self.known = followers.into_iter().map(|f| f.did).collect();
        self.initialized = true;
        info!("initialized with {} existing followers", self.known.len());
        Ok(self.known.len())
    }

    /// Fetch the current follower set and return anyone not yet known.
    ///
    /// New entries are added to the known set before returning; the set
    /// only ever grows.
    pub async fn check_new_followers(&mut self) -> Result<Vec<FollowerEntry>, ClientError> {
        self.initialize().await?;

        let actor = self
            .client
            .session_did()
            .await
            .ok_or_else(|| ClientError::Auth("not logged in".to_string()))?;
        let current = self.client.list_followers(&actor).await?;
        self.limiter.record(Operation::Read).await;

        let mut new_followers = Vec::new();
        for follower in current {
            if self.known.insert(follower.did.clone()) {
                new_followers.push(follower);
            }
        }

        if !new_followers.is_empty() {
            info!("found {} new followers", new_followers.len());
        }
        Ok(new_followers)
    }

    /// Poll until stopped, following back every newly seen follower.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<WorkerCommand>,
        events: mpsc::Sender<MonitorEvent>,
    ) -> anyhow::Result<()> {
        let mut paused = false;

        let baseline = self
            .initialize()
            .await
            .map_err(|e| anyhow::anyhow!("failed to initialize follower list: {e}"))?;
        let _ = events
            .send(MonitorEvent::Initialized { known: baseline })
            .await;

        loop {
            // Apply queued control messages at the cycle boundary
            loop {
                match commands.try_recv() {
                    Ok(cmd) => {
                        if !apply_command(cmd, &mut paused, &events).await {
                            return Ok(());
                        }
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => return Ok(()),
                }
            }

            // Paused: wait for a control message, keeping all state
            if paused {
                match commands.recv().await {
                    Some(cmd) => {
                        if !apply_command(cmd, &mut paused, &events).await {
                            return Ok(());
                        }
                        continue;
                    }
                    None => return Ok(()),
                }
            }

            match self.check_new_followers().await {
                Ok(new_followers) => {
                    if !new_followers.is_empty() {
                        let _ = events
                            .send(MonitorEvent::NewFollowers {
                                count: new_followers.len(),
                            })
                            .await;
                    }
                    for follower in new_followers {
                        let target = FollowTarget::resolved(follower.handle, follower.did);
                        if !self
                            .follow_back(target, &mut commands, &mut paused, &events)
                            .await?
                        {
                            return Ok(());
                        }
                    }
                }
                Err(ClientError::Auth(message)) => {
                    return Err(anyhow::anyhow!("authentication failed: {message}"));
                }
                Err(err) => {
                    warn!("follower check failed: {}", err);
                    let _ = events
                        .send(MonitorEvent::CycleError {
                            error: err.to_string(),
                        })
                        .await;
                    if !sleep_or_stop(self.config.error_cooldown, &mut commands, &mut paused, &events)
                        .await
                    {
                        return Ok(());
                    }
                    continue;
                }
            }

            if !sleep_or_stop(self.config.poll_interval, &mut commands, &mut paused, &events).await
            {
                return Ok(());
            }
        }
    }

    /// One follow-back under the shared quota and pacing discipline.
    ///
    /// Returns false if the worker should stop. Per-handle failures are
    /// reported and do not abort the cycle; authentication failure is
    /// fatal.
    async fn follow_back(
        &mut self,
        target: FollowTarget,
        commands: &mut mpsc::Receiver<WorkerCommand>,
        paused: &mut bool,
        events: &mpsc::Sender<MonitorEvent>,
    ) -> anyhow::Result<bool> {
        loop {
            match self.limiter.check_admission().await {
                Admission::Denied { wait, kind } => {
                    let wait = if wait.is_zero() { DEFAULT_QUOTA_WAIT } else { wait };
                    warn!("quota denied ({kind}), waiting {wait:?} before follow-back");
                    if !sleep_or_stop(wait, commands, paused, events).await {
                        return Ok(false);
                    }
                }
                Admission::Granted => break,
            }
        }

        if !sleep_or_stop(self.config.follow_delay, commands, paused, events).await {
            return Ok(false);
        }

        // Discovered followers carry their DID; the resolve branch only
        // runs for targets enqueued by handle alone.
        let outcome = async {
            let did = match &target.did {
                Some(did) => did.clone(),
                None => self.client.resolve_profile(&target.handle).await?.did,
            };
            self.client.follow(&did).await
        }
        .await;
        self.limiter.record(Operation::Follow).await;

        let success = match outcome {
            Ok(()) | Err(ClientError::AlreadyFollowing(_)) => true,
            Err(ClientError::Auth(message)) => {
                return Err(anyhow::anyhow!("authentication failed: {message}"));
            }
            Err(err) => {
                warn!("failed to follow back @{}: {}", target.handle, err);
                false
            }
        };

        let _ = events
            .send(MonitorEvent::FollowResult {
                handle: target.handle,
                success,
            })
            .await;
        Ok(true)
    }
}

/// Apply one control message. Returns false on stop.
async fn apply_command(
    cmd: WorkerCommand,
    paused: &mut bool,
    events: &mpsc::Sender<MonitorEvent>,
) -> bool {
    match cmd {
        WorkerCommand::Pause => {
            if !*paused {
                *paused = true;
                info!("follower monitor paused");
                let _ = events.send(MonitorEvent::Paused).await;
            }
            true
        }
        WorkerCommand::Resume => {
            if *paused {
                *paused = false;
                info!("follower monitor resumed");
                let _ = events.send(MonitorEvent::Resumed).await;
            }
            true
        }
        WorkerCommand::Stop => false,
    }
}

/// Sleep while staying responsive to commands. Returns false on stop.
async fn sleep_or_stop(
    duration: Duration,
    commands: &mut mpsc::Receiver<WorkerCommand>,
    paused: &mut bool,
    events: &mpsc::Sender<MonitorEvent>,
) -> bool {
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return true,
            cmd = commands.recv() => match cmd {
                None => {
                    // Controller gone; finish the wait and carry on
                    (&mut sleep).await;
                    return true;
                }
                Some(cmd) => {
                    if !apply_command(cmd, paused, events).await {
                        return false;
                    }
                    // While paused, hold here without ticking the sleep
                    while *paused {
                        match commands.recv().await {
                            Some(cmd) => {
                                if !apply_command(cmd, paused, events).await {
                                    return false;
                                }
                            }
                            None => return false,
                        }
                    }
                }
            },
        }
    }
}
