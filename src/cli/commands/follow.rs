//! Bulk follow command.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::cli::helpers;
use crate::client::BlueskyClient;
use crate::config::Settings;
use crate::models::{parse_target_list, WorkerCommand};
use crate::rate_limit::{load_quota_state, save_quota_state, Operation, RateLimiter};
use crate::services::{FollowScheduler, SchedulerEvent};
use crate::store::SettingsStore;

pub(super) async fn cmd_follow(
    settings: &Settings,
    targets_file: Option<&Path>,
    identifier: Option<String>,
    password: Option<String>,
    remember: bool,
) -> anyhow::Result<()> {
    let db_path = settings.database_path();
    let store = SettingsStore::open(&db_path)?;

    let (identifier, password) = helpers::resolve_credentials(&store, identifier, password)?;
    let raw_targets = helpers::read_target_list(targets_file, &store)?;
    let targets = parse_target_list(&raw_targets);
    if targets.is_empty() {
        anyhow::bail!("target list is empty");
    }

    // Username and target list are always kept; the password only on
    // explicit request.
    store.set_username(&identifier)?;
    store.set_targets(&raw_targets)?;
    store.set_remember(remember)?;
    if remember {
        store.set_password(&password)?;
    } else {
        store.clear_password()?;
    }

    let client = BlueskyClient::new(&settings.service_url, settings.request_timeout())?;
    let session = client.login(&identifier, &password).await?;
    println!(
        "{} Logged in as @{}",
        style("✓").green(),
        style(&session.handle).bold()
    );

    let limiter = RateLimiter::new();
    if let Err(e) = load_quota_state(&limiter, &db_path).await {
        tracing::warn!("Failed to load quota state: {}", e);
    }

    // Skip handles already followed so the run spends quota on new ones
    let following = client.list_following(&session.did).await?;
    limiter.record(Operation::Read).await;
    let already: HashSet<String> = following
        .into_iter()
        .map(|f| f.handle.to_lowercase())
        .collect();
    let before = targets.len();
    let targets: Vec<_> = targets
        .into_iter()
        .filter(|t| !already.contains(&t.handle.to_lowercase()))
        .collect();
    let skipped = before - targets.len();
    if skipped > 0 {
        println!(
            "  {} {} already followed, skipped",
            style("→").dim(),
            skipped
        );
    }
    if targets.is_empty() {
        println!("{} Nothing to do", style("✓").green());
        return Ok(());
    }

    let (event_tx, mut event_rx) = mpsc::channel::<SchedulerEvent>(64);
    let (cmd_tx, cmd_rx) = mpsc::channel::<WorkerCommand>(8);

    let scheduler = FollowScheduler::new(Arc::new(client), limiter.clone(), event_tx, cmd_rx);
    let worker = tokio::spawn(scheduler.run(targets));

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/dim}] {pos}/{len} {msg}")
            .unwrap(),
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    SchedulerEvent::Started { total } => {
                        pb.set_length(total as u64);
                        pb.set_message("following...");
                    }
                    SchedulerEvent::Followed { handle } => {
                        pb.inc(1);
                        pb.set_message(format!("@{}", handle));
                    }
                    SchedulerEvent::AlreadyFollowing { handle } => {
                        pb.inc(1);
                        pb.println(format!(
                            "  {} Already following @{}",
                            style("→").dim(),
                            handle
                        ));
                    }
                    SchedulerEvent::QuotaDenied { handle, wait, kind } => {
                        pb.println(format!(
                            "  {} {} quota reached before @{}; waiting {}",
                            style("!").yellow(),
                            kind,
                            handle,
                            helpers::format_duration(wait)
                        ));
                        pb.set_message(format!("waiting ({} quota)", kind));
                    }
                    SchedulerEvent::RemoteRateLimited { handle, message } => {
                        pb.inc(1);
                        pb.println(format!(
                            "  {} Service rate limit on @{}: {}",
                            style("!").yellow(),
                            handle,
                            message
                        ));
                    }
                    SchedulerEvent::Failed { handle, error } => {
                        pb.inc(1);
                        pb.println(format!(
                            "  {} @{}: {}",
                            style("✗").red(),
                            handle,
                            error
                        ));
                    }
                    SchedulerEvent::Paused => pb.set_message("paused"),
                    SchedulerEvent::Resumed => pb.set_message("following..."),
                    SchedulerEvent::Finished { .. } => {}
                }
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                pb.println(format!(
                    "  {} Stopping after the current attempt...",
                    style("!").yellow()
                ));
                let _ = cmd_tx.send(WorkerCommand::Stop).await;
            }
        }
    }

    let outcome = worker.await?;
    pb.finish_and_clear();

    // Quota spent during the run must survive even a failed exit
    if let Err(e) = save_quota_state(&limiter, &db_path).await {
        tracing::warn!("Failed to save quota state: {}", e);
    }
    let stats = outcome?;
    store.save_stats(&stats)?;

    println!(
        "{} Followed {} of {} targets ({}% of attempts)",
        style("✓").green(),
        stats.successful,
        stats.total,
        stats.success_rate()
    );
    if stats.rate_limited > 0 {
        println!(
            "  {} {} rate-limit hits during the run",
            style("!").yellow(),
            stats.rate_limited
        );
    }
    let remaining = stats.total.saturating_sub(stats.processed);
    if remaining > 0 {
        println!(
            "  {} {} targets not attempted; rerun to continue",
            style("→").dim(),
            remaining
        );
    }

    Ok(())
}
