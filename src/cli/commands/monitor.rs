//! Follow-back monitor command.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use tokio::sync::mpsc;

use crate::cli::helpers;
use crate::client::BlueskyClient;
use crate::config::Settings;
use crate::models::WorkerCommand;
use crate::rate_limit::{load_quota_state, save_quota_state, RateLimiter};
use crate::services::{FollowerMonitor, MonitorConfig, MonitorEvent};
use crate::store::SettingsStore;

pub(super) async fn cmd_monitor(
    settings: &Settings,
    identifier: Option<String>,
    password: Option<String>,
    interval: u64,
) -> anyhow::Result<()> {
    let db_path = settings.database_path();
    let store = SettingsStore::open(&db_path)?;
    let (identifier, password) = helpers::resolve_credentials(&store, identifier, password)?;

    let client = BlueskyClient::new(&settings.service_url, settings.request_timeout())?;
    let session = client.login(&identifier, &password).await?;

    let limiter = RateLimiter::new();
    if let Err(e) = load_quota_state(&limiter, &db_path).await {
        tracing::warn!("Failed to load quota state: {}", e);
    }

    let config = MonitorConfig {
        poll_interval: Duration::from_secs(interval.max(1)),
        ..Default::default()
    };
    let monitor = FollowerMonitor::new(Arc::new(client), limiter.clone(), config);

    let (event_tx, mut event_rx) = mpsc::channel::<MonitorEvent>(64);
    let (cmd_tx, cmd_rx) = mpsc::channel::<WorkerCommand>(8);
    let worker = tokio::spawn(monitor.run(cmd_rx, event_tx));

    println!(
        "{} Watching followers of @{} every {} (Ctrl+C to stop)",
        style("→").cyan(),
        style(&session.handle).bold(),
        helpers::format_duration(Duration::from_secs(interval.max(1)))
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    MonitorEvent::Initialized { known } => {
                        println!(
                            "{} Baseline captured: {} existing followers",
                            style("✓").green(),
                            known
                        );
                    }
                    MonitorEvent::NewFollowers { count } => {
                        println!(
                            "{} {} new follower{}",
                            style("→").cyan(),
                            count,
                            if count == 1 { "" } else { "s" }
                        );
                    }
                    MonitorEvent::FollowResult { handle, success } => {
                        if success {
                            println!("  {} Followed back @{}", style("✓").green(), handle);
                        } else {
                            println!(
                                "  {} Could not follow back @{}",
                                style("✗").red(),
                                handle
                            );
                        }
                    }
                    MonitorEvent::CycleError { error } => {
                        println!("  {} Follower check failed: {}", style("!").yellow(), error);
                    }
                    MonitorEvent::Paused => println!("{} Paused", style("!").yellow()),
                    MonitorEvent::Resumed => println!("{} Resumed", style("→").cyan()),
                }
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                println!("\n{} Stopping...", style("!").yellow());
                let _ = cmd_tx.send(WorkerCommand::Stop).await;
            }
        }
    }

    let outcome = worker.await?;

    // Quota spent during the run must survive even a failed exit
    if let Err(e) = save_quota_state(&limiter, &db_path).await {
        tracing::warn!("Failed to save quota state: {}", e);
    }
    outcome?;

    println!("{} Monitor stopped", style("✓").green());
    Ok(())
}
