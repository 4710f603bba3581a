//! Quota and statistics display.

use chrono::Utc;
use console::style;
use serde_json::json;

use crate::cli::helpers;
use crate::config::Settings;
use crate::rate_limit::{load_quota_state, LimitKind, RateLimiter};
use crate::store::SettingsStore;

pub(super) async fn cmd_status(settings: &Settings, as_json: bool) -> anyhow::Result<()> {
    let db_path = settings.database_path();

    let limiter = RateLimiter::new();
    if let Err(e) = load_quota_state(&limiter, &db_path).await {
        tracing::warn!("Failed to load quota state: {}", e);
    }
    let snapshot = limiter.snapshot().await;

    let store = SettingsStore::open(&db_path)?;
    let stats = store.load_stats()?;

    if as_json {
        let windows: Vec<_> = snapshot
            .iter()
            .map(|w| {
                json!({
                    "window": w.kind.as_str(),
                    "consumed": w.consumed,
                    "limit": w.limit,
                    "reset_at": w.reset_at.to_rfc3339(),
                })
            })
            .collect();
        let output = json!({
            "quota": windows,
            "last_run": stats,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("\n{}", style("Quota Status").bold());
    println!("{}", "-".repeat(50));

    let now = Utc::now();
    for window in &snapshot {
        let unit = match window.kind {
            LimitKind::Api => "requests",
            _ => "points",
        };
        let reset_in = (window.reset_at - now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        println!(
            "{:<8} {:>6}/{:<6} {:<9} resets in {}",
            window.kind,
            window.consumed,
            window.limit,
            unit,
            helpers::format_duration(reset_in)
        );
    }

    match stats {
        Some(stats) => {
            println!();
            println!(
                "{:<12} {}/{} followed ({}% of attempts), {} rate limited",
                "Last run:",
                stats.successful,
                stats.total,
                stats.success_rate(),
                stats.rate_limited
            );
        }
        None => {
            println!();
            println!("{} No runs recorded yet", style("!").yellow());
        }
    }

    Ok(())
}
