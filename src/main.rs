//! skyfollow - rate-limit-aware follow automation for Bluesky.
//!
//! Follows a supplied list of handles in bulk, or monitors the
//! authenticated account's followers and follows back new ones,
//! pacing every outbound request against the service quotas.

mod cli;
mod client;
mod config;
mod models;
mod rate_limit;
mod services;
mod store;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    // Targets live under the bin crate name, not the package name
    let default_filter = if cli::is_verbose() {
        "skyf=info"
    } else {
        "skyf=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Run CLI
    cli::run().await
}
