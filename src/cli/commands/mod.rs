//! CLI argument definitions and command dispatch.

mod config_cmd;
mod follow;
mod monitor;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "skyf")]
#[command(about = "Rate-limit-aware follow automation for Bluesky")]
#[command(version)]
pub struct Cli {
    /// Config file (default: ./skyfollow.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Follow a list of handles, paced against the service quotas
    Follow {
        /// File with one handle per line ('-' for stdin; omit to reuse
        /// the list saved from the previous run)
        targets_file: Option<PathBuf>,

        /// Account handle or email to log in with
        #[arg(short, long, env = "SKYF_IDENTIFIER")]
        identifier: Option<String>,

        /// App password
        #[arg(short, long, env = "SKYF_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Save credentials and target list for later runs
        #[arg(long)]
        remember: bool,
    },

    /// Watch followers and follow back new ones
    Monitor {
        /// Account handle or email to log in with
        #[arg(short, long, env = "SKYF_IDENTIFIER")]
        identifier: Option<String>,

        /// App password
        #[arg(short, long, env = "SKYF_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Seconds between follower checks
        #[arg(long, default_value = "300")]
        interval: u64,
    },

    /// Show quota usage and last run statistics
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage stored settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show stored settings (password masked)
    Show,
    /// Set a value (username, password, targets, remember)
    Set { key: String, value: String },
    /// Remove all stored settings
    Clear,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }
    settings.ensure_data_dir()?;

    match cli.command {
        Commands::Follow {
            targets_file,
            identifier,
            password,
            remember,
        } => {
            follow::cmd_follow(
                &settings,
                targets_file.as_deref(),
                identifier,
                password,
                remember,
            )
            .await
        }
        Commands::Monitor {
            identifier,
            password,
            interval,
        } => monitor::cmd_monitor(&settings, identifier, password, interval).await,
        Commands::Status { json } => status::cmd_status(&settings, json).await,
        Commands::Config { command } => match command {
            ConfigCommands::Show => config_cmd::cmd_show(&settings),
            ConfigCommands::Set { key, value } => config_cmd::cmd_set(&settings, &key, &value),
            ConfigCommands::Clear => config_cmd::cmd_clear(&settings),
        },
    }
}
