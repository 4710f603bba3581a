//! Stored settings management.

use console::style;

use crate::config::Settings;
use crate::store::SettingsStore;

pub(super) fn cmd_show(settings: &Settings) -> anyhow::Result<()> {
    let store = SettingsStore::open(&settings.database_path())?;

    println!("\n{}", style("Stored Settings").bold());
    println!("{}", "-".repeat(40));
    println!("{:<12} {}", "Data dir:", settings.data_dir.display());
    println!("{:<12} {}", "Service:", settings.service_url);

    println!(
        "{:<12} {}",
        "Username:",
        store.username()?.unwrap_or_else(|| "(not set)".to_string())
    );
    println!(
        "{:<12} {}",
        "Password:",
        if store.password()?.is_some() {
            "********"
        } else {
            "(not set)"
        }
    );
    println!("{:<12} {}", "Remember:", store.remember()?);

    match store.targets()? {
        Some(raw) => {
            let count = raw.lines().filter(|l| !l.trim().is_empty()).count();
            println!("{:<12} {} handles saved", "Targets:", count);
        }
        None => println!("{:<12} (not set)", "Targets:"),
    }

    Ok(())
}

pub(super) fn cmd_set(settings: &Settings, key: &str, value: &str) -> anyhow::Result<()> {
    let store = SettingsStore::open(&settings.database_path())?;

    match key {
        "username" => store.set_username(value)?,
        "password" => store.set_password(value)?,
        "targets" => store.set_targets(value)?,
        "remember" => {
            let remember = match value {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                other => anyhow::bail!("expected true or false, got '{}'", other),
            };
            store.set_remember(remember)?;
        }
        other => anyhow::bail!(
            "unknown key '{}'; valid keys: username, password, targets, remember",
            other
        ),
    }

    println!("{} Set {}", style("✓").green(), key);
    Ok(())
}

pub(super) fn cmd_clear(settings: &Settings) -> anyhow::Result<()> {
    let store = SettingsStore::open(&settings.database_path())?;
    store.clear()?;
    println!("{} Cleared all stored settings", style("✓").green());
    Ok(())
}
