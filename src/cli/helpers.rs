//! Shared helpers for CLI commands.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use crate::store::SettingsStore;

/// Resolve login credentials from flags, falling back to the store.
pub(super) fn resolve_credentials(
    store: &SettingsStore,
    identifier: Option<String>,
    password: Option<String>,
) -> anyhow::Result<(String, String)> {
    let identifier = match identifier {
        Some(id) => id,
        None => store.username()?.ok_or_else(|| {
            anyhow::anyhow!(
                "no identifier given; pass --identifier, set SKYF_IDENTIFIER, \
                 or save one with 'skyf config set username <handle>'"
            )
        })?,
    };
    let password = match password {
        Some(pw) => pw,
        None => store.password()?.ok_or_else(|| {
            anyhow::anyhow!(
                "no password given; pass --password, set SKYF_PASSWORD, \
                 or run a follow with --remember first"
            )
        })?,
    };
    Ok((identifier, password))
}

/// Read the raw target list from a file, stdin (`-`), or the store.
pub(super) fn read_target_list(
    path: Option<&Path>,
    store: &SettingsStore,
) -> anyhow::Result<String> {
    match path {
        Some(path) if path.as_os_str() == "-" => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw)?;
            Ok(raw)
        }
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e)),
        None => store.targets()?.ok_or_else(|| {
            anyhow::anyhow!("no target list given and none saved from a previous run")
        }),
    }
}

/// Human-friendly duration like "1h 05m" or "42s".
pub(super) fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
