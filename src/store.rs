//! Local settings store.
//!
//! Key/value persistence for credentials, the last target list, and
//! follow statistics, kept in the same database file as the quota
//! state. Reads and writes happen at command start/end, never inside
//! worker loops, so the synchronous connection is fine.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::models::FollowStats;
use crate::rate_limit::open_db;

const KEY_USERNAME: &str = "username";
const KEY_PASSWORD: &str = "password";
const KEY_TARGETS: &str = "targets";
const KEY_REMEMBER: &str = "remember";
const KEY_FOLLOW_STATS: &str = "follow_stats";

/// Persistent key/value settings backed by the local database.
pub struct SettingsStore {
    conn: Connection,
}

impl SettingsStore {
    /// Open (creating if needed) the settings store at `db_path`.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        let conn = open_db(db_path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        )?;
        Ok(Self { conn })
    }

    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM settings WHERE key = ?", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.conn.execute(
            r#"INSERT OR REPLACE INTO settings (key, value, updated_at)
               VALUES (?, ?, CURRENT_TIMESTAMP)"#,
            params![key, value],
        )?;
        debug!("setting {} updated", key);
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?", [key])?;
        Ok(())
    }

    pub fn username(&self) -> anyhow::Result<Option<String>> {
        self.get(KEY_USERNAME)
    }

    pub fn set_username(&self, username: &str) -> anyhow::Result<()> {
        self.set(KEY_USERNAME, username)
    }

    pub fn password(&self) -> anyhow::Result<Option<String>> {
        self.get(KEY_PASSWORD)
    }

    pub fn set_password(&self, password: &str) -> anyhow::Result<()> {
        self.set(KEY_PASSWORD, password)
    }

    pub fn clear_password(&self) -> anyhow::Result<()> {
        self.delete(KEY_PASSWORD)
    }

    pub fn remember(&self) -> anyhow::Result<bool> {
        Ok(self.get(KEY_REMEMBER)?.as_deref() == Some("true"))
    }

    pub fn set_remember(&self, remember: bool) -> anyhow::Result<()> {
        self.set(KEY_REMEMBER, if remember { "true" } else { "false" })
    }

    /// The last target list, one handle per line.
    pub fn targets(&self) -> anyhow::Result<Option<String>> {
        self.get(KEY_TARGETS)
    }

    pub fn set_targets(&self, targets: &str) -> anyhow::Result<()> {
        self.set(KEY_TARGETS, targets)
    }

    pub fn load_stats(&self) -> anyhow::Result<Option<FollowStats>> {
        match self.get(KEY_FOLLOW_STATS)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn save_stats(&self, stats: &FollowStats) -> anyhow::Result<()> {
        self.set(KEY_FOLLOW_STATS, &serde_json::to_string(stats)?)
    }

    /// Remove all stored settings.
    pub fn clear(&self) -> anyhow::Result<()> {
        self.conn.execute("DELETE FROM settings", [])?;
        Ok(())
    }

    /// All stored keys, for display.
    pub fn keys(&self) -> anyhow::Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM settings ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}
