//! Database persistence for quota state.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::{debug, info};

use super::{LimitKind, RateLimiter};

/// Open a database connection with proper concurrency settings.
pub(crate) fn open_db(db_path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 30000;
    "#,
    )?;
    Ok(conn)
}

/// Initialize the quota table in the database.
fn init_quota_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS quota_state (
            window TEXT PRIMARY KEY,
            consumed INTEGER NOT NULL,
            reset_at_ms INTEGER NOT NULL,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
    "#,
    )?;
    Ok(())
}

/// Load persisted quota state into a limiter.
///
/// Returns the number of windows restored. Missing tables or rows are
/// not errors; the limiter keeps its fresh state for those windows.
pub async fn load_quota_state(limiter: &RateLimiter, db_path: &Path) -> anyhow::Result<usize> {
    let conn = open_db(db_path)?;
    init_quota_table(&conn)?;

    let mut stmt = conn.prepare("SELECT window, consumed, reset_at_ms FROM quota_state")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut state = limiter.state.write().await;
    let mut count = 0;

    for row in rows {
        let (window, consumed, reset_at_ms) = row?;
        let Some(reset_at) = DateTime::<Utc>::from_timestamp_millis(reset_at_ms) else {
            continue;
        };
        let consumed = consumed.max(0) as u32;

        let target = match window.as_str() {
            "hourly" => &mut state.hourly,
            "daily" => &mut state.daily,
            "api" => &mut state.requests,
            _ => continue,
        };
        target.consumed = consumed;
        target.reset_at = reset_at;
        count += 1;
    }

    if count > 0 {
        info!("Restored quota state for {} windows from database", count);
    }

    Ok(count)
}

/// Save current quota state to the database.
pub async fn save_quota_state(limiter: &RateLimiter, db_path: &Path) -> anyhow::Result<usize> {
    let conn = open_db(db_path)?;
    init_quota_table(&conn)?;

    let state = limiter.state.read().await;
    let windows = [
        (LimitKind::Hourly, &state.hourly),
        (LimitKind::Daily, &state.daily),
        (LimitKind::Api, &state.requests),
    ];

    let mut count = 0;
    for (kind, window) in windows {
        conn.execute(
            r#"INSERT OR REPLACE INTO quota_state
               (window, consumed, reset_at_ms, updated_at)
               VALUES (?, ?, ?, CURRENT_TIMESTAMP)"#,
            params![
                kind.as_str(),
                i64::from(window.consumed),
                window.reset_at.timestamp_millis(),
            ],
        )?;
        count += 1;
    }

    debug!("Saved quota state for {} windows to database", count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::Operation;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_quota_round_trip() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("state.db");

        let limiter = RateLimiter::new();
        limiter.record(Operation::Follow).await;
        limiter.record(Operation::Follow).await;
        limiter.record(Operation::Read).await;
        save_quota_state(&limiter, &db_path).await.unwrap();

        let restored = RateLimiter::new();
        let count = load_quota_state(&restored, &db_path).await.unwrap();
        assert_eq!(count, 3);

        let snapshot = restored.snapshot().await;
        assert_eq!(snapshot[0].consumed, 6); // hourly points
        assert_eq!(snapshot[1].consumed, 6); // daily points
        assert_eq!(snapshot[2].consumed, 3); // requests
    }

    #[tokio::test]
    async fn test_load_from_empty_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("state.db");

        let limiter = RateLimiter::new();
        let count = load_quota_state(&limiter, &db_path).await.unwrap();
        assert_eq!(count, 0);
        assert!(limiter.check_admission().await.is_granted());
    }
}
