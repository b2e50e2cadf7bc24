// Database schema — table creation and migrations.
//
// We use a simple version-based migration approach: a `schema_version` table
// tracks which migrations have run, and each migration is a function that
// executes SQL statements.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables if they don't exist yet.
///
/// This is idempotent — safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Tracks schema version for future migrations
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Creators managed by the agency
        CREATE TABLE IF NOT EXISTS creators (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            optimal_attribution_window_hours INTEGER NOT NULL DEFAULT 48,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Published posts. Counter columns hold the LATEST cumulative values;
        -- per-period activity always comes from post_snapshots deltas.
        CREATE TABLE IF NOT EXISTS social_posts (
            id TEXT PRIMARY KEY,
            creator_id TEXT NOT NULL REFERENCES creators(id),
            platform TEXT NOT NULL,
            platform_post_id TEXT,
            posted_at TEXT NOT NULL,
            views_cumulative INTEGER NOT NULL DEFAULT 0,
            likes_cumulative INTEGER NOT NULL DEFAULT 0,
            comments_cumulative INTEGER NOT NULL DEFAULT 0,
            shares_cumulative INTEGER NOT NULL DEFAULT 0,
            saves_cumulative INTEGER NOT NULL DEFAULT 0,
            caption TEXT,
            url TEXT,
            category TEXT,
            category_source TEXT,
            last_snapshot_at TEXT
        );

        -- Point-in-time counter observations. Append-only.
        CREATE TABLE IF NOT EXISTS post_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id TEXT NOT NULL REFERENCES social_posts(id),
            creator_id TEXT NOT NULL,
            snapshot_at TEXT NOT NULL,
            views INTEGER NOT NULL DEFAULT 0,
            likes INTEGER NOT NULL DEFAULT 0,
            comments INTEGER NOT NULL DEFAULT 0,
            shares INTEGER NOT NULL DEFAULT 0,
            saves INTEGER NOT NULL DEFAULT 0,
            import_ref TEXT
        );

        -- Subscriber acquisition events. external_id_hash is the HMAC of the
        -- platform identifier — the raw id is never stored.
        CREATE TABLE IF NOT EXISTS fans (
            id TEXT PRIMARY KEY,
            creator_id TEXT NOT NULL REFERENCES creators(id),
            external_id_hash TEXT,
            acquired_at TEXT NOT NULL,
            referral_link_id TEXT,
            attributed_category TEXT,
            attribution_method TEXT,
            attribution_confidence REAL,
            attribution_weights TEXT              -- JSON: {category: share}
        );

        -- Monetisation events. creator_id is denormalised from the fan so
        -- window revenue sums need no join.
        CREATE TABLE IF NOT EXISTS revenue_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fan_id TEXT NOT NULL REFERENCES fans(id),
            creator_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            amount REAL NOT NULL,
            currency TEXT NOT NULL DEFAULT 'USD',
            event_at TEXT NOT NULL
        );

        -- User-declared external events that bias attribution
        CREATE TABLE IF NOT EXISTS confounder_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            creator_id TEXT NOT NULL REFERENCES creators(id),
            event_type TEXT NOT NULL,
            event_start TEXT NOT NULL,
            event_end TEXT,                       -- NULL means point event
            description TEXT,
            estimated_impact TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Tracking links; a category hint makes attribution deterministic
        CREATE TABLE IF NOT EXISTS referral_links (
            id TEXT PRIMARY KEY,
            creator_id TEXT NOT NULL REFERENCES creators(id),
            code TEXT NOT NULL,
            category_hint TEXT
        );

        -- Delta queries scan a post's snapshots ordered by time
        CREATE INDEX IF NOT EXISTS idx_snapshots_post_time
            ON post_snapshots(post_id, snapshot_at);

        CREATE INDEX IF NOT EXISTS idx_snapshots_creator
            ON post_snapshots(creator_id);

        CREATE INDEX IF NOT EXISTS idx_posts_creator
            ON social_posts(creator_id);

        CREATE INDEX IF NOT EXISTS idx_fans_creator_acquired
            ON fans(creator_id, acquired_at);

        CREATE INDEX IF NOT EXISTS idx_revenue_creator_time
            ON revenue_events(creator_id, event_at);

        CREATE INDEX IF NOT EXISTS idx_confounders_creator_time
            ON confounder_events(creator_id, event_start);
        ",
    )
    .context("Failed to create database tables")?;

    // Record initial schema version if not already set
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    Ok(())
}

/// Run a migration if it hasn't been applied yet.
/// The migration function receives the connection and should execute its SQL.
#[allow(dead_code)]
fn run_migration<F>(conn: &Connection, version: i64, migrate: F) -> Result<()>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM schema_version WHERE version = ?1",
        [version],
        |row| row.get(0),
    )?;

    if !already_applied {
        migrate(conn).with_context(|| format!("Migration v{version} failed"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
