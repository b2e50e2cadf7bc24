// Database queries — CRUD operations for all tables.
//
// Every database interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust interfaces.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{
    fmt_ts, parse_ts, ConfounderEvent, Creator, Fan, PostSnapshot, ReferralLink, RevenueEvent,
    SocialPost, StoreStats,
};

// --- Creators ---

pub fn upsert_creator(conn: &Connection, creator: &Creator) -> Result<()> {
    conn.execute(
        "INSERT INTO creators (id, name, optimal_attribution_window_hours, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            name = ?2,
            optimal_attribution_window_hours = ?3,
            status = ?4",
        params![
            creator.id,
            creator.name,
            creator.optimal_attribution_window_hours,
            creator.status,
            fmt_ts(creator.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_creator(conn: &Connection, id: &str) -> Result<Option<Creator>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, optimal_attribution_window_hours, status, created_at
         FROM creators WHERE id = ?1",
    )?;
    let row = stmt
        .query_row(params![id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })
        .optional()?;

    match row {
        Some((id, name, window, status, created_at)) => Ok(Some(Creator {
            id,
            name,
            optimal_attribution_window_hours: window,
            status,
            created_at: parse_ts(&created_at)?,
        })),
        None => Ok(None),
    }
}

pub fn list_creators(conn: &Connection) -> Result<Vec<Creator>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, optimal_attribution_window_hours, status, created_at
         FROM creators ORDER BY name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut creators = Vec::new();
    for row in rows {
        let (id, name, window, status, created_at) = row?;
        creators.push(Creator {
            id,
            name,
            optimal_attribution_window_hours: window,
            status,
            created_at: parse_ts(&created_at)?,
        });
    }
    Ok(creators)
}

// --- Posts ---

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<(SocialPost, String, Option<String>)> {
    Ok((
        SocialPost {
            id: row.get(0)?,
            creator_id: row.get(1)?,
            platform: row.get(2)?,
            platform_post_id: row.get(3)?,
            posted_at: Utc::now(), // replaced by the caller from the raw column
            views_cumulative: row.get(5)?,
            likes_cumulative: row.get(6)?,
            comments_cumulative: row.get(7)?,
            shares_cumulative: row.get(8)?,
            saves_cumulative: row.get(9)?,
            caption: row.get(10)?,
            url: row.get(11)?,
            category: row.get(12)?,
            category_source: row.get(13)?,
            last_snapshot_at: None,
        },
        row.get::<_, String>(4)?,
        row.get::<_, Option<String>>(14)?,
    ))
}

const POST_COLUMNS: &str = "id, creator_id, platform, platform_post_id, posted_at, \
     views_cumulative, likes_cumulative, comments_cumulative, shares_cumulative, \
     saves_cumulative, caption, url, category, category_source, last_snapshot_at";

fn finish_post(raw: (SocialPost, String, Option<String>)) -> Result<SocialPost> {
    let (mut post, posted_at, last_snapshot_at) = raw;
    post.posted_at = parse_ts(&posted_at)?;
    post.last_snapshot_at = match last_snapshot_at {
        Some(ts) => Some(parse_ts(&ts)?),
        None => None,
    };
    Ok(post)
}

pub fn upsert_post(conn: &Connection, post: &SocialPost) -> Result<()> {
    conn.execute(
        "INSERT INTO social_posts (id, creator_id, platform, platform_post_id, posted_at,
            views_cumulative, likes_cumulative, comments_cumulative, shares_cumulative,
            saves_cumulative, caption, url, category, category_source, last_snapshot_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
         ON CONFLICT(id) DO UPDATE SET
            platform = ?3,
            platform_post_id = ?4,
            posted_at = ?5,
            caption = ?11,
            url = ?12,
            category = ?13,
            category_source = ?14",
        params![
            post.id,
            post.creator_id,
            post.platform,
            post.platform_post_id,
            fmt_ts(post.posted_at),
            post.views_cumulative,
            post.likes_cumulative,
            post.comments_cumulative,
            post.shares_cumulative,
            post.saves_cumulative,
            post.caption,
            post.url,
            post.category,
            post.category_source,
            post.last_snapshot_at.map(fmt_ts),
        ],
    )?;
    Ok(())
}

pub fn get_post(conn: &Connection, id: &str) -> Result<Option<SocialPost>> {
    let sql = format!("SELECT {POST_COLUMNS} FROM social_posts WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let raw = stmt.query_row(params![id], post_from_row).optional()?;
    raw.map(finish_post).transpose()
}

pub fn list_posts(conn: &Connection, creator_id: &str) -> Result<Vec<SocialPost>> {
    let sql = format!(
        "SELECT {POST_COLUMNS} FROM social_posts WHERE creator_id = ?1 ORDER BY posted_at"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![creator_id], post_from_row)?;

    let mut posts = Vec::new();
    for row in rows {
        posts.push(finish_post(row?)?);
    }
    Ok(posts)
}

/// Count posts published in [t0, t1), grouped by raw category label.
/// Labels are normalised by the caller against the active taxonomy.
pub fn count_posts_by_category_between(
    conn: &Connection,
    creator_id: &str,
    t0: DateTime<Utc>,
    t1: DateTime<Utc>,
) -> Result<Vec<(Option<String>, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT category, COUNT(*) FROM social_posts
         WHERE creator_id = ?1 AND posted_at >= ?2 AND posted_at < ?3
         GROUP BY category",
    )?;
    let rows = stmt.query_map(params![creator_id, fmt_ts(t0), fmt_ts(t1)], |row| {
        Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = Vec::new();
    for row in rows {
        counts.push(row?);
    }
    Ok(counts)
}

/// Refresh a post's cumulative counters and last_snapshot_at from a snapshot.
pub fn update_post_counters(conn: &Connection, snap: &PostSnapshot) -> Result<()> {
    conn.execute(
        "UPDATE social_posts SET
            views_cumulative = ?2,
            likes_cumulative = ?3,
            comments_cumulative = ?4,
            shares_cumulative = ?5,
            saves_cumulative = ?6,
            last_snapshot_at = ?7
         WHERE id = ?1",
        params![
            snap.post_id,
            snap.views,
            snap.likes,
            snap.comments,
            snap.shares,
            snap.saves,
            fmt_ts(snap.snapshot_at),
        ],
    )?;
    Ok(())
}

// --- Snapshots ---

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<(PostSnapshot, String)> {
    Ok((
        PostSnapshot {
            id: row.get(0)?,
            post_id: row.get(1)?,
            creator_id: row.get(2)?,
            snapshot_at: Utc::now(), // replaced by the caller from the raw column
            views: row.get(4)?,
            likes: row.get(5)?,
            comments: row.get(6)?,
            shares: row.get(7)?,
            saves: row.get(8)?,
            import_ref: row.get(9)?,
        },
        row.get::<_, String>(3)?,
    ))
}

const SNAPSHOT_COLUMNS: &str =
    "id, post_id, creator_id, snapshot_at, views, likes, comments, shares, saves, import_ref";

fn finish_snapshot(raw: (PostSnapshot, String)) -> Result<PostSnapshot> {
    let (mut snap, snapshot_at) = raw;
    snap.snapshot_at = parse_ts(&snapshot_at)?;
    Ok(snap)
}

pub fn insert_snapshot(conn: &Connection, snap: &PostSnapshot) -> Result<i64> {
    conn.execute(
        "INSERT INTO post_snapshots (post_id, creator_id, snapshot_at,
            views, likes, comments, shares, saves, import_ref)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            snap.post_id,
            snap.creator_id,
            fmt_ts(snap.snapshot_at),
            snap.views,
            snap.likes,
            snap.comments,
            snap.shares,
            snap.saves,
            snap.import_ref,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// The snapshot recorded at exactly `at` for a post, if any.
pub fn snapshot_at(
    conn: &Connection,
    post_id: &str,
    at: DateTime<Utc>,
) -> Result<Option<PostSnapshot>> {
    let sql = format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM post_snapshots
         WHERE post_id = ?1 AND snapshot_at = ?2 LIMIT 1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let raw = stmt
        .query_row(params![post_id, fmt_ts(at)], snapshot_from_row)
        .optional()?;
    raw.map(finish_snapshot).transpose()
}

/// The latest snapshot with snapshot_at <= `at` for a post, if any.
pub fn latest_snapshot_at_or_before(
    conn: &Connection,
    post_id: &str,
    at: DateTime<Utc>,
) -> Result<Option<PostSnapshot>> {
    let sql = format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM post_snapshots
         WHERE post_id = ?1 AND snapshot_at <= ?2
         ORDER BY snapshot_at DESC LIMIT 1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let raw = stmt
        .query_row(params![post_id, fmt_ts(at)], snapshot_from_row)
        .optional()?;
    raw.map(finish_snapshot).transpose()
}

pub fn snapshot_count(conn: &Connection, post_id: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM post_snapshots WHERE post_id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// --- Fans ---

fn fan_from_row(row: &Row<'_>) -> rusqlite::Result<(Fan, String, Option<String>)> {
    Ok((
        Fan {
            id: row.get(0)?,
            creator_id: row.get(1)?,
            external_id_hash: row.get(2)?,
            acquired_at: Utc::now(), // replaced by the caller from the raw column
            referral_link_id: row.get(4)?,
            attributed_category: row.get(5)?,
            attribution_method: row.get(6)?,
            attribution_confidence: row.get(7)?,
            attribution_weights: None,
        },
        row.get::<_, String>(3)?,
        row.get::<_, Option<String>>(8)?,
    ))
}

const FAN_COLUMNS: &str = "id, creator_id, external_id_hash, acquired_at, referral_link_id, \
     attributed_category, attribution_method, attribution_confidence, attribution_weights";

fn finish_fan(raw: (Fan, String, Option<String>)) -> Result<Fan> {
    let (mut fan, acquired_at, weights_json) = raw;
    fan.acquired_at = parse_ts(&acquired_at)?;
    fan.attribution_weights = match weights_json {
        Some(json) => Some(serde_json::from_str::<BTreeMap<String, f64>>(&json)?),
        None => None,
    };
    Ok(fan)
}

pub fn insert_fan(conn: &Connection, fan: &Fan) -> Result<()> {
    let weights_json = fan
        .attribution_weights
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO fans (id, creator_id, external_id_hash, acquired_at, referral_link_id,
            attributed_category, attribution_method, attribution_confidence, attribution_weights)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO NOTHING",
        params![
            fan.id,
            fan.creator_id,
            fan.external_id_hash,
            fmt_ts(fan.acquired_at),
            fan.referral_link_id,
            fan.attributed_category,
            fan.attribution_method,
            fan.attribution_confidence,
            weights_json,
        ],
    )?;
    Ok(())
}

pub fn get_fan(conn: &Connection, id: &str) -> Result<Option<Fan>> {
    let sql = format!("SELECT {FAN_COLUMNS} FROM fans WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let raw = stmt.query_row(params![id], fan_from_row).optional()?;
    raw.map(finish_fan).transpose()
}

/// Fans with no attributed category yet, oldest acquisition first.
pub fn list_unattributed_fans(conn: &Connection, creator_id: &str) -> Result<Vec<Fan>> {
    let sql = format!(
        "SELECT {FAN_COLUMNS} FROM fans
         WHERE creator_id = ?1 AND attributed_category IS NULL
         ORDER BY acquired_at"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![creator_id], fan_from_row)?;

    let mut fans = Vec::new();
    for row in rows {
        fans.push(finish_fan(row?)?);
    }
    Ok(fans)
}

pub fn update_fan_attribution(
    conn: &Connection,
    fan_id: &str,
    category: &str,
    method: &str,
    confidence: f64,
    weights: &BTreeMap<String, f64>,
) -> Result<()> {
    let weights_json = serde_json::to_string(weights)?;
    conn.execute(
        "UPDATE fans SET
            attributed_category = ?2,
            attribution_method = ?3,
            attribution_confidence = ?4,
            attribution_weights = ?5
         WHERE id = ?1",
        params![fan_id, category, method, confidence, weights_json],
    )?;
    Ok(())
}

pub fn count_fans_between(
    conn: &Connection,
    creator_id: &str,
    t0: DateTime<Utc>,
    t1: DateTime<Utc>,
) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM fans
         WHERE creator_id = ?1 AND acquired_at >= ?2 AND acquired_at < ?3",
        params![creator_id, fmt_ts(t0), fmt_ts(t1)],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Fan acquisitions per UTC calendar day in [t0, t1).
/// Returns ("YYYY-MM-DD", count) pairs for days with at least one fan.
pub fn fans_per_day(
    conn: &Connection,
    creator_id: &str,
    t0: DateTime<Utc>,
    t1: DateTime<Utc>,
) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT substr(acquired_at, 1, 10) AS day, COUNT(*)
         FROM fans
         WHERE creator_id = ?1 AND acquired_at >= ?2 AND acquired_at < ?3
         GROUP BY day ORDER BY day",
    )?;
    let rows = stmt.query_map(params![creator_id, fmt_ts(t0), fmt_ts(t1)], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut days = Vec::new();
    for row in rows {
        days.push(row?);
    }
    Ok(days)
}

/// Attributed fan counts per primary category in [t0, t1).
pub fn count_fans_by_category_between(
    conn: &Connection,
    creator_id: &str,
    t0: DateTime<Utc>,
    t1: DateTime<Utc>,
) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT attributed_category, COUNT(*) FROM fans
         WHERE creator_id = ?1 AND acquired_at >= ?2 AND acquired_at < ?3
           AND attributed_category IS NOT NULL
         GROUP BY attributed_category",
    )?;
    let rows = stmt.query_map(params![creator_id, fmt_ts(t0), fmt_ts(t1)], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = Vec::new();
    for row in rows {
        counts.push(row?);
    }
    Ok(counts)
}

// --- Revenue events ---

pub fn insert_revenue_event(conn: &Connection, event: &RevenueEvent) -> Result<i64> {
    conn.execute(
        "INSERT INTO revenue_events (fan_id, creator_id, event_type, amount, currency, event_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.fan_id,
            event.creator_id,
            event.event_type,
            event.amount,
            event.currency,
            fmt_ts(event.event_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn revenue_between(
    conn: &Connection,
    creator_id: &str,
    t0: DateTime<Utc>,
    t1: DateTime<Utc>,
) -> Result<f64> {
    let total: f64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0.0) FROM revenue_events
         WHERE creator_id = ?1 AND event_at >= ?2 AND event_at < ?3",
        params![creator_id, fmt_ts(t0), fmt_ts(t1)],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// Revenue per UTC calendar day in [t0, t1), days with activity only.
pub fn revenue_per_day(
    conn: &Connection,
    creator_id: &str,
    t0: DateTime<Utc>,
    t1: DateTime<Utc>,
) -> Result<Vec<(String, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT substr(event_at, 1, 10) AS day, SUM(amount)
         FROM revenue_events
         WHERE creator_id = ?1 AND event_at >= ?2 AND event_at < ?3
         GROUP BY day ORDER BY day",
    )?;
    let rows = stmt.query_map(params![creator_id, fmt_ts(t0), fmt_ts(t1)], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
    })?;

    let mut days = Vec::new();
    for row in rows {
        days.push(row?);
    }
    Ok(days)
}

// --- Confounder events ---

fn confounder_from_row(row: &Row<'_>) -> rusqlite::Result<(ConfounderEvent, String, Option<String>)> {
    Ok((
        ConfounderEvent {
            id: row.get(0)?,
            creator_id: row.get(1)?,
            event_type: row.get(2)?,
            event_start: Utc::now(), // replaced by the caller from the raw column
            event_end: None,
            description: row.get(5)?,
            estimated_impact: row.get(6)?,
        },
        row.get::<_, String>(3)?,
        row.get::<_, Option<String>>(4)?,
    ))
}

fn finish_confounder(raw: (ConfounderEvent, String, Option<String>)) -> Result<ConfounderEvent> {
    let (mut event, start, end) = raw;
    event.event_start = parse_ts(&start)?;
    event.event_end = match end {
        Some(ts) => Some(parse_ts(&ts)?),
        None => None,
    };
    Ok(event)
}

pub fn insert_confounder(conn: &Connection, event: &ConfounderEvent) -> Result<i64> {
    conn.execute(
        "INSERT INTO confounder_events
            (creator_id, event_type, event_start, event_end, description, estimated_impact)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.creator_id,
            event.event_type,
            fmt_ts(event.event_start),
            event.event_end.map(fmt_ts),
            event.description,
            event.estimated_impact,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Confounder events overlapping [t0, t1): event_start <= t1 and either no
/// end (point event) or event_end >= t0.
pub fn confounders_overlapping(
    conn: &Connection,
    creator_id: &str,
    t0: DateTime<Utc>,
    t1: DateTime<Utc>,
) -> Result<Vec<ConfounderEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, creator_id, event_type, event_start, event_end, description, estimated_impact
         FROM confounder_events
         WHERE creator_id = ?1 AND event_start <= ?3
           AND (event_end IS NULL OR event_end >= ?2)
         ORDER BY event_start",
    )?;
    let rows = stmt.query_map(
        params![creator_id, fmt_ts(t0), fmt_ts(t1)],
        confounder_from_row,
    )?;

    let mut events = Vec::new();
    for row in rows {
        events.push(finish_confounder(row?)?);
    }
    Ok(events)
}

pub fn list_confounders(conn: &Connection, creator_id: &str) -> Result<Vec<ConfounderEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, creator_id, event_type, event_start, event_end, description, estimated_impact
         FROM confounder_events
         WHERE creator_id = ?1
         ORDER BY event_start DESC",
    )?;
    let rows = stmt.query_map(params![creator_id], confounder_from_row)?;

    let mut events = Vec::new();
    for row in rows {
        events.push(finish_confounder(row?)?);
    }
    Ok(events)
}

// --- Referral links ---

pub fn insert_referral_link(conn: &Connection, link: &ReferralLink) -> Result<()> {
    conn.execute(
        "INSERT INTO referral_links (id, creator_id, code, category_hint)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET code = ?3, category_hint = ?4",
        params![link.id, link.creator_id, link.code, link.category_hint],
    )?;
    Ok(())
}

pub fn get_referral_link(conn: &Connection, id: &str) -> Result<Option<ReferralLink>> {
    let mut stmt = conn.prepare(
        "SELECT id, creator_id, code, category_hint FROM referral_links WHERE id = ?1",
    )?;
    let link = stmt
        .query_row(params![id], |row| {
            Ok(ReferralLink {
                id: row.get(0)?,
                creator_id: row.get(1)?,
                code: row.get(2)?,
                category_hint: row.get(3)?,
            })
        })
        .optional()?;
    Ok(link)
}

// --- Status ---

pub fn store_stats(conn: &Connection) -> Result<StoreStats> {
    let creators: i64 = conn.query_row("SELECT COUNT(*) FROM creators", [], |r| r.get(0))?;
    let posts: i64 = conn.query_row("SELECT COUNT(*) FROM social_posts", [], |r| r.get(0))?;
    let snapshots: i64 = conn.query_row("SELECT COUNT(*) FROM post_snapshots", [], |r| r.get(0))?;
    let fans: i64 = conn.query_row("SELECT COUNT(*) FROM fans", [], |r| r.get(0))?;
    let confounders: i64 =
        conn.query_row("SELECT COUNT(*) FROM confounder_events", [], |r| r.get(0))?;
    let last_snapshot: Option<String> = conn.query_row(
        "SELECT MAX(snapshot_at) FROM post_snapshots",
        [],
        |r| r.get(0),
    )?;

    Ok(StoreStats {
        creators,
        posts,
        snapshots,
        fans,
        confounders,
        last_snapshot_at: last_snapshot.map(|ts| parse_ts(&ts)).transpose()?,
    })
}
