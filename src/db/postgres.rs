// PgDatabase — PostgreSQL backend implementing the Database trait.
//
// Uses sqlx PgPool for native async queries. All queries use runtime
// parameter binding (not compile-time macros) to avoid requiring
// DATABASE_URL at compile time.
//
// Timestamps are stored as TEXT in the same format the SQLite backend
// uses, so range predicates and substr-based day grouping behave
// identically across backends.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx_core::pool::Pool;
use sqlx_core::row::Row;
use sqlx_postgres::{PgRow, Postgres};

use super::models::{
    fmt_ts, parse_ts, ConfounderEvent, Creator, Fan, PostSnapshot, ReferralLink, RevenueEvent,
    SocialPost, StoreStats,
};
use super::traits::Database;

/// Type alias for the PostgreSQL connection pool.
pub type PgPool = Pool<Postgres>;

pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Connect to PostgreSQL and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .with_context(|| format!("Failed to connect to PostgreSQL at {database_url}"))?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all pending migrations.
    ///
    /// Acquires a Postgres session-level advisory lock so concurrent
    /// processes starting together don't race to apply the same migration.
    /// Session-level advisory locks are bound to the backend session that
    /// acquired them, so lock and unlock run on one dedicated connection
    /// held for the whole migration loop. The unlock always runs; a
    /// migration error is surfaced after it.
    async fn run_migrations(&self) -> Result<()> {
        // 0x505249534D = ASCII "PRISM" as a big-endian i64, namespacing the
        // advisory lock to this application.
        const MIGRATION_LOCK_KEY: i64 = 0x50_52_49_53_4D;

        let mut lock_conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection for migration advisory lock")?;

        sqlx_core::query::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to acquire migration advisory lock")?;

        let migration_result: Result<()> = async {
            sqlx_core::query::query(
                "CREATE TABLE IF NOT EXISTS schema_version (
                    version INTEGER PRIMARY KEY,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
            )
            .execute(&self.pool)
            .await?;

            let migrations = [(
                1,
                include_str!("../../migrations/postgres/0001_initial.sql"),
            )];

            for (version, sql) in migrations {
                let applied: bool = sqlx_core::query::query(
                    "SELECT COUNT(*) > 0 FROM schema_version WHERE version = $1",
                )
                .bind(version)
                .fetch_one(&self.pool)
                .await
                .map(|row| row.get::<bool, _>(0))
                .unwrap_or(false);

                if !applied {
                    // Schema change and version insert commit together
                    let mut tx = self.pool.begin().await?;
                    sqlx_core::raw_sql::raw_sql(sql).execute(&mut *tx).await?;
                    sqlx_core::query::query(
                        "INSERT INTO schema_version (version) VALUES ($1)",
                    )
                    .bind(version)
                    .execute(&mut *tx)
                    .await?;
                    tx.commit().await?;
                }
            }

            Ok(())
        }
        .await;

        let unlock_result = sqlx_core::query::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to release migration advisory lock");

        migration_result?;
        unlock_result?;

        Ok(())
    }
}

fn creator_from_row(row: &PgRow) -> Result<Creator> {
    Ok(Creator {
        id: row.get(0),
        name: row.get(1),
        optimal_attribution_window_hours: row.get(2),
        status: row.get(3),
        created_at: parse_ts(&row.get::<String, _>(4))?,
    })
}

fn post_from_row(row: &PgRow) -> Result<SocialPost> {
    let last_snapshot_at: Option<String> = row.get(14);
    Ok(SocialPost {
        id: row.get(0),
        creator_id: row.get(1),
        platform: row.get(2),
        platform_post_id: row.get(3),
        posted_at: parse_ts(&row.get::<String, _>(4))?,
        views_cumulative: row.get(5),
        likes_cumulative: row.get(6),
        comments_cumulative: row.get(7),
        shares_cumulative: row.get(8),
        saves_cumulative: row.get(9),
        caption: row.get(10),
        url: row.get(11),
        category: row.get(12),
        category_source: row.get(13),
        last_snapshot_at: last_snapshot_at.map(|ts| parse_ts(&ts)).transpose()?,
    })
}

const POST_COLUMNS: &str = "id, creator_id, platform, platform_post_id, posted_at, \
     views_cumulative, likes_cumulative, comments_cumulative, shares_cumulative, \
     saves_cumulative, caption, url, category, category_source, last_snapshot_at";

fn snapshot_from_row(row: &PgRow) -> Result<PostSnapshot> {
    Ok(PostSnapshot {
        id: row.get(0),
        post_id: row.get(1),
        creator_id: row.get(2),
        snapshot_at: parse_ts(&row.get::<String, _>(3))?,
        views: row.get(4),
        likes: row.get(5),
        comments: row.get(6),
        shares: row.get(7),
        saves: row.get(8),
        import_ref: row.get(9),
    })
}

const SNAPSHOT_COLUMNS: &str =
    "id, post_id, creator_id, snapshot_at, views, likes, comments, shares, saves, import_ref";

fn fan_from_row(row: &PgRow) -> Result<Fan> {
    let weights_json: Option<String> = row.get(8);
    Ok(Fan {
        id: row.get(0),
        creator_id: row.get(1),
        external_id_hash: row.get(2),
        acquired_at: parse_ts(&row.get::<String, _>(3))?,
        referral_link_id: row.get(4),
        attributed_category: row.get(5),
        attribution_method: row.get(6),
        attribution_confidence: row.get(7),
        attribution_weights: weights_json
            .map(|json| serde_json::from_str::<BTreeMap<String, f64>>(&json))
            .transpose()?,
    })
}

const FAN_COLUMNS: &str = "id, creator_id, external_id_hash, acquired_at, referral_link_id, \
     attributed_category, attribution_method, attribution_confidence, attribution_weights";

fn confounder_from_row(row: &PgRow) -> Result<ConfounderEvent> {
    let event_end: Option<String> = row.get(4);
    Ok(ConfounderEvent {
        id: row.get(0),
        creator_id: row.get(1),
        event_type: row.get(2),
        event_start: parse_ts(&row.get::<String, _>(3))?,
        event_end: event_end.map(|ts| parse_ts(&ts)).transpose()?,
        description: row.get(5),
        estimated_impact: row.get(6),
    })
}

#[async_trait]
impl Database for PgDatabase {
    async fn table_count(&self) -> Result<i64> {
        let row = sqlx_core::query::query(
            "SELECT COUNT(*)::bigint FROM information_schema.tables
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn store_stats(&self) -> Result<StoreStats> {
        let row = sqlx_core::query::query(
            "SELECT (SELECT COUNT(*) FROM creators),
                    (SELECT COUNT(*) FROM social_posts),
                    (SELECT COUNT(*) FROM post_snapshots),
                    (SELECT COUNT(*) FROM fans),
                    (SELECT COUNT(*) FROM confounder_events),
                    (SELECT MAX(snapshot_at) FROM post_snapshots)",
        )
        .fetch_one(&self.pool)
        .await?;

        let last_snapshot: Option<String> = row.get(5);
        Ok(StoreStats {
            creators: row.get(0),
            posts: row.get(1),
            snapshots: row.get(2),
            fans: row.get(3),
            confounders: row.get(4),
            last_snapshot_at: last_snapshot.map(|ts| parse_ts(&ts)).transpose()?,
        })
    }

    async fn upsert_creator(&self, creator: &Creator) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO creators (id, name, optimal_attribution_window_hours, status, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT(id) DO UPDATE SET
                name = $2,
                optimal_attribution_window_hours = $3,
                status = $4",
        )
        .bind(&creator.id)
        .bind(&creator.name)
        .bind(creator.optimal_attribution_window_hours)
        .bind(&creator.status)
        .bind(fmt_ts(creator.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_creator(&self, id: &str) -> Result<Option<Creator>> {
        let row = sqlx_core::query::query(
            "SELECT id, name, optimal_attribution_window_hours, status, created_at
             FROM creators WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(creator_from_row).transpose()
    }

    async fn list_creators(&self) -> Result<Vec<Creator>> {
        let rows = sqlx_core::query::query(
            "SELECT id, name, optimal_attribution_window_hours, status, created_at
             FROM creators ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(creator_from_row).collect()
    }

    async fn upsert_post(&self, post: &SocialPost) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO social_posts (id, creator_id, platform, platform_post_id, posted_at,
                views_cumulative, likes_cumulative, comments_cumulative, shares_cumulative,
                saves_cumulative, caption, url, category, category_source, last_snapshot_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             ON CONFLICT(id) DO UPDATE SET
                platform = $3,
                platform_post_id = $4,
                posted_at = $5,
                caption = $11,
                url = $12,
                category = $13,
                category_source = $14",
        )
        .bind(&post.id)
        .bind(&post.creator_id)
        .bind(&post.platform)
        .bind(&post.platform_post_id)
        .bind(fmt_ts(post.posted_at))
        .bind(post.views_cumulative)
        .bind(post.likes_cumulative)
        .bind(post.comments_cumulative)
        .bind(post.shares_cumulative)
        .bind(post.saves_cumulative)
        .bind(&post.caption)
        .bind(&post.url)
        .bind(&post.category)
        .bind(&post.category_source)
        .bind(post.last_snapshot_at.map(fmt_ts))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_post(&self, id: &str) -> Result<Option<SocialPost>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM social_posts WHERE id = $1");
        let row = sqlx_core::query::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn list_posts(&self, creator_id: &str) -> Result<Vec<SocialPost>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM social_posts WHERE creator_id = $1 ORDER BY posted_at"
        );
        let rows = sqlx_core::query::query(&sql)
            .bind(creator_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(post_from_row).collect()
    }

    async fn count_posts_by_category_between(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<(Option<String>, i64)>> {
        let rows = sqlx_core::query::query(
            "SELECT category, COUNT(*)::bigint FROM social_posts
             WHERE creator_id = $1 AND posted_at >= $2 AND posted_at < $3
             GROUP BY category",
        )
        .bind(creator_id)
        .bind(fmt_ts(t0))
        .bind(fmt_ts(t1))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<Option<String>, _>(0), row.get::<i64, _>(1)))
            .collect())
    }

    async fn update_post_counters(&self, snap: &PostSnapshot) -> Result<()> {
        sqlx_core::query::query(
            "UPDATE social_posts SET
                views_cumulative = $2,
                likes_cumulative = $3,
                comments_cumulative = $4,
                shares_cumulative = $5,
                saves_cumulative = $6,
                last_snapshot_at = $7
             WHERE id = $1",
        )
        .bind(&snap.post_id)
        .bind(snap.views)
        .bind(snap.likes)
        .bind(snap.comments)
        .bind(snap.shares)
        .bind(snap.saves)
        .bind(fmt_ts(snap.snapshot_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_snapshot(&self, snap: &PostSnapshot) -> Result<i64> {
        let row = sqlx_core::query::query(
            "INSERT INTO post_snapshots (post_id, creator_id, snapshot_at,
                views, likes, comments, shares, saves, import_ref)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING id",
        )
        .bind(&snap.post_id)
        .bind(&snap.creator_id)
        .bind(fmt_ts(snap.snapshot_at))
        .bind(snap.views)
        .bind(snap.likes)
        .bind(snap.comments)
        .bind(snap.shares)
        .bind(snap.saves)
        .bind(&snap.import_ref)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn snapshot_at(
        &self,
        post_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PostSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM post_snapshots
             WHERE post_id = $1 AND snapshot_at = $2 LIMIT 1"
        );
        let row = sqlx_core::query::query(&sql)
            .bind(post_id)
            .bind(fmt_ts(at))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn latest_snapshot_at_or_before(
        &self,
        post_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PostSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM post_snapshots
             WHERE post_id = $1 AND snapshot_at <= $2
             ORDER BY snapshot_at DESC LIMIT 1"
        );
        let row = sqlx_core::query::query(&sql)
            .bind(post_id)
            .bind(fmt_ts(at))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn snapshot_count(&self, post_id: &str) -> Result<i64> {
        let row = sqlx_core::query::query(
            "SELECT COUNT(*)::bigint FROM post_snapshots WHERE post_id = $1",
        )
        .bind(post_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn insert_fan(&self, fan: &Fan) -> Result<()> {
        let weights_json = fan
            .attribution_weights
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx_core::query::query(
            "INSERT INTO fans (id, creator_id, external_id_hash, acquired_at, referral_link_id,
                attributed_category, attribution_method, attribution_confidence,
                attribution_weights)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&fan.id)
        .bind(&fan.creator_id)
        .bind(&fan.external_id_hash)
        .bind(fmt_ts(fan.acquired_at))
        .bind(&fan.referral_link_id)
        .bind(&fan.attributed_category)
        .bind(&fan.attribution_method)
        .bind(fan.attribution_confidence)
        .bind(weights_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_fan(&self, id: &str) -> Result<Option<Fan>> {
        let sql = format!("SELECT {FAN_COLUMNS} FROM fans WHERE id = $1");
        let row = sqlx_core::query::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(fan_from_row).transpose()
    }

    async fn list_unattributed_fans(&self, creator_id: &str) -> Result<Vec<Fan>> {
        let sql = format!(
            "SELECT {FAN_COLUMNS} FROM fans
             WHERE creator_id = $1 AND attributed_category IS NULL
             ORDER BY acquired_at"
        );
        let rows = sqlx_core::query::query(&sql)
            .bind(creator_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(fan_from_row).collect()
    }

    async fn update_fan_attribution(
        &self,
        fan_id: &str,
        category: &str,
        method: &str,
        confidence: f64,
        weights: &BTreeMap<String, f64>,
    ) -> Result<()> {
        let weights_json = serde_json::to_string(weights)?;
        sqlx_core::query::query(
            "UPDATE fans SET
                attributed_category = $2,
                attribution_method = $3,
                attribution_confidence = $4,
                attribution_weights = $5
             WHERE id = $1",
        )
        .bind(fan_id)
        .bind(category)
        .bind(method)
        .bind(confidence)
        .bind(weights_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_fans_between(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<i64> {
        let row = sqlx_core::query::query(
            "SELECT COUNT(*)::bigint FROM fans
             WHERE creator_id = $1 AND acquired_at >= $2 AND acquired_at < $3",
        )
        .bind(creator_id)
        .bind(fmt_ts(t0))
        .bind(fmt_ts(t1))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn fans_per_day(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>> {
        let rows = sqlx_core::query::query(
            "SELECT substr(acquired_at, 1, 10) AS day, COUNT(*)::bigint
             FROM fans
             WHERE creator_id = $1 AND acquired_at >= $2 AND acquired_at < $3
             GROUP BY day ORDER BY day",
        )
        .bind(creator_id)
        .bind(fmt_ts(t0))
        .bind(fmt_ts(t1))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>(0), row.get::<i64, _>(1)))
            .collect())
    }

    async fn count_fans_by_category_between(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>> {
        let rows = sqlx_core::query::query(
            "SELECT attributed_category, COUNT(*)::bigint FROM fans
             WHERE creator_id = $1 AND acquired_at >= $2 AND acquired_at < $3
               AND attributed_category IS NOT NULL
             GROUP BY attributed_category",
        )
        .bind(creator_id)
        .bind(fmt_ts(t0))
        .bind(fmt_ts(t1))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>(0), row.get::<i64, _>(1)))
            .collect())
    }

    async fn insert_revenue_event(&self, event: &RevenueEvent) -> Result<i64> {
        let row = sqlx_core::query::query(
            "INSERT INTO revenue_events
                (fan_id, creator_id, event_type, amount, currency, event_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(&event.fan_id)
        .bind(&event.creator_id)
        .bind(&event.event_type)
        .bind(event.amount)
        .bind(&event.currency)
        .bind(fmt_ts(event.event_at))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn revenue_between(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<f64> {
        let row = sqlx_core::query::query(
            "SELECT COALESCE(SUM(amount), 0.0) FROM revenue_events
             WHERE creator_id = $1 AND event_at >= $2 AND event_at < $3",
        )
        .bind(creator_id)
        .bind(fmt_ts(t0))
        .bind(fmt_ts(t1))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<f64, _>(0))
    }

    async fn revenue_per_day(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<(String, f64)>> {
        let rows = sqlx_core::query::query(
            "SELECT substr(event_at, 1, 10) AS day, SUM(amount)
             FROM revenue_events
             WHERE creator_id = $1 AND event_at >= $2 AND event_at < $3
             GROUP BY day ORDER BY day",
        )
        .bind(creator_id)
        .bind(fmt_ts(t0))
        .bind(fmt_ts(t1))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>(0), row.get::<f64, _>(1)))
            .collect())
    }

    async fn insert_confounder(&self, event: &ConfounderEvent) -> Result<i64> {
        let row = sqlx_core::query::query(
            "INSERT INTO confounder_events
                (creator_id, event_type, event_start, event_end, description, estimated_impact)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(&event.creator_id)
        .bind(&event.event_type)
        .bind(fmt_ts(event.event_start))
        .bind(event.event_end.map(fmt_ts))
        .bind(&event.description)
        .bind(&event.estimated_impact)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn confounders_overlapping(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<ConfounderEvent>> {
        let rows = sqlx_core::query::query(
            "SELECT id, creator_id, event_type, event_start, event_end, description,
                    estimated_impact
             FROM confounder_events
             WHERE creator_id = $1 AND event_start <= $3
               AND (event_end IS NULL OR event_end >= $2)
             ORDER BY event_start",
        )
        .bind(creator_id)
        .bind(fmt_ts(t0))
        .bind(fmt_ts(t1))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(confounder_from_row).collect()
    }

    async fn list_confounders(&self, creator_id: &str) -> Result<Vec<ConfounderEvent>> {
        let rows = sqlx_core::query::query(
            "SELECT id, creator_id, event_type, event_start, event_end, description,
                    estimated_impact
             FROM confounder_events
             WHERE creator_id = $1
             ORDER BY event_start DESC",
        )
        .bind(creator_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(confounder_from_row).collect()
    }

    async fn insert_referral_link(&self, link: &ReferralLink) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO referral_links (id, creator_id, code, category_hint)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT(id) DO UPDATE SET code = $3, category_hint = $4",
        )
        .bind(&link.id)
        .bind(&link.creator_id)
        .bind(&link.code)
        .bind(&link.category_hint)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_referral_link(&self, id: &str) -> Result<Option<ReferralLink>> {
        let row = sqlx_core::query::query(
            "SELECT id, creator_id, code, category_hint FROM referral_links WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| ReferralLink {
            id: r.get(0),
            creator_id: r.get(1),
            code: r.get(2),
            category_hint: r.get(3),
        }))
    }
}
