// Database trait — backend-agnostic async interface for all DB operations.
//
// Implementors: SqliteDatabase (wraps rusqlite), PgDatabase (wraps sqlx).
// All methods are async so both sync (rusqlite via Mutex) and native async
// (sqlx) backends fit behind a single interface.
//
// The trait mirrors the queries.rs function signatures, so the analysis
// modules depend only on `Arc<dyn Database>` and never on a driver.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{
    ConfounderEvent, Creator, Fan, PostSnapshot, ReferralLink, RevenueEvent, SocialPost,
    StoreStats,
};

#[async_trait]
pub trait Database: Send + Sync {
    // --- Lifecycle ---

    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    /// Aggregate row counts for the status display.
    async fn store_stats(&self) -> Result<StoreStats>;

    // --- Creators ---

    async fn upsert_creator(&self, creator: &Creator) -> Result<()>;

    async fn get_creator(&self, id: &str) -> Result<Option<Creator>>;

    async fn list_creators(&self) -> Result<Vec<Creator>>;

    // --- Posts ---

    async fn upsert_post(&self, post: &SocialPost) -> Result<()>;

    async fn get_post(&self, id: &str) -> Result<Option<SocialPost>>;

    /// All posts owned by a creator, oldest first.
    async fn list_posts(&self, creator_id: &str) -> Result<Vec<SocialPost>>;

    /// Posts published in [t0, t1) grouped by raw category label.
    async fn count_posts_by_category_between(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<(Option<String>, i64)>>;

    /// Refresh a post's cumulative counters and last_snapshot_at.
    async fn update_post_counters(&self, snap: &PostSnapshot) -> Result<()>;

    // --- Snapshots (append-only) ---

    async fn insert_snapshot(&self, snap: &PostSnapshot) -> Result<i64>;

    /// The snapshot recorded at exactly `at` for a post, if any.
    async fn snapshot_at(&self, post_id: &str, at: DateTime<Utc>)
        -> Result<Option<PostSnapshot>>;

    /// The latest snapshot with snapshot_at <= `at`, if any.
    async fn latest_snapshot_at_or_before(
        &self,
        post_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PostSnapshot>>;

    async fn snapshot_count(&self, post_id: &str) -> Result<i64>;

    // --- Fans ---

    async fn insert_fan(&self, fan: &Fan) -> Result<()>;

    async fn get_fan(&self, id: &str) -> Result<Option<Fan>>;

    /// Fans with no attributed category yet, oldest acquisition first.
    async fn list_unattributed_fans(&self, creator_id: &str) -> Result<Vec<Fan>>;

    async fn update_fan_attribution(
        &self,
        fan_id: &str,
        category: &str,
        method: &str,
        confidence: f64,
        weights: &BTreeMap<String, f64>,
    ) -> Result<()>;

    /// Fan acquisitions in [t0, t1).
    async fn count_fans_between(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<i64>;

    /// Fan acquisitions per UTC day in [t0, t1); days with activity only.
    async fn fans_per_day(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>>;

    /// Attributed fan counts per primary category in [t0, t1).
    async fn count_fans_by_category_between(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>>;

    // --- Revenue events ---

    async fn insert_revenue_event(&self, event: &RevenueEvent) -> Result<i64>;

    /// Total revenue in [t0, t1).
    async fn revenue_between(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<f64>;

    /// Revenue per UTC day in [t0, t1); days with activity only.
    async fn revenue_per_day(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<(String, f64)>>;

    // --- Confounder events ---

    async fn insert_confounder(&self, event: &ConfounderEvent) -> Result<i64>;

    /// Events overlapping [t0, t1): event_start <= t1 and either no end
    /// (point event) or event_end >= t0.
    async fn confounders_overlapping(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<ConfounderEvent>>;

    async fn list_confounders(&self, creator_id: &str) -> Result<Vec<ConfounderEvent>>;

    // --- Referral links ---

    async fn insert_referral_link(&self, link: &ReferralLink) -> Result<()>;

    async fn get_referral_link(&self, id: &str) -> Result<Option<ReferralLink>>;
}
