// SqliteDatabase — rusqlite backend implementing the Database trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Send.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// The lock is never held across .await points — Rust enforces this because
// MutexGuard is !Send.
//
// The free functions in queries.rs remain unchanged so unit tests can run
// against a Connection directly.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{
    ConfounderEvent, Creator, Fan, PostSnapshot, ReferralLink, RevenueEvent, SocialPost,
    StoreStats,
};
use super::traits::Database;

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open an in-memory database with the full schema. Used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        super::schema::create_tables(&conn)?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn store_stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().await;
        super::queries::store_stats(&conn)
    }

    async fn upsert_creator(&self, creator: &Creator) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::upsert_creator(&conn, creator)
    }

    async fn get_creator(&self, id: &str) -> Result<Option<Creator>> {
        let conn = self.conn.lock().await;
        super::queries::get_creator(&conn, id)
    }

    async fn list_creators(&self) -> Result<Vec<Creator>> {
        let conn = self.conn.lock().await;
        super::queries::list_creators(&conn)
    }

    async fn upsert_post(&self, post: &SocialPost) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::upsert_post(&conn, post)
    }

    async fn get_post(&self, id: &str) -> Result<Option<SocialPost>> {
        let conn = self.conn.lock().await;
        super::queries::get_post(&conn, id)
    }

    async fn list_posts(&self, creator_id: &str) -> Result<Vec<SocialPost>> {
        let conn = self.conn.lock().await;
        super::queries::list_posts(&conn, creator_id)
    }

    async fn count_posts_by_category_between(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<(Option<String>, i64)>> {
        let conn = self.conn.lock().await;
        super::queries::count_posts_by_category_between(&conn, creator_id, t0, t1)
    }

    async fn update_post_counters(&self, snap: &PostSnapshot) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::update_post_counters(&conn, snap)
    }

    async fn insert_snapshot(&self, snap: &PostSnapshot) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::insert_snapshot(&conn, snap)
    }

    async fn snapshot_at(
        &self,
        post_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PostSnapshot>> {
        let conn = self.conn.lock().await;
        super::queries::snapshot_at(&conn, post_id, at)
    }

    async fn latest_snapshot_at_or_before(
        &self,
        post_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PostSnapshot>> {
        let conn = self.conn.lock().await;
        super::queries::latest_snapshot_at_or_before(&conn, post_id, at)
    }

    async fn snapshot_count(&self, post_id: &str) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::snapshot_count(&conn, post_id)
    }

    async fn insert_fan(&self, fan: &Fan) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::insert_fan(&conn, fan)
    }

    async fn get_fan(&self, id: &str) -> Result<Option<Fan>> {
        let conn = self.conn.lock().await;
        super::queries::get_fan(&conn, id)
    }

    async fn list_unattributed_fans(&self, creator_id: &str) -> Result<Vec<Fan>> {
        let conn = self.conn.lock().await;
        super::queries::list_unattributed_fans(&conn, creator_id)
    }

    async fn update_fan_attribution(
        &self,
        fan_id: &str,
        category: &str,
        method: &str,
        confidence: f64,
        weights: &BTreeMap<String, f64>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::update_fan_attribution(&conn, fan_id, category, method, confidence, weights)
    }

    async fn count_fans_between(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::count_fans_between(&conn, creator_id, t0, t1)
    }

    async fn fans_per_day(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.lock().await;
        super::queries::fans_per_day(&conn, creator_id, t0, t1)
    }

    async fn count_fans_by_category_between(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.lock().await;
        super::queries::count_fans_by_category_between(&conn, creator_id, t0, t1)
    }

    async fn insert_revenue_event(&self, event: &RevenueEvent) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::insert_revenue_event(&conn, event)
    }

    async fn revenue_between(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<f64> {
        let conn = self.conn.lock().await;
        super::queries::revenue_between(&conn, creator_id, t0, t1)
    }

    async fn revenue_per_day(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<(String, f64)>> {
        let conn = self.conn.lock().await;
        super::queries::revenue_per_day(&conn, creator_id, t0, t1)
    }

    async fn insert_confounder(&self, event: &ConfounderEvent) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::insert_confounder(&conn, event)
    }

    async fn confounders_overlapping(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<ConfounderEvent>> {
        let conn = self.conn.lock().await;
        super::queries::confounders_overlapping(&conn, creator_id, t0, t1)
    }

    async fn list_confounders(&self, creator_id: &str) -> Result<Vec<ConfounderEvent>> {
        let conn = self.conn.lock().await;
        super::queries::list_confounders(&conn, creator_id)
    }

    async fn insert_referral_link(&self, link: &ReferralLink) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::insert_referral_link(&conn, link)
    }

    async fn get_referral_link(&self, id: &str) -> Result<Option<ReferralLink>> {
        let conn = self.conn.lock().await;
        super::queries::get_referral_link(&conn, id)
    }
}
