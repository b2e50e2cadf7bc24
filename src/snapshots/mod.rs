// SnapshotStore — point-in-time counter observations and delta queries.
//
// Platform exports report cumulative counters. The only valid measure of
// activity inside a window [t0, t1) is the difference between the latest
// snapshots at or before each endpoint:
//
//     delta = max(0, snap_at_or_before(t1).v - snap_at_or_before(t0).v)
//
// The max(0, ..) clamp absorbs platform recounts: a counter regression is
// treated as no gain for that interval, never as negative lift.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::db::models::PostSnapshot;
use crate::db::Database;
use crate::error::EngineError;
use crate::taxonomy::Taxonomy;

/// One set of cumulative counter values, as observed in an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricSet {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub saves: i64,
}

impl MetricSet {
    fn any_negative(&self) -> bool {
        self.views < 0 || self.likes < 0 || self.comments < 0 || self.shares < 0 || self.saves < 0
    }

    fn matches(&self, snap: &PostSnapshot) -> bool {
        self.views == snap.views
            && self.likes == snap.likes
            && self.comments == snap.comments
            && self.shares == snap.shares
            && self.saves == snap.saves
    }
}

/// Counter gains for one post over a window.
#[derive(Debug, Clone, Serialize)]
pub struct PostDelta {
    pub views_delta: i64,
    pub likes_delta: i64,
    pub comments_delta: i64,
    pub shares_delta: i64,
    pub saves_delta: i64,
    pub posted_at: DateTime<Utc>,
    /// Normalised category label.
    pub category: String,
}

/// Counter gains aggregated over all of a category's posts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryDelta {
    pub views_delta: i64,
    pub likes_delta: i64,
    pub comments_delta: i64,
    pub shares_delta: i64,
    pub saves_delta: i64,
    /// Posts whose views_delta was positive in the window.
    pub posts_with_views: u32,
    /// Ids of those posts.
    pub post_ids: Vec<String>,
}

/// Persists snapshots and answers delta queries over arbitrary windows.
pub struct SnapshotStore {
    db: Arc<dyn Database>,
}

impl SnapshotStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Append a snapshot and refresh the post's latest cumulative counters.
    ///
    /// Negative counters are rejected. Recording the identical (post, t,
    /// values) observation twice is a no-op; differing values at the same
    /// instant are a conflict.
    pub async fn record(
        &self,
        post_id: &str,
        metrics: MetricSet,
        at: DateTime<Utc>,
        import_ref: Option<&str>,
    ) -> Result<(), EngineError> {
        if metrics.any_negative() {
            return Err(EngineError::InvalidMetrics(format!(
                "negative counter for post {post_id}"
            )));
        }

        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or_else(|| EngineError::Persistence(anyhow!("unknown post {post_id}")))?;

        if let Some(existing) = self.db.snapshot_at(post_id, at).await? {
            if metrics.matches(&existing) {
                debug!(post_id, "duplicate snapshot, skipping");
                return Ok(());
            }
            return Err(EngineError::InvalidMetrics(format!(
                "conflicting snapshot for post {post_id} at {at}"
            )));
        }

        let snap = PostSnapshot {
            id: 0,
            post_id: post_id.to_string(),
            creator_id: post.creator_id,
            snapshot_at: at,
            views: metrics.views,
            likes: metrics.likes,
            comments: metrics.comments,
            shares: metrics.shares,
            saves: metrics.saves,
            import_ref: import_ref.map(str::to_string),
        };
        self.db.insert_snapshot(&snap).await?;

        // Refresh cumulative counters only if this is the newest observation.
        if post.last_snapshot_at.map_or(true, |last| at >= last) {
            self.db.update_post_counters(&snap).await?;
        }

        Ok(())
    }

    /// Counter gains per post over [t0, t1), keyed by post id.
    ///
    /// For each post: s0 = latest snapshot at or before t0 (implicit zero if
    /// none), s1 = latest at or before t1. Posts with no snapshot at or
    /// before t1 are omitted — an empty result is a legitimate "no data"
    /// answer, not an error.
    pub async fn delta_per_post(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
        taxonomy: &Taxonomy,
    ) -> Result<BTreeMap<String, PostDelta>, EngineError> {
        let posts = self.db.list_posts(creator_id).await?;
        let mut deltas = BTreeMap::new();

        for post in posts {
            let Some(end) = self.db.latest_snapshot_at_or_before(&post.id, t1).await? else {
                continue;
            };
            let start = self.db.latest_snapshot_at_or_before(&post.id, t0).await?;

            let base = |f: fn(&PostSnapshot) -> i64| start.as_ref().map(f).unwrap_or(0);

            deltas.insert(
                post.id.clone(),
                PostDelta {
                    views_delta: (end.views - base(|s| s.views)).max(0),
                    likes_delta: (end.likes - base(|s| s.likes)).max(0),
                    comments_delta: (end.comments - base(|s| s.comments)).max(0),
                    shares_delta: (end.shares - base(|s| s.shares)).max(0),
                    saves_delta: (end.saves - base(|s| s.saves)).max(0),
                    posted_at: post.posted_at,
                    category: taxonomy.normalize(post.category.as_deref()),
                },
            );
        }

        Ok(deltas)
    }

    /// Per-post deltas summed into category buckets. "other" is a real
    /// bucket, never dropped.
    pub async fn delta_per_category(
        &self,
        creator_id: &str,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
        taxonomy: &Taxonomy,
    ) -> Result<BTreeMap<String, CategoryDelta>, EngineError> {
        let per_post = self.delta_per_post(creator_id, t0, t1, taxonomy).await?;
        let mut by_category: BTreeMap<String, CategoryDelta> = BTreeMap::new();

        for (post_id, delta) in per_post {
            let bucket = by_category.entry(delta.category.clone()).or_default();
            bucket.views_delta += delta.views_delta;
            bucket.likes_delta += delta.likes_delta;
            bucket.comments_delta += delta.comments_delta;
            bucket.shares_delta += delta.shares_delta;
            bucket.saves_delta += delta.saves_delta;
            if delta.views_delta > 0 {
                bucket.posts_with_views += 1;
                bucket.post_ids.push(post_id);
            }
        }

        Ok(by_category)
    }
}
