// End-to-end analysis scenarios over an in-memory SQLite store.
//
// Each test seeds a creator's history (baseline days, posts, snapshots,
// fans, confounders), runs the real engines, and checks the report the
// way a downstream digest consumer would read it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use prism::attribution::{AttributionEngine, EngineConfig};
use prism::db::models::{ConfounderEvent, Creator, Fan, ReferralLink, SocialPost};
use prism::db::sqlite::SqliteDatabase;
use prism::db::Database;
use prism::recommend::{Action, RecommendationEngine, Tier};
use prism::snapshots::{MetricSet, SnapshotStore};

struct Harness {
    db: Arc<dyn Database>,
    store: SnapshotStore,
    w_start: DateTime<Utc>,
    w_end: DateTime<Utc>,
    fan_seq: u32,
    post_seq: u32,
}

impl Harness {
    /// A harness whose analysis window is the trailing `days` ending an
    /// hour ago (so windows never touch the future).
    async fn new(days: i64) -> Self {
        let db: Arc<dyn Database> = Arc::new(SqliteDatabase::in_memory().unwrap());
        let w_end = Utc::now() - Duration::hours(1);
        let w_start = w_end - Duration::days(days);

        db.upsert_creator(&Creator {
            id: "c1".to_string(),
            name: "Creator One".to_string(),
            optimal_attribution_window_hours: 48,
            status: "active".to_string(),
            created_at: w_start - Duration::days(120),
        })
        .await
        .unwrap();

        Self {
            store: SnapshotStore::new(db.clone()),
            db,
            w_start,
            w_end,
            fan_seq: 0,
            post_seq: 0,
        }
    }

    fn engine(&self) -> AttributionEngine {
        AttributionEngine::new(self.db.clone(), EngineConfig::default())
    }

    fn recommender(&self) -> RecommendationEngine {
        RecommendationEngine::new(self.db.clone(), EngineConfig::default())
    }

    /// Seed `per_day` fan acquisitions for each of `days` days before the
    /// window start: the baseline population.
    async fn seed_baseline_fans(&mut self, days: i64, per_day: u32) {
        for day in 1..=days {
            for _ in 0..per_day {
                let at = self.w_start - Duration::days(day) + Duration::hours(12);
                self.insert_fan(at, None, None).await;
            }
        }
    }

    /// Seed `count` fans inside the window, pre-attributed to `category`.
    async fn seed_window_fans(&mut self, count: u32, category: Option<&str>) {
        for i in 0..count {
            let at = self.w_start + Duration::hours(2 + (i as i64 % 600));
            self.insert_fan(at, category, None).await;
        }
    }

    async fn insert_fan(
        &mut self,
        acquired_at: DateTime<Utc>,
        category: Option<&str>,
        referral_link_id: Option<&str>,
    ) -> String {
        self.fan_seq += 1;
        let id = format!("fan-{}", self.fan_seq);
        let weights = category.map(|c| {
            let mut w = BTreeMap::new();
            w.insert(c.to_string(), 1.0);
            w
        });
        self.db
            .insert_fan(&Fan {
                id: id.clone(),
                creator_id: "c1".to_string(),
                external_id_hash: Some(format!("hash-{}", self.fan_seq)),
                acquired_at,
                referral_link_id: referral_link_id.map(str::to_string),
                attributed_category: category.map(str::to_string),
                attribution_method: category.map(|_| "weighted_window".to_string()),
                attribution_confidence: category.map(|_| 0.8),
                attribution_weights: weights,
            })
            .await
            .unwrap();
        id
    }

    /// A post published at `posted_at`, with a snapshot pair spanning the
    /// analysis window: `base` views at w_start, `base + gain` at w_end.
    async fn seed_post_with_window_gain(
        &mut self,
        category: &str,
        posted_at: DateTime<Utc>,
        base: i64,
        gain: i64,
    ) -> String {
        let id = self.insert_post(category, posted_at).await;
        self.store
            .record(&id, views(base), self.w_start, None)
            .await
            .unwrap();
        self.store
            .record(&id, views(base + gain), self.w_end, None)
            .await
            .unwrap();
        id
    }

    async fn insert_post(&mut self, category: &str, posted_at: DateTime<Utc>) -> String {
        self.post_seq += 1;
        let id = format!("post-{}", self.post_seq);
        self.db
            .upsert_post(&SocialPost {
                id: id.clone(),
                creator_id: "c1".to_string(),
                platform: "tiktok".to_string(),
                platform_post_id: None,
                posted_at,
                views_cumulative: 0,
                likes_cumulative: 0,
                comments_cumulative: 0,
                shares_cumulative: 0,
                saves_cumulative: 0,
                caption: None,
                url: None,
                category: Some(category.to_string()),
                category_source: Some("user_confirmed".to_string()),
                last_snapshot_at: None,
            })
            .await
            .unwrap();
        id
    }

    async fn add_confounder(&self, start_day: i64, end_day: Option<i64>, event_type: &str) {
        self.db
            .insert_confounder(&ConfounderEvent {
                id: 0,
                creator_id: "c1".to_string(),
                event_type: event_type.to_string(),
                event_start: self.w_start + Duration::days(start_day),
                event_end: end_day.map(|d| self.w_start + Duration::days(d)),
                description: Some("declared by agency".to_string()),
                estimated_impact: Some("high".to_string()),
            })
            .await
            .unwrap();
    }
}

fn views(v: i64) -> MetricSet {
    MetricSet {
        views: v,
        ..Default::default()
    }
}

// ------------------------------------------------------------------
// S1: clean confident win
// ------------------------------------------------------------------

#[tokio::test]
async fn s1_clean_confident_win() {
    let mut h = Harness::new(30).await;

    // Baseline: 2 subs/day over 21 days, no weekday skew
    h.seed_baseline_fans(21, 2).await;

    // Window: 60 storytime subs, 20 thirst_trap subs
    h.seed_window_fans(60, Some("storytime")).await;
    h.seed_window_fans(20, Some("thirst_trap")).await;

    // Equal view gain so each category carries half the credit. Posts sit
    // in the 4 weeks before the window so posts/week is non-zero.
    let posted = h.w_start - Duration::days(10);
    h.seed_post_with_window_gain("storytime", posted, 50_000, 10_000)
        .await;
    h.seed_post_with_window_gain("thirst_trap", posted, 80_000, 10_000)
        .await;

    let report = h.recommender()
        .generate_for_window("c1", h.w_start, h.w_end, 30)
        .await
        .unwrap();

    assert!(!report.has_confounders);

    let storytime = report
        .confident
        .iter()
        .find(|r| r.category == "storytime")
        .expect("storytime should be a confident recommendation");
    assert_eq!(storytime.tier, Tier::Confident);
    assert_eq!(storytime.action, Action::Increase);
    // 60 actual vs 30 expected (half of the 60-sub expectation)
    assert!(
        (storytime.lift_pct - 100.0).abs() < 10.0,
        "lift was {}",
        storytime.lift_pct
    );
    assert!(storytime.confidence_score >= 0.7);

    // thirst_trap converted below its share: directional only
    let tt = report
        .hypothesis
        .iter()
        .find(|r| r.category == "thirst_trap")
        .expect("thirst_trap should be a hypothesis");
    assert_eq!(tt.tier, Tier::Hypothesis);

    assert_eq!(report.top_performer.as_deref(), Some("storytime"));
}

// ------------------------------------------------------------------
// S2: insufficient data
// ------------------------------------------------------------------

#[tokio::test]
async fn s2_insufficient_data() {
    let mut h = Harness::new(7).await;

    h.seed_window_fans(3, Some("storytime")).await;

    // Four storytime posts in the 4-week lookback: 1 post/week currently
    for i in 0..4 {
        let posted = h.w_start - Duration::days(7 * i + 2);
        h.seed_post_with_window_gain("storytime", posted, 1_000 * i, 500)
            .await;
    }

    let report = h.recommender()
        .generate_for_window("c1", h.w_start, h.w_end, 7)
        .await
        .unwrap();

    let entry = report
        .insufficient_data
        .iter()
        .find(|e| e.category == "storytime")
        .expect("storytime should be in insufficient_data");
    assert_eq!(entry.reason, "Only 3 subs attributed");
    assert!(entry.views_delta > 0);

    assert!(report.confident.is_empty());
    assert!(report.hypothesis.is_empty());

    // Plan falls back to the current rate: 4 posts over 4 weeks = 1/week
    assert_eq!(report.weekly_plan.total_posts, 1);
    assert!(report.weekly_plan.breakdown.is_empty());
}

// ------------------------------------------------------------------
// S3: confounder present
// ------------------------------------------------------------------

#[tokio::test]
async fn s3_confounder_downgrades_to_hypothesis() {
    let mut h = Harness::new(30).await;

    h.seed_baseline_fans(21, 1).await;
    h.seed_window_fans(40, Some("storytime")).await;

    let posted = h.w_start - Duration::days(5);
    h.seed_post_with_window_gain("storytime", posted, 10_000, 20_000)
        .await;

    // Promotion overlapping days 10-15 of the window
    h.add_confounder(10, Some(15), "promotion").await;

    let report = h.recommender()
        .generate_for_window("c1", h.w_start, h.w_end, 30)
        .await
        .unwrap();

    assert!(report.has_confounders);
    assert!(report
        .confounder_warning
        .as_deref()
        .unwrap()
        .contains("promotion"));

    // 40 subs and strong lift, but the confounder blocks the confident tier
    assert!(report.confident.is_empty());
    let storytime = report
        .hypothesis
        .iter()
        .find(|r| r.category == "storytime")
        .expect("storytime should be a hypothesis");
    assert_eq!(storytime.tier, Tier::Hypothesis);
    assert!(storytime.attributed_subs >= 25);

    // The confounder reason is spelled out for the digest consumer
    let perf = h
        .engine()
        .category_performance("c1", h.w_start, h.w_end)
        .await
        .unwrap();
    assert!(perf.categories["storytime"]
        .confidence
        .reasons
        .iter()
        .any(|r| r.contains("Confounder")));

    // Weekly plan is withheld
    assert!(report.weekly_plan.breakdown.is_empty());
    assert!(report.weekly_plan.rationale.contains("confounders"));
}

// ------------------------------------------------------------------
// S4: placebo window
// ------------------------------------------------------------------

#[tokio::test]
async fn s4_placebo_window_makes_no_claims() {
    let mut h = Harness::new(7).await;

    // Steady baseline of 2/day; the window continues at exactly that rate
    h.seed_baseline_fans(21, 2).await;
    h.seed_window_fans(14, None).await;

    // Posts exist but gained nothing in the window
    let posted = h.w_start - Duration::days(20);
    h.seed_post_with_window_gain("storytime", posted, 40_000, 0).await;
    h.seed_post_with_window_gain("grwm", posted, 25_000, 0).await;

    let report = h.engine()
        .attribute("c1", h.w_start, h.w_end, None)
        .await
        .unwrap();

    assert!(
        report.subs_lift_pct.abs() < 5.0,
        "placebo lift was {}",
        report.subs_lift_pct
    );
    assert_eq!(report.total_delta_views, 0);
    assert!(report.credit_weights.is_empty());
    assert!(!report
        .confidence
        .reasons
        .iter()
        .any(|r| r.contains("statistically significant")));

    let recs = h.recommender()
        .generate_for_window("c1", h.w_start, h.w_end, 7)
        .await
        .unwrap();
    assert!(recs.confident.is_empty());
    assert!(recs.hypothesis.is_empty());
}

// ------------------------------------------------------------------
// S5: cumulative vs delta
// ------------------------------------------------------------------

#[tokio::test]
async fn s5_credit_follows_window_gain_not_lifetime_views() {
    let mut h = Harness::new(7).await;

    let posted = h.w_start - Duration::days(60);
    // P1: 500k lifetime views but only 2k gained in the window
    h.seed_post_with_window_gain("storytime", posted, 500_000, 2_000)
        .await;
    // P2: young post that gained 8k in the window
    h.seed_post_with_window_gain("grwm", h.w_start - Duration::days(2), 0, 8_000)
        .await;

    let report = h.engine()
        .attribute("c1", h.w_start, h.w_end, None)
        .await
        .unwrap();

    assert!((report.credit_weights["storytime"] - 0.2).abs() < 1e-9);
    assert!((report.credit_weights["grwm"] - 0.8).abs() < 1e-9);

    // A cumulative-based split would have inverted this ranking
    assert!(report.credit_weights["grwm"] > report.credit_weights["storytime"]);
}

// ------------------------------------------------------------------
// S6: sub-day window
// ------------------------------------------------------------------

#[tokio::test]
async fn s6_sub_day_window_uses_hours() {
    let mut h = Harness::new(30).await;
    // Rebind the window to 18 hours
    h.w_start = h.w_end - Duration::hours(18);

    // 8 subs/day baseline, uniform across weekdays
    h.seed_baseline_fans(21, 8).await;
    h.seed_window_fans(6, None).await;

    let report = h.engine()
        .attribute("c1", h.w_start, h.w_end, None)
        .await
        .unwrap();

    assert!((report.window_hours - 18.0).abs() < 0.01);
    // 8.0 * 18/24 = 6.0 before day-of-week adjustment; with a flat seed
    // the factors are 1.0, so the adjusted value matches
    assert!(
        (report.expected_subs - 6.0).abs() < 0.3,
        "expected_subs was {}",
        report.expected_subs
    );
    assert!(
        report.subs_lift_pct.abs() < 10.0,
        "lift was {}",
        report.subs_lift_pct
    );
    assert!(report
        .confidence
        .reasons
        .iter()
        .any(|r| r.contains("Short window")));
}

// ------------------------------------------------------------------
// Fan attribution paths
// ------------------------------------------------------------------

#[tokio::test]
async fn referral_hint_wins_over_weighted_window() {
    let mut h = Harness::new(7).await;

    h.db
        .insert_referral_link(&ReferralLink {
            id: "link-1".to_string(),
            creator_id: "c1".to_string(),
            code: "grwm-bio".to_string(),
            category_hint: Some("grwm".to_string()),
        })
        .await
        .unwrap();

    // Storytime dominates the view window, but the link hint is definitive
    let posted = h.w_start - Duration::days(3);
    h.seed_post_with_window_gain("storytime", posted, 0, 50_000)
        .await;

    // Acquired right at the closing snapshot so the gain is visible in the
    // 48h attribution window
    let acquired = h.w_end;
    let linked = h.insert_fan(acquired, None, Some("link-1")).await;
    let organic = h.insert_fan(acquired, None, None).await;

    let stats = h.engine().attribute_fans("c1", None).await.unwrap();
    assert_eq!(stats.referral_link, 1);
    assert_eq!(stats.weighted_window, 1);

    let linked = h.db.get_fan(&linked).await.unwrap().unwrap();
    assert_eq!(linked.attributed_category.as_deref(), Some("grwm"));
    assert_eq!(linked.attribution_method.as_deref(), Some("referral_link"));
    assert!((linked.attribution_confidence.unwrap() - 0.95).abs() < 1e-9);
    let weights = linked.attribution_weights.unwrap();
    assert!((weights["grwm"] - 1.0).abs() < 1e-9);

    let organic = h.db.get_fan(&organic).await.unwrap().unwrap();
    assert_eq!(organic.attributed_category.as_deref(), Some("storytime"));
    assert_eq!(
        organic.attribution_method.as_deref(),
        Some("weighted_window")
    );
    // Fully concentrated weight: 0.3 + 0.5 * 1.0
    assert!((organic.attribution_confidence.unwrap() - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn fan_attribution_is_deterministic_and_idempotent() {
    let mut h = Harness::new(7).await;

    let posted = h.w_start - Duration::days(3);
    h.seed_post_with_window_gain("storytime", posted, 0, 6_000).await;
    h.seed_post_with_window_gain("grwm", posted, 0, 4_000).await;

    let acquired = h.w_end;
    let fan = h.insert_fan(acquired, None, None).await;

    let stats = h.engine().attribute_fans("c1", None).await.unwrap();
    assert_eq!(stats.weighted_window, 1);

    let first = h.db.get_fan(&fan).await.unwrap().unwrap();
    let first_weights = first.attribution_weights.clone().unwrap();
    assert!((first_weights["storytime"] - 0.6).abs() < 1e-9);
    assert!((first_weights["grwm"] - 0.4).abs() < 1e-9);

    // Second pass touches nothing: the fan is already attributed
    let stats = h.engine().attribute_fans("c1", None).await.unwrap();
    assert_eq!(stats.weighted_window, 0);
    assert_eq!(stats.no_data, 0);

    let second = h.db.get_fan(&fan).await.unwrap().unwrap();
    assert_eq!(second.attributed_category, first.attributed_category);
    assert_eq!(second.attribution_weights.unwrap(), first_weights);
}

#[tokio::test]
async fn fan_with_no_view_movement_stays_unattributed() {
    let mut h = Harness::new(7).await;

    let acquired = h.w_end - Duration::hours(5);
    let fan = h.insert_fan(acquired, None, None).await;

    let stats = h.engine().attribute_fans("c1", None).await.unwrap();
    assert_eq!(stats.no_data, 1);
    assert_eq!(stats.weighted_window, 0);

    let fan = h.db.get_fan(&fan).await.unwrap().unwrap();
    assert!(fan.attributed_category.is_none());
}

// ------------------------------------------------------------------
// Window validation
// ------------------------------------------------------------------

#[tokio::test]
async fn inverted_and_future_windows_are_rejected() {
    let h = Harness::new(7).await;
    let engine = h.engine();

    let err = engine
        .attribute("c1", h.w_end, h.w_start, None)
        .await
        .unwrap_err();
    assert!(matches!(err, prism::error::EngineError::WindowInvalid(_)));

    let err = engine
        .attribute("c1", h.w_start, Utc::now() + Duration::days(3), None)
        .await
        .unwrap_err();
    assert!(matches!(err, prism::error::EngineError::WindowInvalid(_)));
}
