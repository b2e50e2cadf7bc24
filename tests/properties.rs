// Randomised property tests for the invariants the pipeline must hold
// regardless of input shape: the confident gate, monotone evidence,
// weight closure, and delta non-negativity.
//
// Seeded RNG keeps every run reproducible.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use prism::attribution::{AttributionEngine, EngineConfig};
use prism::confidence::ConfidenceScorer;
use prism::db::models::{ConfounderEvent, Creator, Fan, SocialPost};
use prism::db::sqlite::SqliteDatabase;
use prism::db::Database;
use prism::recommend::RecommendationEngine;
use prism::snapshots::{MetricSet, SnapshotStore};
use prism::taxonomy::Taxonomy;

const CATEGORIES: [&str; 5] = ["storytime", "grwm", "thirst_trap", "behind_scenes", "money_talk"];

fn views(v: i64) -> MetricSet {
    MetricSet {
        views: v,
        ..Default::default()
    }
}

async fn fresh_db(w_start: DateTime<Utc>) -> Arc<dyn Database> {
    let db: Arc<dyn Database> = Arc::new(SqliteDatabase::in_memory().unwrap());
    db.upsert_creator(&Creator {
        id: "c1".to_string(),
        name: "Creator".to_string(),
        optimal_attribution_window_hours: 48,
        status: "active".to_string(),
        created_at: w_start - Duration::days(120),
    })
    .await
    .unwrap();
    db
}

async fn insert_post(db: &Arc<dyn Database>, id: &str, category: &str, posted_at: DateTime<Utc>) {
    db.upsert_post(&SocialPost {
        id: id.to_string(),
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
        category_source: None,
        last_snapshot_at: None,
    })
    .await
    .unwrap();
}

async fn insert_fan(
    db: &Arc<dyn Database>,
    id: &str,
    acquired_at: DateTime<Utc>,
    category: Option<&str>,
) {
    db.insert_fan(&Fan {
        id: id.to_string(),
        creator_id: "c1".to_string(),
        external_id_hash: None,
        acquired_at,
        referral_link_id: None,
        attributed_category: category.map(str::to_string),
        attribution_method: category.map(|_| "weighted_window".to_string()),
        attribution_confidence: None,
        attribution_weights: None,
    })
    .await
    .unwrap();
}

// ------------------------------------------------------------------
// Property: no confident recommendation without subs >= 25, score >= 0.7,
// and a confounder-free window
// ------------------------------------------------------------------

#[tokio::test]
async fn confident_gate_holds_on_random_inputs() {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);

    for round in 0..12 {
        let w_end = Utc::now() - Duration::hours(1);
        let w_start = w_end - Duration::days(30);
        let db = fresh_db(w_start).await;
        let store = SnapshotStore::new(db.clone());

        // Random baseline population
        let baseline_per_day = rng.random_range(0..4u32);
        for day in 1..=14i64 {
            for n in 0..baseline_per_day {
                insert_fan(
                    &db,
                    &format!("b-{round}-{day}-{n}"),
                    w_start - Duration::days(day) + Duration::hours(9),
                    None,
                )
                .await;
            }
        }

        // Random per-category activity in the window
        for (ci, category) in CATEGORIES.iter().copied().enumerate() {
            let gain = rng.random_range(0..50_000i64);
            let post_id = format!("p-{round}-{ci}");
            insert_post(&db, &post_id, category, w_start - Duration::days(10)).await;
            store.record(&post_id, views(1_000), w_start, None).await.unwrap();
            store
                .record(&post_id, views(1_000 + gain), w_end, None)
                .await
                .unwrap();

            let subs = rng.random_range(0..60u32);
            for n in 0..subs {
                insert_fan(
                    &db,
                    &format!("f-{round}-{ci}-{n}"),
                    w_start + Duration::hours(1 + (n as i64 % 700)),
                    Some(category),
                )
                .await;
            }
        }

        // Sometimes an overlapping confounder
        if rng.random_range(0..3) == 0 {
            db.insert_confounder(&ConfounderEvent {
                id: 0,
                creator_id: "c1".to_string(),
                event_type: "promotion".to_string(),
                event_start: w_start + Duration::days(rng.random_range(0..20i64)),
                event_end: None,
                description: None,
                estimated_impact: None,
            })
            .await
            .unwrap();
        }

        let report = RecommendationEngine::new(db, EngineConfig::default())
            .generate_for_window("c1", w_start, w_end, 30)
            .await
            .unwrap();

        for rec in &report.confident {
            assert!(
                rec.attributed_subs >= 25,
                "round {round}: confident with {} subs",
                rec.attributed_subs
            );
            assert!(
                rec.confidence_score >= 0.7,
                "round {round}: confident with score {}",
                rec.confidence_score
            );
            assert!(
                !report.has_confounders,
                "round {round}: confident despite confounders"
            );
        }
    }
}

// ------------------------------------------------------------------
// Property: in the lift regime (actual >= expected, test active), one more
// event never lowers the score
// ------------------------------------------------------------------

#[test]
fn monotone_evidence_on_random_baselines() {
    let mut rng = StdRng::seed_from_u64(7);
    let scorer = ConfidenceScorer::default();

    for _ in 0..40 {
        let expected = rng.random_range(1.0..60.0f64);
        let window_hours = if rng.random_range(0..2) == 0 { 18.0 } else { 720.0 };
        let baseline_days = rng.random_range(0..21u32);
        let has_confounders = rng.random_range(0..2) == 0;

        let start = (expected.ceil() as u64).max(5);
        let mut prev = f64::MIN;
        for actual in start..start + 80 {
            let result = scorer.score(
                actual,
                expected,
                window_hours,
                has_confounders,
                baseline_days,
            );
            assert!(
                result.score >= prev - 1e-12,
                "score regressed at actual={actual}, expected={expected}: {prev} -> {}",
                result.score
            );
            prev = result.score;
        }
    }
}

// ------------------------------------------------------------------
// Property: weighted-window weights always close to 1 and stay in [0, 1]
// ------------------------------------------------------------------

#[tokio::test]
async fn weight_closure_on_random_view_splits() {
    let mut rng = StdRng::seed_from_u64(99);

    for round in 0..8 {
        let w_end = Utc::now() - Duration::hours(1);
        let w_start = w_end - Duration::days(7);
        let db = fresh_db(w_start).await;
        let store = SnapshotStore::new(db.clone());

        // Random gains; at least one category must move for attribution
        let mut any_gain = false;
        for (ci, category) in CATEGORIES.iter().copied().enumerate() {
            let gain = rng.random_range(0..20_000i64);
            any_gain |= gain > 0;
            let post_id = format!("p-{round}-{ci}");
            insert_post(&db, &post_id, category, w_start).await;
            store.record(&post_id, views(500), w_start, None).await.unwrap();
            store
                .record(&post_id, views(500 + gain), w_end, None)
                .await
                .unwrap();
        }
        if !any_gain {
            continue;
        }

        for n in 0..rng.random_range(1..6u32) {
            insert_fan(&db, &format!("f-{round}-{n}"), w_end, None).await;
        }

        let engine = AttributionEngine::new(db.clone(), EngineConfig::default());
        engine.attribute_fans("c1", None).await.unwrap();

        for fan in db.list_unattributed_fans("c1").await.unwrap() {
            panic!("fan {} left unattributed despite view movement", fan.id);
        }
        for n in 0..6 {
            let Some(fan) = db.get_fan(&format!("f-{round}-{n}")).await.unwrap() else {
                continue;
            };
            if fan.attribution_method.as_deref() != Some("weighted_window") {
                continue;
            }
            let weights = fan.attribution_weights.expect("weighted fan has weights");
            let sum: f64 = weights.values().sum();
            assert!(
                (sum - 1.0).abs() < 1e-6,
                "round {round}: weights sum to {sum}"
            );
            for (category, weight) in &weights {
                assert!(
                    (0.0..=1.0).contains(weight),
                    "round {round}: weight {weight} out of range for {category}"
                );
            }
        }
    }
}

// ------------------------------------------------------------------
// Property: deltas never go negative, even over regressing counters
// ------------------------------------------------------------------

#[tokio::test]
async fn delta_non_negativity_under_random_recounts() {
    let mut rng = StdRng::seed_from_u64(1234);

    let w_end = Utc::now() - Duration::hours(1);
    let origin = w_end - Duration::days(40);
    let db = fresh_db(origin).await;
    let store = SnapshotStore::new(db.clone());

    // Counter walks that sometimes regress (platform recounts)
    for post in 0..6 {
        let post_id = format!("p-{post}");
        insert_post(&db, &post_id, CATEGORIES[post % CATEGORIES.len()], origin).await;

        let mut value = rng.random_range(0..5_000i64);
        for step in 0..12 {
            let at = origin + Duration::days(step * 3) + Duration::hours(post as i64);
            store.record(&post_id, views(value), at, None).await.unwrap();
            if rng.random_range(0..4) == 0 {
                value = (value - rng.random_range(0..2_000i64)).max(0);
            } else {
                value += rng.random_range(0..8_000i64);
            }
        }
    }

    // Random windows, including tiny and inverted-to-empty ones
    let taxonomy = Taxonomy::default();
    for _ in 0..30 {
        let a = rng.random_range(0..960i64); // hours across the 40 days
        let len = rng.random_range(1..400i64);
        let t0 = origin + Duration::hours(a);
        let t1 = (t0 + Duration::hours(len)).min(w_end);

        let deltas = store.delta_per_post("c1", t0, t1, &taxonomy).await.unwrap();
        for (post_id, delta) in deltas {
            assert!(
                delta.views_delta >= 0,
                "negative views delta for {post_id}: {}",
                delta.views_delta
            );
            assert!(delta.likes_delta >= 0);
            assert!(delta.comments_delta >= 0);
            assert!(delta.shares_delta >= 0);
            assert!(delta.saves_delta >= 0);
        }
    }
}
