// AttributionEngine — window lift reports with credit-weighted splits.
//
// The report answers: against the pre-window baseline, how many extra subs
// and how much extra revenue did this window produce, and which content
// categories earned the credit? The baseline is always built with
// baseline_end = window_start, so the window can never inflate its own
// expectation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::baseline::{self, Baseline, BaselineBuilder, DEFAULT_LOOKBACK_DAYS};
use crate::confidence::{ConfidenceResult, ConfidenceScorer, ScorerThresholds};
use crate::db::models::ConfounderEvent;
use crate::db::Database;
use crate::error::EngineError;
use crate::recommend::Tier;
use crate::snapshots::{CategoryDelta, SnapshotStore};
use crate::taxonomy::Taxonomy;

/// Engine tuning knobs. Defaults match production; tests and per-creator
/// calibration override individual fields.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub baseline_lookback_days: u32,
    pub weekly_plan_cap: u32,
    /// Soft deadline for one analysis. Hitting it surfaces WindowTooWide.
    pub analysis_deadline: StdDuration,
    pub currency: String,
    pub taxonomy: Taxonomy,
    pub thresholds: ScorerThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            baseline_lookback_days: DEFAULT_LOOKBACK_DAYS,
            weekly_plan_cap: 14,
            analysis_deadline: StdDuration::from_secs(10),
            currency: "USD".to_string(),
            taxonomy: Taxonomy::default(),
            thresholds: ScorerThresholds::default(),
        }
    }
}

/// A complete window attribution report. Self-describing: every analytical
/// caveat (default baseline, confounders, thin sample) is a field, not an
/// error.
#[derive(Debug, Clone, Serialize)]
pub struct AttributionReport {
    pub creator_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub window_hours: f64,
    pub baseline: Baseline,
    pub expected_subs: f64,
    pub actual_subs: u64,
    pub subs_lift_pct: f64,
    pub expected_revenue: f64,
    pub actual_revenue: f64,
    pub revenue_lift_pct: f64,
    pub currency: String,
    pub content_type_deltas: BTreeMap<String, CategoryDelta>,
    /// Category -> share of in-window view gain, summing to 1 when any
    /// views moved. Empty when nothing moved.
    pub credit_weights: BTreeMap<String, f64>,
    pub total_delta_views: i64,
    pub confounders: Vec<ConfounderEvent>,
    pub confidence: ConfidenceResult,
    pub recommendation_tier: Tier,
    pub notes: Vec<String>,
}

/// Per-category performance over a window, for the recommendation engine.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryPerformance {
    pub views_delta: i64,
    pub posts_with_views: u32,
    pub attributed_subs: u64,
    pub subs_per_1k_views: f64,
    pub credit_weight: f64,
    /// Lift against the category's pro-rated share of the expected count.
    pub lift_pct: f64,
    pub confidence: ConfidenceResult,
    pub tier: Tier,
}

/// Category breakdown across a whole analysis period.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub creator_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub window_hours: f64,
    pub total_subs: u64,
    pub total_delta_views: i64,
    pub actual_revenue: f64,
    pub expected_subs: f64,
    pub baseline: Baseline,
    pub has_confounders: bool,
    pub confounders: Vec<ConfounderEvent>,
    pub categories: BTreeMap<String, CategoryPerformance>,
}

pub struct AttributionEngine {
    pub(crate) db: Arc<dyn Database>,
    pub(crate) snapshots: SnapshotStore,
    baselines: BaselineBuilder,
    scorer: ConfidenceScorer,
    config: EngineConfig,
}

impl AttributionEngine {
    pub fn new(db: Arc<dyn Database>, config: EngineConfig) -> Self {
        Self {
            snapshots: SnapshotStore::new(db.clone()),
            baselines: BaselineBuilder::new(db.clone(), config.baseline_lookback_days),
            scorer: ConfidenceScorer::new(config.thresholds),
            db,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compute attribution for [w_start, w_end).
    ///
    /// `category_filter` restricts the delta/credit tables to one category.
    /// Fails fast on malformed windows; aborts with WindowTooWide when the
    /// soft deadline elapses. No partial report is ever returned.
    pub async fn attribute(
        &self,
        creator_id: &str,
        w_start: DateTime<Utc>,
        w_end: DateTime<Utc>,
        category_filter: Option<&str>,
    ) -> Result<AttributionReport, EngineError> {
        validate_window(w_start, w_end)?;

        tokio::time::timeout(
            self.config.analysis_deadline,
            self.attribute_inner(creator_id, w_start, w_end, category_filter),
        )
        .await
        .map_err(|_| EngineError::WindowTooWide(self.config.analysis_deadline))?
    }

    async fn attribute_inner(
        &self,
        creator_id: &str,
        w_start: DateTime<Utc>,
        w_end: DateTime<Utc>,
        category_filter: Option<&str>,
    ) -> Result<AttributionReport, EngineError> {
        // Baseline first: it ends exactly where the window begins
        let baseline = self
            .baselines
            .build(creator_id, w_start, &self.config.taxonomy)
            .await?;

        let window_hours = baseline::window_hours(w_start, w_end);

        let actual_subs = self.db.count_fans_between(creator_id, w_start, w_end).await? as u64;
        let actual_revenue = self.db.revenue_between(creator_id, w_start, w_end).await?;

        let expected_subs = baseline::expected_subs(&baseline, w_start, w_end);
        let expected_revenue = baseline::expected_revenue(&baseline, w_start, w_end);

        let mut content_type_deltas = self
            .snapshots
            .delta_per_category(creator_id, w_start, w_end, &self.config.taxonomy)
            .await?;
        if let Some(filter) = category_filter {
            content_type_deltas.retain(|category, _| category == filter);
        }

        let total_delta_views: i64 = content_type_deltas.values().map(|c| c.views_delta).sum();

        let mut credit_weights = BTreeMap::new();
        if total_delta_views > 0 {
            for (category, delta) in &content_type_deltas {
                credit_weights.insert(
                    category.clone(),
                    delta.views_delta as f64 / total_delta_views as f64,
                );
            }
        }

        let mut notes = Vec::new();
        if let Some(tied) = tied_leaders(&credit_weights) {
            notes.push(format!(
                "Credit weight tied between {}; ranking follows category name",
                tied.join(" and ")
            ));
        }

        let confounders = self
            .db
            .confounders_overlapping(creator_id, w_start, w_end)
            .await?;

        let confidence = self.scorer.score(
            actual_subs,
            expected_subs,
            window_hours,
            !confounders.is_empty(),
            baseline.data_days,
        );

        let recommendation_tier = if confidence.score >= 0.7 {
            Tier::Confident
        } else {
            Tier::Hypothesis
        };

        info!(
            creator_id,
            actual_subs,
            expected_subs,
            confounders = confounders.len(),
            "window attributed"
        );

        Ok(AttributionReport {
            creator_id: creator_id.to_string(),
            window_start: w_start,
            window_end: w_end,
            window_hours,
            subs_lift_pct: lift_pct(actual_subs as f64, expected_subs),
            revenue_lift_pct: lift_pct(actual_revenue, expected_revenue),
            baseline,
            expected_subs,
            actual_subs,
            expected_revenue,
            actual_revenue,
            currency: self.config.currency.clone(),
            content_type_deltas,
            credit_weights,
            total_delta_views,
            confounders,
            confidence,
            recommendation_tier,
            notes,
        })
    }

    /// Per-category performance over [w_start, w_end), with expected
    /// counts pro-rated by each category's credit weight.
    pub async fn category_performance(
        &self,
        creator_id: &str,
        w_start: DateTime<Utc>,
        w_end: DateTime<Utc>,
    ) -> Result<PerformanceReport, EngineError> {
        let overall = self.attribute(creator_id, w_start, w_end, None).await?;

        let fans_by_category: BTreeMap<String, u64> = self
            .db
            .count_fans_by_category_between(creator_id, w_start, w_end)
            .await?
            .into_iter()
            .map(|(category, count)| (category, count as u64))
            .collect();

        // Every category that either moved views or converted fans
        let mut categories: BTreeMap<String, CategoryPerformance> = BTreeMap::new();
        let mut names: Vec<String> = overall.content_type_deltas.keys().cloned().collect();
        for name in fans_by_category.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }

        let has_confounders = !overall.confounders.is_empty();
        for name in names {
            let delta = overall.content_type_deltas.get(&name);
            let views_delta = delta.map_or(0, |d| d.views_delta);
            let attributed_subs = fans_by_category.get(&name).copied().unwrap_or(0);
            let credit_weight = overall.credit_weights.get(&name).copied().unwrap_or(0.0);

            let expected_for_category = overall.expected_subs * credit_weight;
            let confidence = self.scorer.score(
                attributed_subs,
                expected_for_category,
                overall.window_hours,
                has_confounders,
                overall.baseline.data_days,
            );

            let tier = if attributed_subs >= self.config.thresholds.min_subs_confident
                && confidence.score >= 0.7
                && !has_confounders
            {
                Tier::Confident
            } else {
                Tier::Hypothesis
            };

            let views_k = views_delta as f64 / 1000.0;
            categories.insert(
                name,
                CategoryPerformance {
                    views_delta,
                    posts_with_views: delta.map_or(0, |d| d.posts_with_views),
                    attributed_subs,
                    subs_per_1k_views: if views_k > 0.0 {
                        attributed_subs as f64 / views_k
                    } else {
                        0.0
                    },
                    credit_weight,
                    lift_pct: lift_pct(attributed_subs as f64, expected_for_category),
                    confidence,
                    tier,
                },
            );
        }

        Ok(PerformanceReport {
            creator_id: creator_id.to_string(),
            window_start: w_start,
            window_end: w_end,
            window_hours: overall.window_hours,
            total_subs: overall.actual_subs,
            total_delta_views: overall.total_delta_views,
            actual_revenue: overall.actual_revenue,
            expected_subs: overall.expected_subs,
            baseline: overall.baseline,
            has_confounders,
            confounders: overall.confounders,
            categories,
        })
    }
}

/// Percentage lift of actual over expected; 0 when there is no expectation
/// to compare against.
pub fn lift_pct(actual: f64, expected: f64) -> f64 {
    if expected > 0.0 {
        (actual / expected - 1.0) * 100.0
    } else {
        0.0
    }
}

/// Reject malformed windows before touching the store.
fn validate_window(w_start: DateTime<Utc>, w_end: DateTime<Utc>) -> Result<(), EngineError> {
    if w_end <= w_start {
        return Err(EngineError::WindowInvalid(format!(
            "window end {w_end} is not after start {w_start}"
        )));
    }
    // Small tolerance so "now" windows survive clock skew between caller
    // and engine
    if w_end > Utc::now() + Duration::minutes(1) {
        return Err(EngineError::WindowInvalid(format!(
            "window end {w_end} is in the future"
        )));
    }
    Ok(())
}

/// Categories sharing the maximum credit weight, when more than one does.
fn tied_leaders(weights: &BTreeMap<String, f64>) -> Option<Vec<String>> {
    let max = weights.values().cloned().fold(f64::MIN, f64::max);
    if max <= 0.0 {
        return None;
    }
    let leaders: Vec<String> = weights
        .iter()
        .filter(|(_, w)| **w == max)
        .map(|(category, _)| category.clone())
        .collect();
    (leaders.len() > 1).then_some(leaders)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lift_pct_handles_zero_expectation() {
        assert!((lift_pct(10.0, 0.0) - 0.0).abs() < f64::EPSILON);
        assert!((lift_pct(10.0, 5.0) - 100.0).abs() < 1e-9);
        assert!((lift_pct(5.0, 10.0) + 50.0).abs() < 1e-9);
    }

    #[test]
    fn window_validation_rejects_inverted_and_future() {
        let now = Utc::now();
        assert!(matches!(
            validate_window(now, now - Duration::hours(1)),
            Err(EngineError::WindowInvalid(_))
        ));
        assert!(matches!(
            validate_window(now, now),
            Err(EngineError::WindowInvalid(_))
        ));
        assert!(matches!(
            validate_window(now, now + Duration::days(2)),
            Err(EngineError::WindowInvalid(_))
        ));
        assert!(validate_window(now - Duration::days(1), now).is_ok());
    }

    #[test]
    fn tied_leaders_detects_exact_ties() {
        let mut weights = BTreeMap::new();
        weights.insert("grwm".to_string(), 0.4);
        weights.insert("storytime".to_string(), 0.4);
        weights.insert("other".to_string(), 0.2);
        let tied = tied_leaders(&weights).unwrap();
        assert_eq!(tied, vec!["grwm".to_string(), "storytime".to_string()]);

        weights.insert("storytime".to_string(), 0.5);
        assert!(tied_leaders(&weights).is_none());
    }
}
