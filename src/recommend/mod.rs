// RecommendationEngine — tiered actions and a weekly posting plan.
//
// Two principles carried through every branch:
//   1. Never claim confidence the evidence can't back. The confident tier
//      requires sample size AND score AND a clean (confounder-free) window.
//   2. Degrade, don't hide. Thin categories land in insufficient_data with
//      a reason; confounded windows keep their numbers but withhold the
//      plan and mark every entry as hypothesis.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::attribution::engine::{AttributionEngine, CategoryPerformance, EngineConfig};
use crate::db::models::ConfounderEvent;
use crate::db::Database;
use crate::error::EngineError;
use crate::taxonomy::OTHER;

/// Recommendation confidence tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    /// Strong evidence; act on it.
    Confident,
    /// Directional only; worth testing, don't bet on it.
    Hypothesis,
    /// No claim permitted.
    InsufficientData,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Confident => "confident",
            Tier::Hypothesis => "hypothesis",
            Tier::InsufficientData => "insufficient_data",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recommended posting action for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Increase,
    Maintain,
    Decrease,
    Test,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Increase => "increase",
            Action::Maintain => "maintain",
            Action::Decrease => "decrease",
            Action::Test => "test",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One per-category recommendation.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub category: String,
    pub action: Action,
    pub tier: Tier,
    pub lift_pct: f64,
    pub confidence_score: f64,
    pub attributed_subs: u64,
    pub current_posts_per_week: f64,
    pub suggested_posts_per_week: f64,
    pub reasoning: String,
    pub caveats: Vec<String>,
}

/// A category with too few events for any claim.
#[derive(Debug, Clone, Serialize)]
pub struct InsufficientEntry {
    pub category: String,
    pub attributed_subs: u64,
    pub views_delta: i64,
    pub reason: String,
}

/// Suggested weekly posting mix.
#[derive(Debug, Clone, Serialize)]
pub struct WeeklyPlan {
    pub total_posts: u32,
    pub breakdown: BTreeMap<String, u32>,
    pub rationale: String,
}

/// Complete recommendation report for a creator.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationReport {
    pub creator_id: String,
    pub period_days: u32,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_subs: u64,
    pub total_revenue: f64,
    pub has_confounders: bool,
    pub confounder_warning: Option<String>,
    /// Top 3 per tier, ranked by |lift| descending.
    pub confident: Vec<Recommendation>,
    pub hypothesis: Vec<Recommendation>,
    pub insufficient_data: Vec<InsufficientEntry>,
    pub weekly_plan: WeeklyPlan,
    pub top_performer: Option<String>,
    pub underperformer: Option<String>,
    pub data_quality_notes: Vec<String>,
}

/// Lift must reach this magnitude before increase/decrease is suggested.
const ACTION_LIFT_THRESHOLD: f64 = 50.0;

/// A decrease additionally requires this much credit share, so a noisy
/// near-zero category can't be told to stop posting.
const DECREASE_MIN_SHARE: f64 = 0.10;

/// "Current posts per week" lookback preceding the window, in weeks.
const POSTS_PER_WEEK_LOOKBACK_WEEKS: i64 = 4;

pub struct RecommendationEngine {
    attribution: AttributionEngine,
    db: Arc<dyn Database>,
}

impl RecommendationEngine {
    pub fn new(db: Arc<dyn Database>, config: EngineConfig) -> Self {
        Self {
            attribution: AttributionEngine::new(db.clone(), config),
            db,
        }
    }

    pub fn attribution(&self) -> &AttributionEngine {
        &self.attribution
    }

    /// Generate the tiered report for the trailing `days`.
    pub async fn generate(
        &self,
        creator_id: &str,
        days: u32,
    ) -> Result<RecommendationReport, EngineError> {
        let w_end = Utc::now();
        let w_start = w_end - Duration::days(days as i64);
        self.generate_for_window(creator_id, w_start, w_end, days)
            .await
    }

    /// Window-explicit variant used by tests and backfills.
    pub async fn generate_for_window(
        &self,
        creator_id: &str,
        w_start: DateTime<Utc>,
        w_end: DateTime<Utc>,
        period_days: u32,
    ) -> Result<RecommendationReport, EngineError> {
        let perf = self
            .attribution
            .category_performance(creator_id, w_start, w_end)
            .await?;

        let posts_per_week = self.current_posts_per_week(creator_id, w_start).await?;
        let thresholds = self.attribution.config().thresholds;

        let mut all_recommendations = Vec::new();
        let mut insufficient = Vec::new();

        for (category, data) in &perf.categories {
            if category == OTHER {
                continue;
            }
            // Dormant category: nothing moved, nothing converted, no claim
            if data.attributed_subs == 0 && data.views_delta == 0 {
                continue;
            }

            if data.attributed_subs < thresholds.min_subs_recommendation {
                insufficient.push(InsufficientEntry {
                    category: category.clone(),
                    attributed_subs: data.attributed_subs,
                    views_delta: data.views_delta,
                    reason: format!("Only {} subs attributed", data.attributed_subs),
                });
                continue;
            }

            let current = posts_per_week.get(category).copied().unwrap_or(0.0);
            all_recommendations.push(build_recommendation(
                category,
                data,
                current,
                perf.has_confounders,
            ));
        }

        let current_total: f64 = posts_per_week.values().sum();
        let weekly_plan = self.build_weekly_plan(
            &all_recommendations,
            perf.has_confounders,
            current_total,
        );

        let mut confident: Vec<Recommendation> = all_recommendations
            .iter()
            .filter(|r| r.tier == Tier::Confident)
            .cloned()
            .collect();
        let mut hypothesis: Vec<Recommendation> = all_recommendations
            .iter()
            .filter(|r| r.tier == Tier::Hypothesis)
            .cloned()
            .collect();
        rank_by_lift(&mut confident);
        rank_by_lift(&mut hypothesis);
        confident.truncate(3);
        hypothesis.truncate(3);

        let top_performer = confident
            .iter()
            .max_by(|a, b| a.lift_pct.total_cmp(&b.lift_pct))
            .map(|r| r.category.clone());
        let underperformer = confident
            .iter()
            .filter(|r| r.action == Action::Decrease)
            .min_by(|a, b| a.lift_pct.total_cmp(&b.lift_pct))
            .map(|r| r.category.clone());

        let confounder_warning = perf
            .has_confounders
            .then(|| build_confounder_warning(&perf.confounders));

        let data_quality_notes = assess_data_quality(
            perf.total_subs,
            period_days,
            insufficient.len(),
            perf.categories.len(),
            perf.baseline.is_default,
            &thresholds,
        );

        info!(
            creator_id,
            confident = confident.len(),
            hypothesis = hypothesis.len(),
            insufficient = insufficient.len(),
            has_confounders = perf.has_confounders,
            "recommendation report generated"
        );

        Ok(RecommendationReport {
            creator_id: creator_id.to_string(),
            period_days,
            window_start: w_start,
            window_end: w_end,
            total_subs: perf.total_subs,
            total_revenue: perf.actual_revenue,
            has_confounders: perf.has_confounders,
            confounder_warning,
            confident,
            hypothesis,
            insufficient_data: insufficient,
            weekly_plan,
            top_performer,
            underperformer,
            data_quality_notes,
        })
    }

    /// Posting rate per category over the 4 weeks preceding the window.
    async fn current_posts_per_week(
        &self,
        creator_id: &str,
        w_start: DateTime<Utc>,
    ) -> Result<BTreeMap<String, f64>, EngineError> {
        let lookback_start = w_start - Duration::weeks(POSTS_PER_WEEK_LOOKBACK_WEEKS);
        let counts = self
            .db
            .count_posts_by_category_between(creator_id, lookback_start, w_start)
            .await?;

        let taxonomy = &self.attribution.config().taxonomy;
        let mut per_week: BTreeMap<String, f64> = BTreeMap::new();
        for (raw_label, count) in counts {
            let category = taxonomy.normalize(raw_label.as_deref());
            *per_week.entry(category).or_insert(0.0) +=
                count as f64 / POSTS_PER_WEEK_LOOKBACK_WEEKS as f64;
        }
        Ok(per_week)
    }

    fn build_weekly_plan(
        &self,
        recommendations: &[Recommendation],
        has_confounders: bool,
        current_total: f64,
    ) -> WeeklyPlan {
        let current_total_posts = current_total.round() as u32;

        if has_confounders {
            return WeeklyPlan {
                total_posts: current_total_posts,
                breakdown: BTreeMap::new(),
                rationale: "Weekly plan unavailable due to confounders. Maintain the current \
                            mix while gathering a clean measurement window."
                    .to_string(),
            };
        }

        if recommendations.is_empty() {
            return WeeklyPlan {
                total_posts: current_total_posts,
                breakdown: BTreeMap::new(),
                rationale: "Insufficient data for a weekly plan. Keep the current mix and \
                            continue testing all content types."
                    .to_string(),
            };
        }

        let cap = self.attribution.config().weekly_plan_cap;
        let mut breakdown: BTreeMap<String, u32> = BTreeMap::new();
        for rec in recommendations {
            let posts = rec.suggested_posts_per_week.round().max(1.0) as u32;
            breakdown.insert(rec.category.clone(), posts);
        }

        let mut total: u32 = breakdown.values().sum();
        if total > cap {
            // Scale proportionally, keeping every category at >= 1
            let scale = cap as f64 / total as f64;
            for posts in breakdown.values_mut() {
                *posts = ((*posts as f64 * scale).floor() as u32).max(1);
            }
            total = breakdown.values().sum();
        }

        let mut focus: Vec<&str> = recommendations
            .iter()
            .filter(|r| r.action == Action::Increase)
            .map(|r| r.category.as_str())
            .collect();
        focus.truncate(2);

        let rationale = if focus.is_empty() {
            "Balanced mix based on current lift data.".to_string()
        } else {
            format!("Focus on {} based on lift data.", focus.join(", "))
        };

        WeeklyPlan {
            total_posts: total,
            breakdown,
            rationale,
        }
    }
}

/// Build one category's recommendation from its performance data.
fn build_recommendation(
    category: &str,
    data: &CategoryPerformance,
    current_posts_per_week: f64,
    has_confounders: bool,
) -> Recommendation {
    let lift = data.lift_pct;
    let tier = data.tier;

    let (action, reasoning) = if lift >= ACTION_LIFT_THRESHOLD {
        match tier {
            Tier::Confident => (
                Action::Increase,
                format!("Strong performer with {lift:+.0}% lift. Increase posting frequency."),
            ),
            _ => (
                Action::Increase,
                format!("Promising {lift:+.0}% lift; increase cautiously while evidence accrues."),
            ),
        }
    } else if lift <= -ACTION_LIFT_THRESHOLD && data.credit_weight >= DECREASE_MIN_SHARE {
        (
            Action::Decrease,
            format!(
                "Negative lift of {lift:+.0}% on {:.0}% of view share. Reallocate effort.",
                data.credit_weight * 100.0
            ),
        )
    } else if tier == Tier::Hypothesis && lift.abs() < ACTION_LIFT_THRESHOLD {
        (
            Action::Test,
            format!("Inconclusive ({lift:+.0}% lift). Keep testing to firm up the signal."),
        )
    } else {
        (
            Action::Maintain,
            format!("Neutral performance ({lift:+.0}% lift). Maintain current frequency."),
        )
    };

    let suggested_posts_per_week = match action {
        // x1.5, but always at least two more than today
        Action::Increase => (current_posts_per_week * 1.5).max(current_posts_per_week + 2.0),
        // Halve, but keep at least one post to preserve the signal
        Action::Decrease => (current_posts_per_week * 0.5).max(1.0),
        Action::Maintain | Action::Test => current_posts_per_week,
    };

    let mut caveats = Vec::new();
    if has_confounders {
        caveats.push("Confounders detected; results may be skewed".to_string());
    }
    if tier == Tier::Hypothesis {
        caveats.push("Hypothesis only; needs more data to confirm".to_string());
    }
    if data
        .confidence
        .reasons
        .iter()
        .any(|r| r.contains("Moderate sample") || r.contains("Low sample"))
    {
        caveats.push(format!(
            "Sample of {} subs limits certainty",
            data.attributed_subs
        ));
    }
    if data.posts_with_views < 5 {
        caveats.push(format!("Only {} posts analysed", data.posts_with_views));
    }

    Recommendation {
        category: category.to_string(),
        action,
        tier,
        lift_pct: lift,
        confidence_score: data.confidence.score,
        attributed_subs: data.attributed_subs,
        current_posts_per_week,
        suggested_posts_per_week,
        reasoning,
        caveats,
    }
}

fn rank_by_lift(recommendations: &mut [Recommendation]) {
    recommendations.sort_by(|a, b| b.lift_pct.abs().total_cmp(&a.lift_pct.abs()));
}

fn build_confounder_warning(confounders: &[ConfounderEvent]) -> String {
    let mut types: Vec<&str> = confounders.iter().map(|c| c.event_type.as_str()).collect();
    types.sort_unstable();
    types.dedup();

    let descriptions: Vec<&str> = confounders
        .iter()
        .filter_map(|c| c.description.as_deref())
        .take(3)
        .collect();

    let mut warning = format!(
        "Confounder alert: {} detected during this period",
        types.join(", ")
    );
    if !descriptions.is_empty() {
        warning.push_str(&format!(" ({})", descriptions.join("; ")));
    }
    warning.push_str(
        ". Recommendations are hypotheses until a clean measurement window is available.",
    );
    warning
}

fn assess_data_quality(
    total_subs: u64,
    period_days: u32,
    insufficient_count: usize,
    category_count: usize,
    baseline_is_default: bool,
    thresholds: &crate::confidence::ScorerThresholds,
) -> Vec<String> {
    let mut notes = Vec::new();

    if total_subs < thresholds.min_subs_recommendation {
        notes.push(format!(
            "Only {total_subs} subscribers in period; minimum {} needed for attribution",
            thresholds.min_subs_recommendation
        ));
    }
    if total_subs < thresholds.min_subs_confident {
        notes.push(format!(
            "Sample below {}; all recommendations are hypotheses",
            thresholds.min_subs_confident
        ));
    }
    if period_days < 14 {
        notes.push(format!(
            "Short analysis period ({period_days} days); consider 30+ days for stability"
        ));
    }
    if baseline_is_default {
        notes.push("Baseline fell back to defaults; expected counts are estimates".to_string());
    }
    if insufficient_count > 0 {
        notes.push(format!(
            "{insufficient_count} content type(s) have insufficient data"
        ));
    }
    if category_count < 3 {
        notes.push("Consider testing more content types for comparison".to_string());
    }

    notes
}
