// BaselineBuilder — expected-rate models from pre-window history.
//
// The baseline answers "how many subs would this creator have gained anyway?"
// It is built from a lookback window that ends strictly at the analysis
// window's start, so in-window activity can never contaminate its own
// expectation. All view figures are deltas, never cumulative counters.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::Database;
use crate::error::EngineError;
use crate::snapshots::SnapshotStore;
use crate::taxonomy::Taxonomy;

/// Default lookback when no per-creator override is configured.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 14;

/// Fewer daily rollups than this and the baseline falls back to
/// conservative defaults.
const MIN_DATA_DAYS: u32 = 3;

/// Conservative defaults used when history is too thin to trust.
const DEFAULT_SUBS_PER_DAY: f64 = 5.0;
const DEFAULT_REV_PER_DAY: f64 = 100.0;
const DEFAULT_SUBS_PER_1K_VIEWS: f64 = 0.2;

/// Expected daily rates for a creator, with day-of-week adjustment factors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub subs_per_day: f64,
    pub rev_per_day: f64,
    pub subs_per_1k_delta_views: f64,
    /// Calendar days in the lookback that had any sub or revenue activity.
    pub data_days: u32,
    /// True when the rates are conservative defaults, not measurements.
    /// Callers must downgrade confidence when set.
    pub is_default: bool,
    /// Multiplier per weekday, Monday-indexed. Missing weekdays are 1.0.
    pub dow_factors: [f64; 7],
}

impl Baseline {
    fn default_rates(data_days: u32) -> Self {
        Self {
            subs_per_day: DEFAULT_SUBS_PER_DAY,
            rev_per_day: DEFAULT_REV_PER_DAY,
            subs_per_1k_delta_views: DEFAULT_SUBS_PER_1K_VIEWS,
            data_days,
            is_default: true,
            dow_factors: [1.0; 7],
        }
    }
}

/// Builds per-creator baselines from a lookback ending strictly at
/// `baseline_end`.
pub struct BaselineBuilder {
    db: Arc<dyn Database>,
    snapshots: SnapshotStore,
    lookback_days: u32,
}

impl BaselineBuilder {
    pub fn new(db: Arc<dyn Database>, lookback_days: u32) -> Self {
        Self {
            snapshots: SnapshotStore::new(db.clone()),
            db,
            lookback_days,
        }
    }

    /// Build a baseline from [baseline_end - lookback, baseline_end).
    /// Nothing at or after `baseline_end` is ever read.
    pub async fn build(
        &self,
        creator_id: &str,
        baseline_end: DateTime<Utc>,
        taxonomy: &Taxonomy,
    ) -> Result<Baseline, EngineError> {
        let baseline_start = baseline_end - Duration::days(self.lookback_days as i64);

        let sub_days = self
            .db
            .fans_per_day(creator_id, baseline_start, baseline_end)
            .await?;
        let rev_days = self
            .db
            .revenue_per_day(creator_id, baseline_start, baseline_end)
            .await?;

        // Daily rollups: day -> (subs, revenue)
        let mut rollups: BTreeMap<String, (i64, f64)> = BTreeMap::new();
        for (day, subs) in sub_days {
            rollups.entry(day).or_insert((0, 0.0)).0 = subs;
        }
        for (day, revenue) in rev_days {
            rollups.entry(day).or_insert((0, 0.0)).1 = revenue;
        }

        let data_days = rollups.len() as u32;
        if data_days < MIN_DATA_DAYS {
            debug!(creator_id, data_days, "thin history, default baseline");
            return Ok(Baseline::default_rates(data_days));
        }

        let total_subs: i64 = rollups.values().map(|(s, _)| s).sum();
        let total_revenue: f64 = rollups.values().map(|(_, r)| r).sum();
        let subs_per_day = total_subs as f64 / data_days as f64;
        let rev_per_day = total_revenue / data_days as f64;

        // Day-of-week factors: mean subs on each weekday over the overall mean
        let mut wd_totals = [0i64; 7];
        let mut wd_counts = [0u32; 7];
        for (day, (subs, _)) in &rollups {
            if let Ok(date) = NaiveDate::parse_from_str(day, "%Y-%m-%d") {
                let idx = date.weekday().num_days_from_monday() as usize;
                wd_totals[idx] += subs;
                wd_counts[idx] += 1;
            }
        }
        let mut dow_factors = [1.0; 7];
        if subs_per_day > 0.0 {
            for d in 0..7 {
                if wd_counts[d] > 0 {
                    let wd_mean = wd_totals[d] as f64 / wd_counts[d] as f64;
                    dow_factors[d] = wd_mean / subs_per_day;
                }
            }
        }

        // Delta views over the whole lookback, for the subs-per-1k rate
        let by_category = self
            .snapshots
            .delta_per_category(creator_id, baseline_start, baseline_end, taxonomy)
            .await?;
        let total_delta_views: i64 = by_category.values().map(|c| c.views_delta).sum();
        let subs_per_1k_delta_views = if total_delta_views > 0 {
            total_subs as f64 / (total_delta_views as f64 / 1000.0)
        } else {
            0.0
        };

        Ok(Baseline {
            subs_per_day,
            rev_per_day,
            subs_per_1k_delta_views,
            data_days,
            is_default: false,
            dow_factors,
        })
    }
}

/// Window length in hours, floored at 1. Computing in hours (not truncated
/// days) keeps sub-24h windows from collapsing to zero.
pub fn window_hours(w_start: DateTime<Utc>, w_end: DateTime<Utc>) -> f64 {
    let hours = (w_end - w_start).num_seconds() as f64 / 3600.0;
    hours.max(1.0)
}

/// Expected subscriber count over [w_start, w_end), day-of-week adjusted.
pub fn expected_subs(baseline: &Baseline, w_start: DateTime<Utc>, w_end: DateTime<Utc>) -> f64 {
    expected_over(baseline.subs_per_day, &baseline.dow_factors, w_start, w_end)
}

/// Expected revenue over [w_start, w_end), day-of-week adjusted.
pub fn expected_revenue(baseline: &Baseline, w_start: DateTime<Utc>, w_end: DateTime<Utc>) -> f64 {
    expected_over(baseline.rev_per_day, &baseline.dow_factors, w_start, w_end)
}

/// Partition the window into contiguous calendar-day slices; each slice of
/// h hours on weekday d contributes `per_day * h/24 * dow[d]`.
fn expected_over(
    per_day: f64,
    dow_factors: &[f64; 7],
    w_start: DateTime<Utc>,
    w_end: DateTime<Utc>,
) -> f64 {
    // Floor at one hour so degenerate windows still produce an expectation
    let end = if w_end - w_start < Duration::hours(1) {
        w_start + Duration::hours(1)
    } else {
        w_end
    };

    let mut total = 0.0;
    let mut cur = w_start;
    while cur < end {
        let next_midnight = (cur.date_naive() + Duration::days(1))
            .and_time(NaiveTime::MIN)
            .and_utc();
        let slice_end = next_midnight.min(end);
        let hours = (slice_end - cur).num_seconds() as f64 / 3600.0;
        let d = cur.weekday().num_days_from_monday() as usize;
        total += per_day * (hours / 24.0) * dow_factors[d];
        cur = slice_end;
    }
    total
}
