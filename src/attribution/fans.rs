// Weighted fan attribution — probabilistic credit split per subscriber.
//
// Each unattributed fan is resolved through three paths, in order:
//   1. Referral link with a category hint: deterministic, confidence 0.95.
//   2. Weighted window: split credit by each category's share of view gain
//      in the hours before acquisition; confidence scales with how
//      concentrated the winning share is (0.3 - 0.8).
//   3. Neither: the fan stays unattributed.
//
// The whole pass is deterministic and idempotent: the same inputs always
// produce the same weights and the same primary category, and fans that
// already carry a category are never touched.

use std::collections::BTreeMap;

use anyhow::anyhow;
use chrono::Duration;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::db::models::AttributionMethod;
use crate::error::EngineError;

use super::engine::AttributionEngine;

/// Per-method counts from one attribution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanAttributionStats {
    pub referral_link: u32,
    pub weighted_window: u32,
    pub no_data: u32,
    /// Weight ties resolved by ascending category name.
    pub ties_broken: u32,
}

impl AttributionEngine {
    /// Attribute every fan of `creator_id` that lacks a category.
    ///
    /// `window_hours` overrides the creator's configured attribution
    /// window (default 48h).
    pub async fn attribute_fans(
        &self,
        creator_id: &str,
        window_hours: Option<i64>,
    ) -> Result<FanAttributionStats, EngineError> {
        let creator = self
            .db
            .get_creator(creator_id)
            .await?
            .ok_or_else(|| EngineError::Persistence(anyhow!("unknown creator {creator_id}")))?;
        let window_hours = window_hours.unwrap_or(creator.optimal_attribution_window_hours);

        let fans = self.db.list_unattributed_fans(creator_id).await?;
        let mut stats = FanAttributionStats::default();

        let pb = ProgressBar::new(fans.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  Attributing [{bar:30}] {pos}/{len} ({eta})")
                .unwrap(),
        );

        for fan in &fans {
            // Path 1: referral link with a category hint
            if let Some(link_id) = &fan.referral_link_id {
                if let Some(link) = self.db.get_referral_link(link_id).await? {
                    if let Some(hint) = &link.category_hint {
                        let category = self.config().taxonomy.normalize(Some(hint));
                        let mut weights = BTreeMap::new();
                        weights.insert(category.clone(), 1.0);
                        self.db
                            .update_fan_attribution(
                                &fan.id,
                                &category,
                                AttributionMethod::ReferralLink.as_str(),
                                0.95,
                                &weights,
                            )
                            .await?;
                        stats.referral_link += 1;
                        pb.inc(1);
                        continue;
                    }
                }
            }

            // Path 2: weighted split over the pre-acquisition window
            let window_start = fan.acquired_at - Duration::hours(window_hours);
            let deltas = self
                .snapshots
                .delta_per_category(
                    creator_id,
                    window_start,
                    fan.acquired_at,
                    &self.config().taxonomy,
                )
                .await?;

            let total_views: i64 = deltas.values().map(|d| d.views_delta).sum();
            if total_views <= 0 {
                debug!(fan_id = fan.id, "no view movement in window, skipping");
                stats.no_data += 1;
                pb.inc(1);
                continue;
            }

            let mut weights = BTreeMap::new();
            for (category, delta) in &deltas {
                if delta.views_delta > 0 {
                    weights.insert(
                        category.clone(),
                        delta.views_delta as f64 / total_views as f64,
                    );
                }
            }

            let (primary, max_weight, tied) = pick_primary(&weights);
            if tied {
                stats.ties_broken += 1;
            }

            let confidence = 0.3 + max_weight * 0.5;
            self.db
                .update_fan_attribution(
                    &fan.id,
                    &primary,
                    AttributionMethod::WeightedWindow.as_str(),
                    confidence,
                    &weights,
                )
                .await?;
            stats.weighted_window += 1;
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!(
            creator_id,
            referral = stats.referral_link,
            weighted = stats.weighted_window,
            no_data = stats.no_data,
            "fan attribution pass complete"
        );

        Ok(stats)
    }
}

/// The highest-weight category. Ties resolve to the first in ascending
/// name order (BTreeMap iteration order), reported via the bool.
fn pick_primary(weights: &BTreeMap<String, f64>) -> (String, f64, bool) {
    let mut primary = String::new();
    let mut max_weight = f64::MIN;
    let mut tie_count = 0u32;

    for (category, weight) in weights {
        if *weight > max_weight {
            primary = category.clone();
            max_weight = *weight;
            tie_count = 1;
        } else if *weight == max_weight {
            tie_count += 1;
        }
    }

    (primary, max_weight, tie_count > 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs
            .iter()
            .map(|(name, w)| (name.to_string(), *w))
            .collect()
    }

    #[test]
    fn primary_is_argmax() {
        let (primary, max, tied) =
            pick_primary(&weights(&[("storytime", 0.6), ("grwm", 0.4)]));
        assert_eq!(primary, "storytime");
        assert!((max - 0.6).abs() < f64::EPSILON);
        assert!(!tied);
    }

    #[test]
    fn exact_tie_resolves_to_ascending_name() {
        let (primary, _, tied) =
            pick_primary(&weights(&[("thirst_trap", 0.5), ("grwm", 0.5)]));
        assert_eq!(primary, "grwm");
        assert!(tied);
    }

    #[test]
    fn confidence_range_matches_weight_concentration() {
        // Fully concentrated weight -> 0.3 + 0.5 = 0.8
        let (_, max, _) = pick_primary(&weights(&[("storytime", 1.0)]));
        assert!((0.3 + max * 0.5 - 0.8).abs() < 1e-9);
        // Perfectly split across four -> 0.3 + 0.125 = 0.425
        let (_, max, _) = pick_primary(&weights(&[
            ("a", 0.25),
            ("b", 0.25),
            ("c", 0.25),
            ("d", 0.25),
        ]));
        assert!((0.3 + max * 0.5 - 0.425).abs() < 1e-9);
    }
}
