// ConfidenceScorer — bounds the strength of any claim by the evidence.
//
// Confidence is driven by the number of EVENTS (subs), not posts: a creator
// can publish daily and still have too few conversions to say anything.
// The score is additive from a 0.5 base, clamped to [0.1, 0.95], and every
// adjustment leaves a human-readable reason so the report can explain
// itself.

pub mod poisson;

use serde::{Deserialize, Serialize};

/// Event-count and baseline thresholds. Overridable per creator for
/// calibration; the defaults are deliberately conservative.
#[derive(Debug, Clone, Copy)]
pub struct ScorerThresholds {
    /// Minimum subs before any recommendation may be emitted (hard gate).
    pub min_subs_recommendation: u64,
    /// Minimum subs for the "confident" tier.
    pub min_subs_confident: u64,
    /// Minimum baseline days before the baseline is trusted.
    pub min_baseline_days: u32,
}

impl Default for ScorerThresholds {
    fn default() -> Self {
        Self {
            min_subs_recommendation: 10,
            min_subs_confident: 25,
            min_baseline_days: 7,
        }
    }
}

/// Confidence level buckets derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            ConfidenceLevel::High
        } else if score >= 0.4 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of confidence scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceResult {
    /// Bounded score in [0.1, 0.95].
    pub score: f64,
    pub level: ConfidenceLevel,
    pub reasons: Vec<String>,
    /// Hard gate: false means no recommendation may be emitted at all,
    /// regardless of the score.
    pub min_events_met: bool,
}

/// Computes confidence scores for attribution claims.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer {
    thresholds: ScorerThresholds,
}

/// The Poisson test is skipped below this event count; the asymptotics are
/// meaningless on a handful of events.
const MIN_EVENTS_FOR_TEST: u64 = 5;

impl ConfidenceScorer {
    pub fn new(thresholds: ScorerThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ScorerThresholds {
        &self.thresholds
    }

    /// Score confidence in an attribution claim.
    pub fn score(
        &self,
        actual_events: u64,
        expected_events: f64,
        window_hours: f64,
        has_confounders: bool,
        baseline_data_days: u32,
    ) -> ConfidenceResult {
        let t = &self.thresholds;
        let mut reasons = Vec::new();
        let mut score: f64 = 0.5;
        let min_events_met;

        // 1. Event count thresholds (most important)
        if actual_events < t.min_subs_recommendation {
            reasons.push(format!(
                "Low sample: only {actual_events} subs (need {}+)",
                t.min_subs_recommendation
            ));
            score -= 0.3;
            min_events_met = false;
        } else if actual_events < t.min_subs_confident {
            reasons.push(format!("Moderate sample: {actual_events} subs"));
            min_events_met = true;
        } else {
            reasons.push(format!("Good sample: {actual_events} subs"));
            score += 0.15;
            min_events_met = true;
        }

        // 2. Statistical significance of the lift vs baseline
        if expected_events > 0.0 && actual_events >= MIN_EVENTS_FOR_TEST {
            let p_value = poisson::two_sided_p(actual_events, expected_events);
            if p_value < 0.05 {
                reasons.push("Lift is statistically significant (p < 0.05)".to_string());
                score += 0.2;
            } else if p_value < 0.10 {
                reasons.push("Lift is marginally significant (p < 0.10)".to_string());
                score += 0.1;
            } else {
                reasons.push(format!("Lift not significant (p = {p_value:.2})"));
                score -= 0.1;
            }
        }

        // 3. Baseline data quality
        if baseline_data_days < t.min_baseline_days {
            reasons.push(format!(
                "Limited baseline: {baseline_data_days} days (prefer {}+)",
                t.min_baseline_days
            ));
            score -= 0.15;
        } else if baseline_data_days >= 14 {
            score += 0.05;
        }

        // 4. Confounder penalty
        if has_confounders {
            reasons.push("Confounder event(s) overlap with window".to_string());
            score -= 0.2;
        }

        // 5. Window length sanity
        if window_hours < 24.0 {
            reasons.push("Short window (<24h) increases noise".to_string());
            score -= 0.1;
        }

        let score = score.clamp(0.1, 0.95);

        ConfidenceResult {
            score,
            level: ConfidenceLevel::from_score(score),
            reasons,
            min_events_met,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> ConfidenceScorer {
        ConfidenceScorer::default()
    }

    #[test]
    fn thin_sample_fails_the_hard_gate() {
        let result = scorer().score(3, 10.0, 168.0, false, 14);
        assert!(!result.min_events_met);
        assert!(result.reasons.iter().any(|r| r.contains("Low sample")));
        assert!(result.score < 0.4);
    }

    #[test]
    fn strong_lift_with_good_sample_scores_high() {
        // 60 observed vs 30 expected over 30 days, clean baseline
        let result = scorer().score(60, 30.0, 720.0, false, 21);
        assert!(result.min_events_met);
        assert!(result.score >= 0.7, "score was {}", result.score);
        assert_eq!(result.level, ConfidenceLevel::High);
        assert!(result
            .reasons
            .iter()
            .any(|r| r.contains("statistically significant")));
    }

    #[test]
    fn confounders_cost_two_tenths() {
        let clean = scorer().score(60, 30.0, 720.0, false, 21);
        let confounded = scorer().score(60, 30.0, 720.0, true, 21);
        assert!((clean.score - confounded.score - 0.2).abs() < 1e-9);
        assert!(confounded
            .reasons
            .iter()
            .any(|r| r.contains("Confounder")));
    }

    #[test]
    fn short_window_is_penalised() {
        let day = scorer().score(30, 28.0, 24.0, false, 14);
        let short = scorer().score(30, 28.0, 18.0, false, 14);
        assert!(short.score < day.score);
        assert!(short.reasons.iter().any(|r| r.contains("Short window")));
    }

    #[test]
    fn limited_baseline_is_penalised() {
        let good = scorer().score(30, 28.0, 720.0, false, 14);
        let thin = scorer().score(30, 28.0, 720.0, false, 4);
        assert!(thin.score < good.score);
        assert!(thin.reasons.iter().any(|r| r.contains("Limited baseline")));
    }

    #[test]
    fn no_lift_is_not_reported_significant() {
        // Actual matching expectation must not claim significance
        let result = scorer().score(30, 30.0, 720.0, false, 14);
        assert!(result
            .reasons
            .iter()
            .any(|r| r.contains("not significant")));
        assert!(!result
            .reasons
            .iter()
            .any(|r| r.contains("statistically significant (p < 0.05)")));
    }

    #[test]
    fn poisson_test_skipped_below_five_events() {
        // 4 events: no significance reason of any kind
        let result = scorer().score(4, 1.0, 720.0, false, 14);
        assert!(!result.reasons.iter().any(|r| r.contains("significant")));
    }

    #[test]
    fn score_is_clamped_to_bounds() {
        // Worst case: thin everything
        let worst = scorer().score(0, 10.0, 6.0, true, 0);
        assert!(worst.score >= 0.1);
        // Best case: strong everything
        let best = scorer().score(200, 50.0, 720.0, false, 21);
        assert!(best.score <= 0.95);
    }

    #[test]
    fn custom_thresholds_shift_the_gate() {
        let relaxed = ConfidenceScorer::new(ScorerThresholds {
            min_subs_recommendation: 5,
            min_subs_confident: 10,
            min_baseline_days: 3,
        });
        let result = relaxed.score(7, 5.0, 720.0, false, 14);
        assert!(result.min_events_met);
    }

    #[test]
    fn more_events_never_hurt_in_the_lift_regime() {
        // Monotone evidence: above the expectation and the test-activation
        // floor, one more sub can only raise (or hold) the score.
        let expected = 20.0;
        let mut prev = scorer().score(20, expected, 720.0, false, 14).score;
        for actual in 21..120u64 {
            let next = scorer().score(actual, expected, 720.0, false, 14).score;
            assert!(
                next >= prev - 1e-12,
                "score regressed at {actual}: {prev} -> {next}"
            );
            prev = next;
        }
    }
}
