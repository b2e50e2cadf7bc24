// Exact two-sided Poisson test.
//
// Small self-contained implementation: the CDF is a sum of PMF terms
// computed in log space (running log-factorial), which stays stable for
// the event counts this engine sees (typically under a few hundred).

/// P(X <= k) for X ~ Poisson(lambda). Requires lambda > 0.
pub fn poisson_cdf(k: u64, lambda: f64) -> f64 {
    let ln_lambda = lambda.ln();
    let mut ln_factorial = 0.0;
    let mut total = 0.0;
    for i in 0..=k {
        if i > 0 {
            ln_factorial += (i as f64).ln();
        }
        total += (i as f64 * ln_lambda - lambda - ln_factorial).exp();
    }
    total.min(1.0)
}

/// Two-sided exact test of H0: `observed` was drawn from Poisson(`expected`).
///
/// Doubles the smaller tail, capped at 1.0. Returns 1.0 when the expected
/// rate is not positive (no evidence either way).
pub fn two_sided_p(observed: u64, expected: f64) -> f64 {
    if expected <= 0.0 {
        return 1.0;
    }

    if observed as f64 >= expected {
        // P(X >= observed)
        let p_upper = if observed == 0 {
            1.0
        } else {
            1.0 - poisson_cdf(observed - 1, expected)
        };
        2.0 * p_upper.min(0.5)
    } else {
        // P(X <= observed)
        let p_lower = poisson_cdf(observed, expected);
        2.0 * p_lower.min(0.5)
    }
}
