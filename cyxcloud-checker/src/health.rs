//! Health calculator
//!
//! Turns a piece classification into a single health score used to
//! rank segments and to estimate time-to-irreparability. Pure
//! arithmetic; no I/O, no allocation on the hot path.

use tracing::warn;

/// How the health score is derived from the retrievable-piece count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthMode {
    /// Binomial probability of losing reconstructability before the
    /// next scan, given `per_iteration_failure_prob`.
    Probability,
    /// `healthy_count - k`: a simple ordinal, not a probability. Can be
    /// negative (already below threshold) or exceed 1 (well above it).
    Normalized,
}

/// Inputs to a single health calculation.
#[derive(Debug, Clone, Copy)]
pub struct HealthInputs {
    pub healthy_count: usize,
    pub retrievable_count: usize,
    pub k: u16,
    pub total_nodes: usize,
    pub per_iteration_failure_prob: f64,
    pub forcing_count: usize,
}

/// Result of a health calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthResult {
    /// Health score; higher is healthier. Range depends on `HealthMode`:
    /// `Probability` is in `[0, 1]`, `Normalized` is an unbounded ordinal.
    pub score: f64,
    /// Estimated whole iterations until the segment becomes
    /// irreparable (retrievable count drops below k) at the current
    /// per-iteration attrition rate. `None` when the segment is
    /// already irreparable or attrition is zero (never, at this rate).
    pub iterations_until_irreparable: Option<u64>,
}

/// Computes a health score and an irreparability horizon.
///
/// `forcing_count` pieces are excluded from the retrievable count
/// before scoring, since a forced-repair piece is not a dependable
/// source for reconstruction even though the node answered.
pub fn calculate(mode: HealthMode, inputs: HealthInputs) -> HealthResult {
    let k = inputs.k as f64;
    let usable = inputs.retrievable_count.saturating_sub(inputs.forcing_count) as f64;

    let score = match mode {
        HealthMode::Probability => probability_score(usable, k, inputs.per_iteration_failure_prob),
        HealthMode::Normalized => normalized_score(inputs.healthy_count, inputs.k),
    };

    let score = clamp_finite(score);

    let iterations_until_irreparable =
        estimate_iterations_until_irreparable(usable, k, inputs.per_iteration_failure_prob);

    HealthResult {
        score,
        iterations_until_irreparable,
    }
}

fn probability_score(usable: f64, k: f64, failure_prob: f64) -> f64 {
    if usable <= k {
        return 0.0;
    }
    let margin = usable - k;
    // Probability that at least `margin + 1` of the usable pieces fail
    // before the segment drops below k, approximated as independent
    // per-piece failure at `failure_prob` (binomial tail upper bound
    // via union bound, cheap and monotonic in margin).
    let survive = (1.0 - failure_prob).powf(margin);
    survive
}

fn normalized_score(healthy_count: usize, k: u16) -> f64 {
    healthy_count as f64 - k as f64
}

fn estimate_iterations_until_irreparable(usable: f64, k: f64, failure_prob: f64) -> Option<u64> {
    if usable <= k {
        return None;
    }
    if failure_prob <= 0.0 || !failure_prob.is_finite() {
        return None;
    }
    let margin = usable - k;
    // Expected iterations for `margin` independent failures at
    // `failure_prob` per iteration, i.e. margin / failure_prob,
    // rounded down to a whole iteration count.
    let estimate = margin / failure_prob;
    if !estimate.is_finite() || estimate < 0.0 {
        return None;
    }
    Some(estimate.floor() as u64)
}

/// Guards against NaN/infinite scores; does not otherwise constrain
/// the range, since `Normalized` is a signed, unbounded ordinal.
fn clamp_finite(value: f64) -> f64 {
    if value.is_nan() {
        warn!("health score computed as NaN, clamping to 0.0");
        return 0.0;
    }
    if value.is_infinite() {
        warn!(value, "health score computed as infinite, clamping");
        return if value > 0.0 { f64::MAX } else { f64::MIN };
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(retrievable: usize, k: u16, total: usize, prob: f64, forcing: usize) -> HealthInputs {
        HealthInputs {
            healthy_count: retrievable,
            retrievable_count: retrievable,
            k,
            total_nodes: total,
            per_iteration_failure_prob: prob,
            forcing_count: forcing,
        }
    }

    #[test]
    fn test_normalized_full_health() {
        let r = calculate(HealthMode::Normalized, inputs(5, 2, 10, 0.01, 0));
        assert_eq!(r.score, 3.0);
    }

    #[test]
    fn test_normalized_at_threshold_is_zero() {
        let r = calculate(HealthMode::Normalized, inputs(2, 2, 10, 0.01, 0));
        assert_eq!(r.score, 0.0);
        assert_eq!(r.iterations_until_irreparable, None);
    }

    #[test]
    fn test_normalized_below_threshold_is_negative() {
        let r = calculate(HealthMode::Normalized, inputs(5, 10, 10, 0.01, 0));
        assert_eq!(r.score, -5.0);
    }

    #[test]
    fn test_probability_mode_monotonic_in_margin() {
        let low_margin = calculate(HealthMode::Probability, inputs(3, 2, 10, 0.05, 0));
        let high_margin = calculate(HealthMode::Probability, inputs(8, 2, 10, 0.05, 0));
        assert!(high_margin.score > low_margin.score);
    }

    #[test]
    fn test_forcing_pieces_excluded_from_probability_score() {
        // Normalized mode is healthy_count - k and ignores forcing_count
        // entirely; forcing only pulls down the retrievable-based
        // Probability score (and the irreparability horizon).
        let with_forcing = calculate(HealthMode::Probability, inputs(5, 2, 10, 0.1, 2));
        let without_forcing = calculate(HealthMode::Probability, inputs(5, 2, 10, 0.1, 0));
        assert!(with_forcing.score < without_forcing.score);
    }

    #[test]
    fn test_nan_guard_clamps_to_zero() {
        assert_eq!(clamp_finite(f64::NAN), 0.0);
    }

    #[test]
    fn test_infinite_guard_clamps() {
        assert_eq!(clamp_finite(f64::INFINITY), f64::MAX);
        assert_eq!(clamp_finite(f64::NEG_INFINITY), f64::MIN);
    }

    #[test]
    fn test_iterations_until_irreparable_zero_failure_rate() {
        let r = calculate(HealthMode::Normalized, inputs(5, 2, 10, 0.0, 0));
        assert_eq!(r.iterations_until_irreparable, None);
    }

    #[test]
    fn test_iterations_until_irreparable_estimate() {
        let r = calculate(HealthMode::Normalized, inputs(5, 2, 10, 0.5, 0));
        // margin = 3, failure_prob = 0.5 => 6 iterations
        assert_eq!(r.iterations_until_irreparable, Some(6));
    }
}
