//! Blend rules and convergence metric
//!
//! Both sides move only partway toward the other side's value each round:
//!
//! - Participant: `x' = (3·x + 2·c) / 5`
//! - Coordinator: `c' = (2·c + Σ xᵢ) / (N + 2)`, i.e. the prior aggregate
//!   counts twice as much as a single participant
//!
//! With N = 4 the coordinator rule is `(2·c + Σ xᵢ) / 6`.

/// Weight of the participant's own estimate
pub const LOCAL_WEIGHT: f64 = 3.0;

/// Weight of the broadcast aggregate in the participant blend
pub const CENTRAL_WEIGHT: f64 = 2.0;

/// Weight of the prior aggregate, in units of one participant
pub const AGGREGATE_WEIGHT: f64 = 2.0;

/// Default convergence tolerance
pub const DEFAULT_TOLERANCE: f64 = 1e-3;

/// Participant update rule
pub fn blend_estimate(local: f64, central: f64) -> f64 {
    (LOCAL_WEIGHT * local + CENTRAL_WEIGHT * central) / (LOCAL_WEIGHT + CENTRAL_WEIGHT)
}

/// Coordinator update rule
///
/// `values` are summed in slot order so the result is reproducible.
pub fn blend_aggregate(aggregate: f64, values: &[f64]) -> f64 {
    let sum = values.iter().fold(0.0, |acc, v| acc + v);
    (AGGREGATE_WEIGHT * aggregate + sum) / (AGGREGATE_WEIGHT + values.len() as f64)
}

/// Round-over-round change of one slot
///
/// A slot with no previous round has not converged.
pub fn slot_delta(current: f64, previous: Option<f64>) -> f64 {
    match previous {
        Some(prev) => (current - prev).abs(),
        None => f64::INFINITY,
    }
}

/// Largest per-slot change, or `None` while any slot lacks a previous value
///
/// A NaN change on any slot makes the result NaN.
pub fn max_delta<I>(pairs: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, Option<f64>)>,
{
    pairs.into_iter().try_fold(0.0f64, |max, (current, previous)| {
        previous.map(|prev| {
            let delta = (current - prev).abs();
            if max.is_nan() || delta.is_nan() {
                f64::NAN
            } else {
                max.max(delta)
            }
        })
    })
}

/// Convergence test: every slot moved strictly less than `tolerance`
///
/// NaN deltas never converge.
pub fn is_converged(max_delta: Option<f64>, tolerance: f64) -> bool {
    matches!(max_delta, Some(delta) if delta < tolerance)
}
