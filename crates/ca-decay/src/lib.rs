#![forbid(unsafe_code)]

//! Temporal decay of [`Opinion`]s toward vacuity as evidence ages.
//!
//! Decay preserves the belief/disbelief ratio (the *direction* of the
//! evidence is unchanged) while monotonically increasing uncertainty —
//! modeling the natural shelf life of an assertion.

use ca_types::Opinion;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum DecayError {
    #[error("elapsed must be non-negative, got: {0}")]
    NegativeElapsed(f64),
    #[error("half_life must be positive, got: {0}")]
    NonPositiveHalfLife(f64),
    #[error("decay factor must be in [0, 1], got: {0}")]
    FactorOutOfRange(f64),
}

/// A pluggable decay function `(elapsed, half_life) -> factor ∈ [0, 1]`.
///
/// Implemented for built-in decay shapes below, and blanket-implemented
/// for any `Fn(f64, f64) -> f64` closure so callers can plug in custom
/// curves without implementing a trait.
pub trait DecayFn {
    fn factor(&self, elapsed: f64, half_life: f64) -> f64;

    fn label(&self) -> &str {
        "custom"
    }
}

impl<F> DecayFn for F
where
    F: Fn(f64, f64) -> f64,
{
    fn factor(&self, elapsed: f64, half_life: f64) -> f64 {
        self(elapsed, half_life)
    }
}

/// λ(t, τ) = 2^(−t/τ). Default decay shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exponential;

impl DecayFn for Exponential {
    fn factor(&self, elapsed: f64, half_life: f64) -> f64 {
        exponential_decay(elapsed, half_life)
    }

    fn label(&self) -> &str {
        "exponential"
    }
}

/// λ(t, τ) = max(0, 1 − t/(2τ)). Reaches zero at t = 2τ.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linear;

impl DecayFn for Linear {
    fn factor(&self, elapsed: f64, half_life: f64) -> f64 {
        linear_decay(elapsed, half_life)
    }

    fn label(&self) -> &str {
        "linear"
    }
}

/// λ(t, τ) = 1 if t < τ, else 0. Evidence is fresh or fully stale.
#[derive(Debug, Clone, Copy, Default)]
pub struct Step;

impl DecayFn for Step {
    fn factor(&self, elapsed: f64, half_life: f64) -> f64 {
        step_decay(elapsed, half_life)
    }

    fn label(&self) -> &str {
        "step"
    }
}

#[must_use]
pub fn exponential_decay(elapsed: f64, half_life: f64) -> f64 {
    2f64.powf(-elapsed / half_life)
}

#[must_use]
pub fn linear_decay(elapsed: f64, half_life: f64) -> f64 {
    (1.0 - elapsed / (2.0 * half_life)).max(0.0)
}

#[must_use]
pub fn step_decay(elapsed: f64, half_life: f64) -> f64 {
    if elapsed < half_life {
        1.0
    } else {
        0.0
    }
}

/// Decay an opinion using the default exponential decay shape.
pub fn decay_opinion(opinion: Opinion, elapsed: f64, half_life: f64) -> Result<Opinion, DecayError> {
    decay_opinion_with(opinion, elapsed, half_life, &Exponential)
}

/// Decay an opinion using a caller-supplied decay shape.
///
/// `factor = decay_fn(elapsed, half_life)` scales belief and disbelief;
/// the mass they lose becomes uncertainty, so additivity is preserved
/// for any factor in `[0, 1]`:
///
///     b' = b · factor
///     d' = d · factor
///     u' = 1 − factor·(b + d) = 1 − factor·(1 − u)
pub fn decay_opinion_with<D: DecayFn>(
    opinion: Opinion,
    elapsed: f64,
    half_life: f64,
    decay_fn: &D,
) -> Result<Opinion, DecayError> {
    if elapsed < 0.0 {
        return Err(DecayError::NegativeElapsed(elapsed));
    }
    if half_life <= 0.0 {
        return Err(DecayError::NonPositiveHalfLife(half_life));
    }

    let factor = decay_fn.factor(elapsed, half_life);
    if !(0.0..=1.0).contains(&factor) {
        return Err(DecayError::FactorOutOfRange(factor));
    }

    let b = opinion.belief() * factor;
    let d = opinion.disbelief() * factor;
    let u = 1.0 - factor * (opinion.belief() + opinion.disbelief());

    // Clamp for floating-point safety at the u≈0/u≈1 boundaries.
    let u = u.clamp(0.0, 1.0);

    Opinion::new(b, d, u, opinion.base_rate()).map_err(|_| DecayError::FactorOutOfRange(factor))
}

#[cfg(test)]
mod tests {
    use ca_types::Opinion;

    use super::{
        Linear, Step, decay_opinion, decay_opinion_with, exponential_decay, linear_decay,
        step_decay,
    };

    #[test]
    fn exponential_decay_halves_at_half_life() {
        assert!((exponential_decay(10.0, 10.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn linear_decay_reaches_zero_at_twice_half_life() {
        assert_eq!(linear_decay(20.0, 10.0), 0.0);
        assert_eq!(linear_decay(100.0, 10.0), 0.0);
    }

    #[test]
    fn step_decay_is_binary() {
        assert_eq!(step_decay(5.0, 10.0), 1.0);
        assert_eq!(step_decay(10.0, 10.0), 0.0);
    }

    #[test]
    fn zero_elapsed_is_identity() {
        let o = Opinion::new(0.7, 0.2, 0.1, 0.5).unwrap();
        let result = decay_opinion(o, 0.0, 10.0).unwrap();
        assert!((result.belief() - o.belief()).abs() < 1e-12);
        assert!((result.uncertainty() - o.uncertainty()).abs() < 1e-12);
    }

    #[test]
    fn half_life_halves_belief_and_disbelief() {
        let o = Opinion::new(0.8, 0.1, 0.1, 0.5).unwrap();
        let result = decay_opinion(o, 10.0, 10.0).unwrap();
        assert!((result.belief() - 0.4).abs() < 1e-9);
        assert!((result.disbelief() - 0.05).abs() < 1e-9);
        assert!((result.uncertainty() - 0.55).abs() < 1e-9);
    }

    #[test]
    fn belief_disbelief_ratio_is_preserved() {
        let o = Opinion::new(0.6, 0.3, 0.1, 0.5).unwrap();
        let ratio = o.belief() / o.disbelief();
        let result = decay_opinion(o, 5.0, 10.0).unwrap();
        let new_ratio = result.belief() / result.disbelief();
        assert!((ratio - new_ratio).abs() < 1e-9);
    }

    #[test]
    fn very_large_elapsed_approaches_vacuous() {
        let o = Opinion::new(0.9, 0.05, 0.05, 0.5).unwrap();
        let result = decay_opinion(o, 10000.0, 10.0).unwrap();
        assert!(result.belief() < 1e-10);
        assert!((result.uncertainty() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn custom_closure_decay_fn() {
        let always_half = |_elapsed: f64, _half_life: f64| 0.5;
        let o = Opinion::new(0.8, 0.1, 0.1, 0.5).unwrap();
        let result = decay_opinion_with(o, 999.0, 1.0, &always_half).unwrap();
        assert!((result.belief() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn built_in_linear_and_step_usable_as_decay_fn() {
        let o = Opinion::new(0.8, 0.1, 0.1, 0.5).unwrap();
        let linear = decay_opinion_with(o, 10.0, 10.0, &Linear).unwrap();
        assert!((linear.belief() - 0.4).abs() < 1e-9);

        let step_before = decay_opinion_with(o, 5.0, 10.0, &Step).unwrap();
        assert!((step_before.belief() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn negative_elapsed_rejected() {
        let o = Opinion::new(0.5, 0.3, 0.2, 0.5).unwrap();
        assert!(decay_opinion(o, -1.0, 10.0).is_err());
    }

    #[test]
    fn nonpositive_half_life_rejected() {
        let o = Opinion::new(0.5, 0.3, 0.2, 0.5).unwrap();
        assert!(decay_opinion(o, 5.0, 0.0).is_err());
    }

    #[test]
    fn decay_fn_returning_out_of_range_factor_rejected() {
        let o = Opinion::new(0.5, 0.3, 0.2, 0.5).unwrap();
        let bad = |_elapsed: f64, _half_life: f64| 1.5;
        assert!(decay_opinion_with(o, 5.0, 10.0, &bad).is_err());
    }
}
