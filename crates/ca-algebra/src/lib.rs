#![forbid(unsafe_code)]

//! Subjective Logic operators over [`Opinion`] (Jøsang, 2016):
//! cumulative fusion (⊕), averaging fusion (⊘), trust discount (⊗),
//! deduction, pairwise conflict, the internal conflict metric, and a
//! Byzantine-resistant robust fusion built from the other four.

use ca_types::{Opinion, OpinionError};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum AlgebraError {
    #[error("{op} requires at least one opinion")]
    EmptyInput { op: &'static str },
    #[error(transparent)]
    Invalid(#[from] OpinionError),
}

/// Cumulative fusion (⊕) — combine independent evidence sources.
///
/// Per Jøsang 2016 §12.3. For two opinions with at least one non-dogmatic
/// (u > 0):
///
///     κ = u_A + u_B − u_A·u_B
///     b = (b_A·u_B + b_B·u_A) / κ
///     d = (d_A·u_B + d_B·u_A) / κ
///     u = u_A·u_B / κ
///
/// Both dogmatic (u_A = u_B = 0) takes the equal-weight limit: a simple
/// average with u = 0. N-ary fusion is a left-fold — cumulative fusion
/// is associative and commutative, so fold order does not matter.
pub fn cumulative_fuse(opinions: &[Opinion]) -> Result<Opinion, AlgebraError> {
    match opinions {
        [] => Err(AlgebraError::EmptyInput { op: "cumulative_fuse" }),
        [only] => Ok(*only),
        [first, rest @ ..] => {
            let mut result = *first;
            for next in rest {
                result = cumulative_fuse_pair(result, *next)?;
            }
            Ok(result)
        }
    }
}

fn cumulative_fuse_pair(a: Opinion, b: Opinion) -> Result<Opinion, AlgebraError> {
    let (u_a, u_b) = (a.uncertainty(), b.uncertainty());

    let (b_out, d_out, u_out) = if u_a == 0.0 && u_b == 0.0 {
        (
            0.5 * a.belief() + 0.5 * b.belief(),
            0.5 * a.disbelief() + 0.5 * b.disbelief(),
            0.0,
        )
    } else {
        let kappa = u_a + u_b - u_a * u_b;
        (
            (a.belief() * u_b + b.belief() * u_a) / kappa,
            (a.disbelief() * u_b + b.disbelief() * u_a) / kappa,
            (u_a * u_b) / kappa,
        )
    };

    let a_out = (a.base_rate() + b.base_rate()) / 2.0;
    Opinion::new(b_out, d_out, u_out, a_out).map_err(AlgebraError::from)
}

/// Averaging fusion (⊘) — combine dependent/correlated sources.
///
/// Per Jøsang 2016 §12.5. NOT associative for n ≥ 3: the simultaneous
/// n-ary formula must be used directly rather than pairwise-folded.
/// For n = 2 the pairwise and n-ary formulas coincide.
pub fn averaging_fuse(opinions: &[Opinion]) -> Result<Opinion, AlgebraError> {
    match opinions {
        [] => Err(AlgebraError::EmptyInput { op: "averaging_fuse" }),
        [only] => Ok(*only),
        [a, b] => averaging_fuse_pair(*a, *b),
        many => averaging_fuse_nary(many),
    }
}

fn averaging_fuse_pair(a: Opinion, b: Opinion) -> Result<Opinion, AlgebraError> {
    let (u_a, u_b) = (a.uncertainty(), b.uncertainty());

    let (b_out, d_out, u_out) = if u_a == 0.0 && u_b == 0.0 {
        ((a.belief() + b.belief()) / 2.0, (a.disbelief() + b.disbelief()) / 2.0, 0.0)
    } else {
        let kappa = u_a + u_b;
        if kappa == 0.0 {
            ((a.belief() + b.belief()) / 2.0, (a.disbelief() + b.disbelief()) / 2.0, 0.0)
        } else {
            (
                (a.belief() * u_b + b.belief() * u_a) / kappa,
                (a.disbelief() * u_b + b.disbelief() * u_a) / kappa,
                2.0 * u_a * u_b / kappa,
            )
        }
    };

    let a_out = (a.base_rate() + b.base_rate()) / 2.0;
    Opinion::new(b_out, d_out, u_out, a_out).map_err(AlgebraError::from)
}

/// Simultaneous n-ary averaging fusion for n ≥ 3 (Jøsang 2016, §12.5).
fn averaging_fuse_nary(opinions: &[Opinion]) -> Result<Opinion, AlgebraError> {
    let n = opinions.len();
    let uncertainties: Vec<f64> = opinions.iter().map(Opinion::uncertainty).collect();
    let full_product: f64 = uncertainties.iter().product();

    // U_i = ∏_{j≠i} u_j. When u_i = 0 this can't be derived from
    // full_product/u_i (division by zero), so compute it directly.
    let capital_u: Vec<f64> = uncertainties
        .iter()
        .enumerate()
        .map(|(i, &u_i)| {
            if u_i != 0.0 {
                full_product / u_i
            } else {
                uncertainties
                    .iter()
                    .enumerate()
                    .filter(|&(j, _)| j != i)
                    .map(|(_, &u_j)| u_j)
                    .product()
            }
        })
        .collect();

    let kappa: f64 = capital_u.iter().sum();

    let (b_out, d_out, u_out) = if kappa == 0.0 {
        // κ = 0 requires ≥ 2 dogmatic opinions. Their simple average,
        // under equal relative dogmatism, is the correct limit.
        let dogmatic: Vec<&Opinion> = opinions.iter().filter(|o| o.uncertainty() == 0.0).collect();
        let (pool, z): (Vec<&Opinion>, usize) = if dogmatic.is_empty() {
            (opinions.iter().collect(), n)
        } else {
            let z = dogmatic.len();
            (dogmatic, z)
        };
        let z = z as f64;
        (
            pool.iter().map(|o| o.belief()).sum::<f64>() / z,
            pool.iter().map(|o| o.disbelief()).sum::<f64>() / z,
            0.0,
        )
    } else {
        let b = opinions
            .iter()
            .zip(&capital_u)
            .map(|(o, u_i)| o.belief() * u_i)
            .sum::<f64>()
            / kappa;
        let d = opinions
            .iter()
            .zip(&capital_u)
            .map(|(o, u_i)| o.disbelief() * u_i)
            .sum::<f64>()
            / kappa;
        let u = n as f64 * full_product / kappa;
        (b, d, u)
    };

    let a_out = opinions.iter().map(Opinion::base_rate).sum::<f64>() / n as f64;
    Opinion::new(b_out, d_out, u_out, a_out).map_err(AlgebraError::from)
}

/// Trust discount (⊗) — propagate an opinion through a trust chain.
///
/// If A trusts B with opinion `trust` and B holds `opinion` about x,
/// A's derived opinion about x is:
///
///     b = trust.b · opinion.b
///     d = trust.b · opinion.d
///     u = trust.d + trust.u + trust.b · opinion.u
///
/// Full trust adopts B's opinion unchanged; zero trust yields vacuity.
pub fn trust_discount(trust: Opinion, opinion: Opinion) -> Result<Opinion, AlgebraError> {
    let b_trust = trust.belief();
    let b = b_trust * opinion.belief();
    let d = b_trust * opinion.disbelief();
    let u = trust.disbelief() + trust.uncertainty() + b_trust * opinion.uncertainty();
    Opinion::new(b, d, u, opinion.base_rate()).map_err(AlgebraError::from)
}

/// Deduction — the subjective-logic generalization of the law of total
/// probability: `P(y) = P(x)·P(y|x) + P(¬x)·P(y|¬x)` (Jøsang 2016, §12.6).
pub fn deduce(
    opinion_x: Opinion,
    opinion_y_given_x: Opinion,
    opinion_y_given_not_x: Opinion,
) -> Result<Opinion, AlgebraError> {
    let (b_x, d_x, u_x, a_x) = (
        opinion_x.belief(),
        opinion_x.disbelief(),
        opinion_x.uncertainty(),
        opinion_x.base_rate(),
    );
    let a_x_bar = 1.0 - a_x;
    let yx = opinion_y_given_x;
    let ynx = opinion_y_given_not_x;

    let b_y = b_x * yx.belief() + d_x * ynx.belief() + u_x * (a_x * yx.belief() + a_x_bar * ynx.belief());
    let d_y = b_x * yx.disbelief()
        + d_x * ynx.disbelief()
        + u_x * (a_x * yx.disbelief() + a_x_bar * ynx.disbelief());
    let u_y = b_x * yx.uncertainty()
        + d_x * ynx.uncertainty()
        + u_x * (a_x * yx.uncertainty() + a_x_bar * ynx.uncertainty());

    let p_y_given_x = yx.projected_probability();
    let p_y_given_not_x = ynx.projected_probability();
    let a_y = a_x * p_y_given_x + a_x_bar * p_y_given_not_x;

    Opinion::new(b_y, d_y, u_y, a_y).map_err(AlgebraError::from)
}

/// Jøsang's binary conflict measure: `con(A,B) = b_A·d_B + d_A·b_B`.
///
/// Zero when both opinions agree or either is vacuous; maximal (1.0)
/// when one fully believes and the other fully disbelieves.
#[must_use]
pub fn pairwise_conflict(a: Opinion, b: Opinion) -> f64 {
    a.belief() * b.disbelief() + a.disbelief() * b.belief()
}

/// Internal conflict/balance metric: `1 - |b - d| - u`.
///
/// Distinguishes genuine disagreement (high b AND high d at once) from
/// mere ignorance (high u) — two epistemic states a scalar confidence
/// cannot tell apart even when their projected probabilities coincide.
#[must_use]
pub fn conflict_metric(opinion: Opinion) -> f64 {
    1.0 - (opinion.belief() - opinion.disbelief()).abs() - opinion.uncertainty()
}

/// Default discord threshold above which an agent is considered rogue.
pub const DEFAULT_ROBUST_FUSE_THRESHOLD: f64 = 0.3;

/// Byzantine-resistant fusion via iterative highest-discord removal.
///
/// Repeatedly computes each remaining agent's mean pairwise conflict
/// against the others; if the worst exceeds `threshold`, that agent is
/// removed, up to `max_removals` (default: `floor(n/2)`, never removing
/// a majority) or until only two agents remain. The survivors are
/// combined via [`cumulative_fuse`].
///
/// Returns the fused opinion and the original indices removed, in the
/// order they were removed (not sorted).
pub fn robust_fuse(
    opinions: &[Opinion],
    threshold: Option<f64>,
    max_removals: Option<usize>,
) -> Result<(Opinion, Vec<usize>), AlgebraError> {
    let n = opinions.len();
    if n == 0 {
        return Err(AlgebraError::EmptyInput { op: "robust_fuse" });
    }
    if n == 1 {
        return Ok((opinions[0], Vec::new()));
    }

    let threshold = threshold.unwrap_or(DEFAULT_ROBUST_FUSE_THRESHOLD);
    let max_removals = max_removals.unwrap_or(n / 2);

    let mut remaining: Vec<usize> = (0..n).collect();
    let mut removed: Vec<usize> = Vec::new();

    while remaining.len() > 2 && removed.len() < max_removals {
        let (worst_idx, worst_score) = remaining
            .iter()
            .map(|&i| {
                let mean = remaining
                    .iter()
                    .filter(|&&j| j != i)
                    .map(|&j| pairwise_conflict(opinions[i], opinions[j]))
                    .sum::<f64>()
                    / (remaining.len() - 1) as f64;
                (i, mean)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).expect("discord scores are finite"))
            .expect("remaining is non-empty");

        if worst_score <= threshold {
            break;
        }

        remaining.retain(|&x| x != worst_idx);
        removed.push(worst_idx);
    }

    let survivors: Vec<Opinion> = remaining.iter().map(|&i| opinions[i]).collect();
    let fused = cumulative_fuse(&survivors)?;
    Ok((fused, removed))
}

#[cfg(test)]
mod tests {
    use ca_types::Opinion;

    use super::{conflict_metric, cumulative_fuse, deduce, pairwise_conflict, robust_fuse, trust_discount};

    fn op(b: f64, d: f64, u: f64) -> Opinion {
        Opinion::new(b, d, u, 0.5).unwrap()
    }

    #[test]
    fn cumulative_fuse_dogmatic_pair_is_average() {
        let a = op(0.9, 0.1, 0.0);
        let b = op(0.3, 0.7, 0.0);
        let fused = cumulative_fuse(&[a, b]).unwrap();
        assert!((fused.belief() - 0.6).abs() < 1e-12);
        assert_eq!(fused.uncertainty(), 0.0);
    }

    #[test]
    fn cumulative_fuse_reduces_uncertainty() {
        let a = op(0.5, 0.3, 0.2);
        let b = op(0.4, 0.2, 0.4);
        let fused = cumulative_fuse(&[a, b]).unwrap();
        assert!(fused.uncertainty() <= a.uncertainty().min(b.uncertainty()) + 1e-12);
    }

    #[test]
    fn averaging_fuse_nary_matches_pairwise_for_n_equals_two() {
        use super::averaging_fuse;
        let a = op(0.5, 0.2, 0.3);
        let b = op(0.3, 0.4, 0.3);
        let via_nary = averaging_fuse(&[a, b]).unwrap();
        let via_pair = super::averaging_fuse_pair(a, b).unwrap();
        assert!((via_nary.belief() - via_pair.belief()).abs() < 1e-12);
    }

    /// Conformance check for the dogmatic fallback: the n=2 pairwise path's
    /// kappa=0 limit (arithmetic mean of belief) agrees with the n-ary
    /// formula's dogmatic-subset-average limit when queried with an
    /// all-dogmatic input of either arity.
    #[test]
    fn averaging_fuse_dogmatic_limit_agrees_between_pair_and_nary_paths() {
        let a = op(0.9, 0.1, 0.0);
        let b = op(0.3, 0.7, 0.0);
        let via_pair = super::averaging_fuse_pair(a, b).unwrap();
        assert!((via_pair.belief() - 0.6).abs() < 1e-12);
        assert_eq!(via_pair.uncertainty(), 0.0);

        let c = op(0.4, 0.6, 0.0);
        let via_nary = super::averaging_fuse_nary(&[a, b, c]).unwrap();
        assert!((via_nary.belief() - (a.belief() + b.belief() + c.belief()) / 3.0).abs() < 1e-12);
        assert_eq!(via_nary.uncertainty(), 0.0);
    }

    #[test]
    fn averaging_fuse_is_idempotent() {
        use super::averaging_fuse;
        let a = op(0.6, 0.1, 0.3);
        let fused = averaging_fuse(&[a, a, a]).unwrap();
        assert!((fused.belief() - a.belief()).abs() < 1e-9);
        assert!((fused.disbelief() - a.disbelief()).abs() < 1e-9);
    }

    #[test]
    fn trust_discount_full_trust_is_identity() {
        let trust = op(1.0, 0.0, 0.0);
        let opinion = op(0.6, 0.3, 0.1);
        let discounted = trust_discount(trust, opinion).unwrap();
        assert!((discounted.belief() - opinion.belief()).abs() < 1e-12);
    }

    #[test]
    fn trust_discount_zero_trust_is_vacuous() {
        let trust = op(0.0, 1.0, 0.0);
        let opinion = op(0.6, 0.3, 0.1);
        let discounted = trust_discount(trust, opinion).unwrap();
        assert_eq!(discounted.belief(), 0.0);
        assert_eq!(discounted.uncertainty(), 1.0);
    }

    #[test]
    fn deduce_preserves_additivity() {
        let x = op(0.5, 0.3, 0.2);
        let y_given_x = op(0.9, 0.05, 0.05);
        let y_given_not_x = op(0.1, 0.8, 0.1);
        let y = deduce(x, y_given_x, y_given_not_x).unwrap();
        let total = y.belief() + y.disbelief() + y.uncertainty();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pairwise_conflict_symmetric() {
        let a = op(0.7, 0.2, 0.1);
        let b = op(0.3, 0.5, 0.2);
        assert!((pairwise_conflict(a, b) - pairwise_conflict(b, a)).abs() < 1e-12);
    }

    #[test]
    fn pairwise_conflict_fully_opposing_is_one() {
        let a = op(1.0, 0.0, 0.0);
        let b = op(0.0, 1.0, 0.0);
        assert_eq!(pairwise_conflict(a, b), 1.0);
    }

    #[test]
    fn pairwise_conflict_vacuous_is_zero() {
        let vacuous = Opinion::vacuous();
        let strong = op(0.9, 0.1, 0.0);
        assert!(pairwise_conflict(vacuous, strong).abs() < 1e-12);
    }

    #[test]
    fn conflict_metric_distinguishes_conflict_from_ignorance() {
        let conflict = op(0.5, 0.5, 0.0);
        let ignorance = Opinion::vacuous();
        assert!(conflict_metric(conflict) > 0.9);
        assert!(conflict_metric(ignorance) < 0.1);
    }

    #[test]
    fn conflict_metric_dogmatic_opinions_are_zero() {
        assert!(conflict_metric(op(1.0, 0.0, 0.0)).abs() < 1e-12);
        assert!(conflict_metric(op(0.0, 1.0, 0.0)).abs() < 1e-12);
    }

    #[test]
    fn robust_fuse_cohesive_group_removes_nothing() {
        let opinions = [op(0.8, 0.1, 0.1), op(0.7, 0.1, 0.2), op(0.9, 0.0, 0.1)];
        let (fused, removed) = robust_fuse(&opinions, None, None).unwrap();
        assert!(removed.is_empty());
        assert!(fused.belief() > 0.5);
    }

    #[test]
    fn robust_fuse_removes_single_rogue() {
        let honest = [op(0.8, 0.1, 0.1), op(0.7, 0.1, 0.2), op(0.9, 0.0, 0.1)];
        let rogue = op(0.0, 0.9, 0.1);
        let all = [honest[0], honest[1], honest[2], rogue];
        let (fused, removed) = robust_fuse(&all, None, None).unwrap();
        assert!(removed.contains(&3));
        assert!(fused.belief() > 0.5);
    }

    #[test]
    fn robust_fuse_removed_indices_are_in_removal_order_not_sorted() {
        let honest = [op(0.8, 0.1, 0.1), op(0.7, 0.1, 0.2), op(0.9, 0.0, 0.1)];
        // rogue_mild sits earlier in the input than rogue_extreme but is
        // less discordant, so it's removed second — the returned index
        // order should reflect that, not ascending index order.
        let rogue_mild = op(0.1, 0.85, 0.05);
        let rogue_extreme = op(0.0, 1.0, 0.0);
        let all = [honest[0], rogue_mild, honest[1], honest[2], rogue_extreme];
        let (_, removed) = robust_fuse(&all, Some(0.05), Some(2)).unwrap();
        assert_eq!(removed, vec![4, 1]);
    }

    #[test]
    fn robust_fuse_respects_max_removals() {
        let opinions = [
            op(0.8, 0.1, 0.1),
            op(0.0, 0.9, 0.1),
            op(0.0, 0.8, 0.2),
            op(0.0, 0.7, 0.3),
        ];
        let (_, removed) = robust_fuse(&opinions, None, Some(1)).unwrap();
        assert!(removed.len() <= 1);
    }

    #[test]
    fn robust_fuse_single_opinion_returned_unchanged() {
        let o = op(0.7, 0.2, 0.1);
        let (fused, removed) = robust_fuse(&[o], None, None).unwrap();
        assert_eq!(fused, o);
        assert!(removed.is_empty());
    }

    #[test]
    fn robust_fuse_two_opinions_never_removes() {
        let a = op(0.9, 0.0, 0.1);
        let b = op(0.0, 0.9, 0.1);
        let (_, removed) = robust_fuse(&[a, b], None, None).unwrap();
        assert!(removed.is_empty());
    }

    #[test]
    fn robust_fuse_empty_list_errors() {
        assert!(robust_fuse(&[], None, None).is_err());
    }
}
