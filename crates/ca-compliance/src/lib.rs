#![forbid(unsafe_code)]

//! Compliance algebra: a GDPR-grounded reinterpretation of Subjective
//! Logic opinions, where belief/disbelief become lawfulness/violation.
//!
//! Operators model composite compliance across jurisdictions, consent
//! validity, erasure propagation, and the temporal triggers (expiry,
//! review-due, regulatory change, withdrawal) that revise a compliance
//! assessment as facts change.

use std::fmt;

use ca_types::{Opinion, OpinionError};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ComplianceError {
    #[error("{op} requires at least one opinion")]
    EmptyInput { op: &'static str },
    #[error(transparent)]
    Invalid(#[from] OpinionError),
    #[error(transparent)]
    Decay(#[from] ca_decay::DecayError),
}

/// A compliance opinion ω = (l, v, u, a): lawfulness, violation,
/// uncertainty, base rate. A domain re-typing of [`Opinion`] — every
/// standard Subjective Logic operator still applies to its underlying
/// opinion via [`ComplianceOpinion::opinion`].
#[derive(Debug, Clone, Copy)]
pub struct ComplianceOpinion(Opinion);

impl ComplianceOpinion {
    pub fn create(
        lawfulness: f64,
        violation: f64,
        uncertainty: f64,
        base_rate: f64,
    ) -> Result<Self, ComplianceError> {
        Ok(Self(Opinion::new(lawfulness, violation, uncertainty, base_rate)?))
    }

    #[must_use]
    pub fn from_opinion(opinion: Opinion) -> Self {
        Self(opinion)
    }

    #[must_use]
    pub fn opinion(&self) -> Opinion {
        self.0
    }

    #[must_use]
    pub fn lawfulness(&self) -> f64 {
        self.0.belief()
    }

    #[must_use]
    pub fn violation(&self) -> f64 {
        self.0.disbelief()
    }

    #[must_use]
    pub fn uncertainty(&self) -> f64 {
        self.0.uncertainty()
    }

    #[must_use]
    pub fn base_rate(&self) -> f64 {
        self.0.base_rate()
    }

    #[must_use]
    pub fn projected_probability(&self) -> f64 {
        self.0.projected_probability()
    }

    /// The jurisdictional-meet monoid identity: fully lawful, no uncertainty.
    #[must_use]
    pub fn identity() -> Self {
        Self(Opinion::new(1.0, 0.0, 0.0, 1.0).expect("identity opinion is always valid"))
    }

    /// The jurisdictional-meet monoid annihilator: total violation.
    #[must_use]
    pub fn annihilator() -> Self {
        Self(Opinion::new(0.0, 1.0, 0.0, 0.0).expect("annihilator opinion is always valid"))
    }
}

impl From<Opinion> for ComplianceOpinion {
    fn from(opinion: Opinion) -> Self {
        Self(opinion)
    }
}

impl PartialEq for ComplianceOpinion {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialEq<Opinion> for ComplianceOpinion {
    fn eq(&self, other: &Opinion) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for ComplianceOpinion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ComplianceOpinion(l={:.4}, v={:.4}, u={:.4}, a={:.4})",
            self.lawfulness(),
            self.violation(),
            self.uncertainty(),
            self.base_rate()
        )
    }
}

fn as_compliance(opinion: Opinion) -> ComplianceOpinion {
    ComplianceOpinion::from_opinion(opinion)
}

// ── Jurisdictional meet ──────────────────────────────────────────────

/// Binary jurisdictional meet: lawfulness is a conjunction (both must
/// hold), violation is a disjunction (either constitutes violation).
fn jurisdictional_meet_pair(w1: Opinion, w2: Opinion) -> Result<ComplianceOpinion, ComplianceError> {
    let (l1, v1) = (w1.belief(), w1.disbelief());
    let (l2, v2) = (w2.belief(), w2.disbelief());

    let l_meet = l1 * l2;
    let v_meet = v1 + v2 - v1 * v2;
    let u_meet = ((1.0 - v1) * (1.0 - v2) - l1 * l2).max(0.0);
    let a_meet = w1.base_rate() * w2.base_rate();

    ComplianceOpinion::create(l_meet, v_meet, u_meet, a_meet)
}

/// Jurisdictional meet — conjunction of compliance requirements across
/// N jurisdictions. Forms a bounded commutative monoid: identity
/// [`ComplianceOpinion::identity`], annihilator [`ComplianceOpinion::annihilator`].
///
/// Independence assumption: jurisdictional opinions are assessed
/// independently; under positive correlation the result is
/// non-conservative (underestimates violation).
pub fn jurisdictional_meet(opinions: &[Opinion]) -> Result<ComplianceOpinion, ComplianceError> {
    match opinions {
        [] => Err(ComplianceError::EmptyInput { op: "jurisdictional_meet" }),
        [only] => Ok(as_compliance(*only)),
        [first, rest @ ..] => {
            let mut result = *first;
            for next in rest {
                result = jurisdictional_meet_pair(result, *next)?.opinion();
            }
            Ok(as_compliance(result))
        }
    }
}

// ── Compliance propagation ───────────────────────────────────────────

/// Propagate compliance through a data-derivation step: the derived
/// dataset's compliance is the three-way jurisdictional meet of source
/// compliance, derivation-process trust, and purpose compatibility.
pub fn compliance_propagation(
    source: Opinion,
    derivation_trust: Opinion,
    purpose_compat: Opinion,
) -> Result<ComplianceOpinion, ComplianceError> {
    jurisdictional_meet(&[source, derivation_trust, purpose_compat])
}

/// An ordered provenance chain: the legally required audit artifact
/// (GDPR Art. 30, Art. 5(2)) recording each derivation step. The
/// algebraic result is a computed summary, independently verifiable
/// from the chain.
#[derive(Debug, Clone)]
pub struct ProvenanceChain {
    pub source: Opinion,
    pub source_timestamp: f64,
    pub steps: Vec<(Opinion, Opinion, f64)>,
}

impl ProvenanceChain {
    #[must_use]
    pub fn new(source: Opinion, source_timestamp: f64) -> Self {
        Self {
            source,
            source_timestamp,
            steps: Vec::new(),
        }
    }

    pub fn add_step(&mut self, trust: Opinion, purpose: Opinion, timestamp: f64) {
        self.steps.push((trust, purpose, timestamp));
    }

    /// Compute the derived compliance by iterative propagation, each
    /// step applied in chain order (matches propagation's associativity).
    pub fn compute(&self) -> Result<ComplianceOpinion, ComplianceError> {
        let mut current = self.source;
        for &(trust, purpose, _ts) in &self.steps {
            current = compliance_propagation(current, trust, purpose)?.opinion();
        }
        Ok(as_compliance(current))
    }
}

// ── Consent assessment ───────────────────────────────────────────────

/// The six GDPR Art. 4(11)/Art. 7 conditions for valid consent.
#[derive(Debug, Clone, Copy)]
pub struct ConsentConditions {
    pub freely_given: Opinion,
    pub specific: Opinion,
    pub informed: Opinion,
    pub unambiguous: Opinion,
    pub demonstrable: Opinion,
    pub distinguishable: Opinion,
}

impl ConsentConditions {
    #[must_use]
    pub fn as_array(&self) -> [Opinion; 6] {
        [
            self.freely_given,
            self.specific,
            self.informed,
            self.unambiguous,
            self.demonstrable,
            self.distinguishable,
        ]
    }
}

/// Consent validity — the jurisdictional meet of the six consent
/// conditions (Art. 4(11), Art. 7).
///
/// Independence assumption: the six conditions may be positively
/// correlated in practice, biasing the result toward optimism.
pub fn consent_validity(conditions: &ConsentConditions) -> Result<ComplianceOpinion, ComplianceError> {
    jurisdictional_meet(&conditions.as_array())
}

/// Positional form of [`consent_validity`] for callers holding the six
/// conditions as a bare array rather than a named [`ConsentConditions`].
/// Rust has no keyword arguments, so both forms are exposed explicitly
/// rather than emulated with a builder.
pub fn consent_validity_positional(conditions: &[Opinion; 6]) -> Result<ComplianceOpinion, ComplianceError> {
    jurisdictional_meet(conditions)
}

/// Withdrawal override — proposition replacement at withdrawal (Art.
/// 7(3)). Post-withdrawal the compliance-relevant question changes from
/// "was consent valid?" to "has processing ceased?" — a different
/// proposition, not evidence about the same one, so no fusion operator
/// applies; this is a sharp switch at `withdrawal_time`.
#[must_use]
pub fn withdrawal_override(
    consent_opinion: Opinion,
    withdrawal_opinion: Opinion,
    assessment_time: f64,
    withdrawal_time: f64,
) -> ComplianceOpinion {
    if assessment_time < withdrawal_time {
        as_compliance(consent_opinion)
    } else {
        as_compliance(withdrawal_opinion)
    }
}

// ── Temporal decay triggers ──────────────────────────────────────────

/// Expiry trigger — asymmetric lawfulness→violation transfer. An
/// expired deadline is a known fact, not epistemic uncertainty, so
/// lawfulness converts to violation rather than dispersing into u.
///
/// `residual_factor` γ ∈ [0, 1]: 0 is hard expiry (all lawfulness
/// becomes violation), 1 has no immediate effect.
pub fn expiry_trigger(
    opinion: Opinion,
    assessment_time: f64,
    trigger_time: f64,
    residual_factor: f64,
) -> Result<ComplianceOpinion, ComplianceError> {
    if assessment_time < trigger_time {
        return Ok(as_compliance(opinion));
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(assessment_time, trigger_time, residual_factor, "expiry trigger fired");

    let gamma = residual_factor;
    let l = opinion.belief();
    let v = opinion.disbelief();
    let u = opinion.uncertainty();
    let a = opinion.base_rate();

    ComplianceOpinion::create(gamma * l, v + (1.0 - gamma) * l, u, a)
}

/// Review-due trigger — accelerated decay toward vacuity. A missed
/// mandatory review (Art. 45(3), Art. 35(11)) means we lack current
/// evidence, not that the situation is known non-compliant — so it
/// moves toward uncertainty, not violation, unlike [`expiry_trigger`].
pub fn review_due_trigger(
    opinion: Opinion,
    assessment_time: f64,
    trigger_time: f64,
    accelerated_half_life: f64,
) -> Result<ComplianceOpinion, ComplianceError> {
    if assessment_time < trigger_time {
        return Ok(as_compliance(opinion));
    }

    let elapsed = assessment_time - trigger_time;
    let decayed = ca_decay::decay_opinion(opinion, elapsed, accelerated_half_life)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(elapsed, accelerated_half_life, "review-due trigger fired");

    Ok(as_compliance(decayed))
}

/// Regulatory change trigger — proposition replacement at a discrete
/// legal event (e.g. adequacy decision revocation). Same semantics as
/// [`withdrawal_override`]; trigger ordering is non-commutative by
/// design, since the order of regulatory events matters.
#[must_use]
pub fn regulatory_change_trigger(
    opinion: Opinion,
    assessment_time: f64,
    trigger_time: f64,
    new_opinion: Opinion,
) -> ComplianceOpinion {
    if assessment_time < trigger_time {
        as_compliance(opinion)
    } else {
        as_compliance(new_opinion)
    }
}

// ── Erasure propagation ──────────────────────────────────────────────

/// Composite erasure completeness — complete erasure requires ALL
/// scoped nodes to be erased, an n-ary jurisdictional meet that
/// degrades exponentially with scope size.
///
/// Independence bias direction: conservative (overestimates risk),
/// the opposite of the compliance operators above.
pub fn erasure_scope_opinion(per_node_opinions: &[Opinion]) -> Result<ComplianceOpinion, ComplianceError> {
    jurisdictional_meet(per_node_opinions)
}

/// Residual contamination risk at a node given its ancestors: a node
/// is contaminated if personal data persists in it OR any ancestor — a
/// disjunction of per-node persistence.
///
/// `belief`/`disbelief` in each input opinion represent erasure
/// completeness/persistence evidence respectively; the result's
/// lawfulness is the clean probability and violation is contamination risk.
pub fn residual_contamination(ancestor_opinions: &[Opinion]) -> Result<ComplianceOpinion, ComplianceError> {
    if ancestor_opinions.is_empty() {
        return Err(ComplianceError::EmptyInput { op: "residual_contamination" });
    }

    let prod_one_minus_ebar: f64 = ancestor_opinions.iter().map(|o| 1.0 - o.disbelief()).product();
    let prod_e: f64 = ancestor_opinions.iter().map(Opinion::belief).product();

    let r = (1.0 - prod_one_minus_ebar).max(0.0);
    let r_bar = prod_e;
    let u_r = (prod_one_minus_ebar - prod_e).max(0.0);

    let a = ancestor_opinions.iter().map(Opinion::base_rate).sum::<f64>() / ancestor_opinions.len() as f64;

    ComplianceOpinion::create(r_bar, r, u_r, a)
}

// ── Compliance lifecycle state machine ───────────────────────────────

/// States of a single compliance assessment's lifecycle. Terminal states
/// (all but `Vacuous`/`Evidenced`) are absorbing within one assessment;
/// composing *across* assessments uses [`jurisdictional_meet`], not a
/// state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplianceState {
    Vacuous,
    Evidenced,
    Expired,
    UnderReview,
    Withdrawn,
    RegulatoryChanged,
}

/// A trigger event that can fire against a [`ComplianceLifecycle`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComplianceTrigger {
    Expiry { residual_factor: f64 },
    ReviewDue { accelerated_half_life: f64 },
    Withdrawal { withdrawal_opinion: Opinion },
    RegulatoryChange { new_opinion: Opinion },
}

/// Tracks one assessment's current opinion, state, and the time it was
/// last evaluated; [`ComplianceLifecycle::fire`] applies a trigger if
/// due, updating both the opinion (via the corresponding C4 operator)
/// and the state.
#[derive(Debug, Clone, Copy)]
pub struct ComplianceLifecycle {
    opinion: Opinion,
    state: ComplianceState,
}

impl ComplianceLifecycle {
    #[must_use]
    pub fn new(opinion: Opinion) -> Self {
        Self {
            opinion,
            state: if opinion.uncertainty() >= 1.0 - 1e-9 {
                ComplianceState::Vacuous
            } else {
                ComplianceState::Evidenced
            },
        }
    }

    #[must_use]
    pub fn opinion(&self) -> Opinion {
        self.opinion
    }

    #[must_use]
    pub fn state(&self) -> ComplianceState {
        self.state
    }

    /// Evaluate `trigger` at `assessment_time` against `trigger_time`. A
    /// terminal state is absorbing: once reached, later triggers within
    /// the same assessment are no-ops.
    pub fn fire(
        &mut self,
        trigger: ComplianceTrigger,
        assessment_time: f64,
        trigger_time: f64,
    ) -> Result<(), ComplianceError> {
        if self.state != ComplianceState::Vacuous && self.state != ComplianceState::Evidenced {
            return Ok(());
        }
        if assessment_time < trigger_time {
            return Ok(());
        }

        match trigger {
            ComplianceTrigger::Expiry { residual_factor } => {
                self.opinion = expiry_trigger(self.opinion, assessment_time, trigger_time, residual_factor)?.opinion();
                self.state = ComplianceState::Expired;
            }
            ComplianceTrigger::ReviewDue { accelerated_half_life } => {
                self.opinion =
                    review_due_trigger(self.opinion, assessment_time, trigger_time, accelerated_half_life)?.opinion();
                self.state = ComplianceState::UnderReview;
            }
            ComplianceTrigger::Withdrawal { withdrawal_opinion } => {
                self.opinion =
                    withdrawal_override(self.opinion, withdrawal_opinion, assessment_time, trigger_time).opinion();
                self.state = ComplianceState::Withdrawn;
            }
            ComplianceTrigger::RegulatoryChange { new_opinion } => {
                self.opinion = regulatory_change_trigger(self.opinion, assessment_time, trigger_time, new_opinion)
                    .opinion();
                self.state = ComplianceState::RegulatoryChanged;
            }
        }

        Ok(())
    }
}
