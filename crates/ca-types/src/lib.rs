#![forbid(unsafe_code)]

//! The `Opinion` quadruple ω = (belief, disbelief, uncertainty, base_rate)
//! from Jøsang's Subjective Logic (Jøsang, 2016). An opinion distinguishes
//! evidence *for* a proposition, evidence *against* it, and absence of
//! evidence — three phenomena a bare scalar confidence score conflates.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ADDITIVITY_TOL: f64 = 1e-9;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum OpinionError {
    #[error("{component} must be finite, got: {value}")]
    NotFinite { component: &'static str, value: f64 },
    #[error("{component} must be in [0, 1], got: {value}")]
    OutOfRange { component: &'static str, value: f64 },
    #[error("belief + disbelief + uncertainty must sum to 1, got {belief} + {disbelief} + {uncertainty} = {total}")]
    AdditivityViolation {
        belief: f64,
        disbelief: f64,
        uncertainty: f64,
        total: f64,
    },
    #[error("evidence counts must be non-negative, got positive={positive}, negative={negative}")]
    NegativeEvidence { positive: f64, negative: f64 },
    #[error("prior_weight must be positive, got: {value}")]
    NonPositivePriorWeight { value: f64 },
}

fn validate_component(value: f64, component: &'static str) -> Result<f64, OpinionError> {
    if value.is_nan() || value.is_infinite() {
        return Err(OpinionError::NotFinite { component, value });
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(OpinionError::OutOfRange { component, value });
    }
    Ok(value)
}

/// The `@type` tag carried on an opinion's wire representation. A unit
/// variant rather than a bare `&'static str` field so `Opinion` keeps
/// deriving `Deserialize` without a lifetime parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpinionType {
    Opinion,
}

impl Default for OpinionType {
    fn default() -> Self {
        OpinionType::Opinion
    }
}

/// A subjective opinion ω = (b, d, u, a) per Subjective Logic.
///
/// Invariant: `belief + disbelief + uncertainty == 1` within `ADDITIVITY_TOL`.
/// `Opinion` is `Copy` since it is four `f64`s — cheaper to pass by value
/// than to thread references through the fusion/discount/deduction chains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opinion {
    belief: f64,
    disbelief: f64,
    uncertainty: f64,
    #[serde(rename = "baseRate")]
    base_rate: f64,
    #[serde(rename = "@type", default)]
    opinion_type: OpinionType,
}

impl Opinion {
    /// Construct an opinion, validating range and the additivity constraint.
    pub fn new(
        belief: f64,
        disbelief: f64,
        uncertainty: f64,
        base_rate: f64,
    ) -> Result<Self, OpinionError> {
        let b = validate_component(belief, "belief")?;
        let d = validate_component(disbelief, "disbelief")?;
        let u = validate_component(uncertainty, "uncertainty")?;
        let a = validate_component(base_rate, "base_rate")?;

        let total = b + d + u;
        if (total - 1.0).abs() > ADDITIVITY_TOL {
            return Err(OpinionError::AdditivityViolation {
                belief: b,
                disbelief: d,
                uncertainty: u,
                total,
            });
        }

        Ok(Self {
            belief: b,
            disbelief: d,
            uncertainty: u,
            base_rate: a,
            opinion_type: OpinionType::Opinion,
        })
    }

    /// Construct with the default base rate of 0.5.
    pub fn with_default_base_rate(
        belief: f64,
        disbelief: f64,
        uncertainty: f64,
    ) -> Result<Self, OpinionError> {
        Self::new(belief, disbelief, uncertainty, 0.5)
    }

    /// The vacuous opinion: total uncertainty, base rate 0.5.
    #[must_use]
    pub fn vacuous() -> Self {
        Self {
            belief: 0.0,
            disbelief: 0.0,
            uncertainty: 1.0,
            base_rate: 0.5,
            opinion_type: OpinionType::Opinion,
        }
    }

    /// Create an opinion from a scalar confidence score.
    ///
    /// When `uncertainty` is 0 (the default for callers who don't supply
    /// one), this yields a dogmatic opinion with `P(ω) = belief = confidence`.
    /// Otherwise the remaining `1 - uncertainty` mass is split between
    /// belief and disbelief proportionally to `confidence` and its complement.
    pub fn from_confidence(
        confidence: f64,
        uncertainty: f64,
        base_rate: f64,
    ) -> Result<Self, OpinionError> {
        let c = validate_component(confidence, "confidence")?;
        let u = validate_component(uncertainty, "uncertainty")?;
        validate_component(base_rate, "base_rate")?;

        let remaining = 1.0 - u;
        let b = c * remaining;
        let d = (1.0 - c) * remaining;

        Self::new(b, d, u, base_rate)
    }

    /// Create an opinion from evidence counts (Jøsang 2016, §3.2).
    ///
    /// `b = r/(r+s+W)`, `d = s/(r+s+W)`, `u = W/(r+s+W)`, where `r` and `s`
    /// are positive/negative observation counts and `W` is the
    /// non-informative prior weight.
    pub fn from_evidence(
        positive: f64,
        negative: f64,
        prior_weight: f64,
        base_rate: f64,
    ) -> Result<Self, OpinionError> {
        if positive < 0.0 || negative < 0.0 {
            return Err(OpinionError::NegativeEvidence { positive, negative });
        }
        if prior_weight <= 0.0 {
            return Err(OpinionError::NonPositivePriorWeight { value: prior_weight });
        }

        let total = positive + negative + prior_weight;
        Self::new(
            positive / total,
            negative / total,
            prior_weight / total,
            base_rate,
        )
    }

    #[must_use]
    pub fn belief(&self) -> f64 {
        self.belief
    }

    #[must_use]
    pub fn disbelief(&self) -> f64 {
        self.disbelief
    }

    #[must_use]
    pub fn uncertainty(&self) -> f64 {
        self.uncertainty
    }

    #[must_use]
    pub fn base_rate(&self) -> f64 {
        self.base_rate
    }

    /// P(ω) = b + a·u — collapses the opinion to a scalar probability.
    #[must_use]
    pub fn projected_probability(&self) -> f64 {
        self.belief + self.base_rate * self.uncertainty
    }

    /// Alias for [`Opinion::projected_probability`], for call sites that
    /// read more naturally in confidence-score terms.
    #[must_use]
    pub fn to_confidence(&self) -> f64 {
        self.projected_probability()
    }
}

impl fmt::Display for Opinion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Opinion(b={:.4}, d={:.4}, u={:.4}, a={:.4})",
            self.belief, self.disbelief, self.uncertainty, self.base_rate
        )
    }
}
