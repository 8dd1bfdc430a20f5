#![forbid(unsafe_code)]

//! Scalar confidence reasoning, kept deliberately `Opinion`-free: simple
//! probability-combination rules for callers who have not (yet) adopted
//! the full Subjective Logic opinion type.
//!
//! Strategy/method selection is a Rust enum rather than a string, so an
//! unknown method name is a compile error instead of a runtime failure.

use thiserror::Error;

#[cfg(feature = "graph")]
use ca_facade::{Document, FacadeError};

const LOGIT_EPSILON: f64 = 1e-4;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InferenceError {
    #[error("{op} requires at least one input")]
    EmptyInput { op: &'static str },
    #[error("conflict resolution requires every candidate to carry a confidence score")]
    MissingConfidence,
    #[cfg(feature = "graph")]
    #[error(transparent)]
    Facade(#[from] FacadeError),
}

/// Scalar propagation method (back-compat path predating the opinion algebra).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationMethod {
    /// `∏ c_i`.
    Multiply,
    /// Log-odds sum from a uniform prior, clamped to avoid `log(0)`/`log(1)`.
    Bayesian,
    /// `min(c_i)` — weakest link in the chain.
    Min,
    /// `(∏ c_i)^(1/√n)` — dampens long chains relative to plain multiplication.
    Dampened,
}

impl PropagationMethod {
    fn label(self) -> &'static str {
        match self {
            PropagationMethod::Multiply => "multiply",
            PropagationMethod::Bayesian => "bayesian",
            PropagationMethod::Min => "min",
            PropagationMethod::Dampened => "dampened",
        }
    }
}

/// Result of a scalar propagation, carrying enough context for an audit
/// trail (not just the bare number).
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationResult {
    pub method: String,
    pub value: f64,
    pub input_scores: Vec<f64>,
    pub reason: String,
}

fn clamp_logit_input(p: f64) -> f64 {
    p.clamp(LOGIT_EPSILON, 1.0 - LOGIT_EPSILON)
}

fn logit(p: f64) -> f64 {
    let p = clamp_logit_input(p);
    (p / (1.0 - p)).ln()
}

pub fn propagate_confidence(scores: &[f64], method: PropagationMethod) -> Result<PropagationResult, InferenceError> {
    if scores.is_empty() {
        return Err(InferenceError::EmptyInput { op: "propagate_confidence" });
    }

    let value = match method {
        PropagationMethod::Multiply => scores.iter().product(),
        PropagationMethod::Bayesian => {
            let log_odds_sum: f64 = scores.iter().map(|&p| logit(p)).sum();
            1.0 / (1.0 + (-log_odds_sum).exp())
        }
        PropagationMethod::Min => scores.iter().copied().fold(f64::INFINITY, f64::min),
        PropagationMethod::Dampened => {
            let product: f64 = scores.iter().product();
            product.powf(1.0 / (scores.len() as f64).sqrt())
        }
    };

    Ok(PropagationResult {
        method: method.label().to_owned(),
        value,
        input_scores: scores.to_vec(),
        reason: format!("{} over {} score(s)", method.label(), scores.len()),
    })
}

/// Multi-source combination method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinationMethod {
    Average,
    Max,
    /// `1 - ∏(1 - p_i)`.
    NoisyOr,
    /// Dempster-Shafer combination of BPAs with `m({True}) = p`, `m(Θ) = 1-p`,
    /// folded left-to-right (associative on this restricted frame).
    DempsterShafer,
}

impl CombinationMethod {
    fn label(self) -> &'static str {
        match self {
            CombinationMethod::Average => "average",
            CombinationMethod::Max => "max",
            CombinationMethod::NoisyOr => "noisy_or",
            CombinationMethod::DempsterShafer => "dempster_shafer",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombinationResult {
    pub method: String,
    pub value: f64,
    pub input_scores: Vec<f64>,
    pub reason: String,
}

fn dempster_shafer_pair(a: f64, b: f64) -> f64 {
    a + b - a * b
}

pub fn combine_sources(scores: &[f64], method: CombinationMethod) -> Result<CombinationResult, InferenceError> {
    if scores.is_empty() {
        return Err(InferenceError::EmptyInput { op: "combine_sources" });
    }

    let value = match method {
        CombinationMethod::Average => scores.iter().sum::<f64>() / scores.len() as f64,
        CombinationMethod::Max => scores.iter().copied().fold(f64::MIN, f64::max),
        CombinationMethod::NoisyOr => 1.0 - scores.iter().map(|p| 1.0 - p).product::<f64>(),
        CombinationMethod::DempsterShafer => scores
            .iter()
            .skip(1)
            .fold(scores[0], |acc, &p| dempster_shafer_pair(acc, p)),
    };

    Ok(CombinationResult {
        method: method.label().to_owned(),
        value,
        input_scores: scores.to_vec(),
        reason: format!("{} over {} source(s)", method.label(), scores.len()),
    })
}

/// Conflict resolution strategy over a set of competing assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolutionStrategy {
    /// Max confidence; ties keep input order.
    Highest,
    /// Group by value, noisy-OR within group, pick the top group's best representative.
    WeightedVote,
    /// Most recently extracted wins; confidence breaks ties.
    Recency,
}

impl ConflictResolutionStrategy {
    fn label(self) -> &'static str {
        match self {
            ConflictResolutionStrategy::Highest => "highest",
            ConflictResolutionStrategy::WeightedVote => "weighted_vote",
            ConflictResolutionStrategy::Recency => "recency",
        }
    }
}

/// A competing assertion: `@value` plus `@confidence`, with optional
/// `@extractedAt` for the recency strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Assertion {
    pub value: serde_json::Value,
    pub confidence: Option<f64>,
    pub extracted_at: Option<String>,
}

impl Assertion {
    #[must_use]
    pub fn new(value: serde_json::Value, confidence: f64) -> Self {
        Self {
            value,
            confidence: Some(confidence),
            extracted_at: None,
        }
    }

    #[must_use]
    pub fn with_extracted_at(mut self, extracted_at: impl Into<String>) -> Self {
        self.extracted_at = Some(extracted_at.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConflictReport {
    pub strategy: String,
    pub winner_value: serde_json::Value,
    pub winner_confidence: f64,
    pub input_scores: Vec<f64>,
    pub reason: String,
}

pub fn resolve_conflict(
    candidates: &[Assertion],
    strategy: ConflictResolutionStrategy,
) -> Result<ConflictReport, InferenceError> {
    if candidates.is_empty() {
        return Err(InferenceError::EmptyInput { op: "resolve_conflict" });
    }
    if candidates.iter().any(|c| c.confidence.is_none()) {
        return Err(InferenceError::MissingConfidence);
    }

    let input_scores: Vec<f64> = candidates.iter().map(|c| c.confidence.unwrap()).collect();

    let (winner_value, winner_confidence, reason) = match strategy {
        ConflictResolutionStrategy::Highest => {
            let mut best = &candidates[0];
            for candidate in &candidates[1..] {
                if candidate.confidence.unwrap() > best.confidence.unwrap() {
                    best = candidate;
                }
            }
            (best.value.clone(), best.confidence.unwrap(), "max confidence, ties kept input order".to_owned())
        }
        ConflictResolutionStrategy::WeightedVote => {
            let mut groups: Vec<(serde_json::Value, Vec<&Assertion>)> = Vec::new();
            for candidate in candidates {
                if let Some(group) = groups.iter_mut().find(|(v, _)| *v == candidate.value) {
                    group.1.push(candidate);
                } else {
                    groups.push((candidate.value.clone(), vec![candidate]));
                }
            }

            let scored_groups: Vec<(usize, f64)> = groups
                .iter()
                .enumerate()
                .map(|(i, (_, members))| {
                    let scores: Vec<f64> = members.iter().map(|m| m.confidence.unwrap()).collect();
                    (i, combine_sources(&scores, CombinationMethod::NoisyOr).unwrap().value)
                })
                .collect();

            let &(top_idx, top_score) = scored_groups
                .iter()
                .max_by(|a, b| a.1.partial_cmp(&b.1).expect("noisy-or scores are finite"))
                .expect("groups is non-empty");

            let representative = groups[top_idx]
                .1
                .iter()
                .max_by(|a, b| a.confidence.unwrap().partial_cmp(&b.confidence.unwrap()).expect("finite"))
                .expect("group is non-empty");

            (
                representative.value.clone(),
                top_score,
                format!("weighted vote: {} candidate group(s), top group noisy-or {top_score:.4}", groups.len()),
            )
        }
        ConflictResolutionStrategy::Recency => {
            let mut best = &candidates[0];
            for candidate in &candidates[1..] {
                let better_time = candidate.extracted_at.as_deref().unwrap_or("")
                    > best.extracted_at.as_deref().unwrap_or("");
                let same_time = candidate.extracted_at.as_deref().unwrap_or("")
                    == best.extracted_at.as_deref().unwrap_or("");
                let better_confidence = same_time && candidate.confidence.unwrap() > best.confidence.unwrap();
                if better_time || better_confidence {
                    best = candidate;
                }
            }
            (best.value.clone(), best.confidence.unwrap(), "most recently extracted, confidence tiebreak".to_owned())
        }
    };

    Ok(ConflictReport {
        strategy: strategy.label().to_owned(),
        winner_value,
        winner_confidence,
        input_scores,
        reason,
    })
}

/// Walk a chain of property names starting at `start_node_id`, following
/// node references when a step's bare value names another node's `@id`,
/// collecting confidence at each hop and propagating it via `method`.
/// Feature-gated so scalar-only consumers don't pull in `ca-facade`.
#[cfg(feature = "graph")]
pub fn propagate_graph_confidence(
    graph: &Document,
    start_node_id: &str,
    property_chain: &[&str],
    method: PropagationMethod,
) -> Result<PropagationResult, InferenceError> {
    let mut current_id = start_node_id.to_owned();
    let mut scores = Vec::with_capacity(property_chain.len());

    for (i, &prop) in property_chain.iter().enumerate() {
        let node = graph
            .node(&current_id)
            .ok_or_else(|| InferenceError::Facade(FacadeError::NodeNotFound(current_id.clone())))?;
        let value = node.get(prop).ok_or_else(|| {
            InferenceError::Facade(FacadeError::PropertyNotFound {
                node_id: Some(current_id.clone()),
                property: prop.to_owned(),
            })
        })?;
        let annotated = value.as_annotated().ok_or(InferenceError::MissingConfidence)?;
        let confidence = annotated.confidence.ok_or(InferenceError::MissingConfidence)?;
        scores.push(confidence);

        if i + 1 < property_chain.len() {
            current_id = annotated
                .value
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| InferenceError::Facade(FacadeError::NotTraversable { property: prop.to_owned() }))?;
        }
    }

    propagate_confidence(&scores, method)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        Assertion, CombinationMethod, ConflictResolutionStrategy, PropagationMethod, combine_sources,
        propagate_confidence, resolve_conflict,
    };

    #[test]
    fn multiply_is_plain_product() {
        let result = propagate_confidence(&[0.9, 0.8, 0.7], PropagationMethod::Multiply).unwrap();
        assert!((result.value - 0.504).abs() < 1e-9);
    }

    #[test]
    fn min_is_weakest_link() {
        let result = propagate_confidence(&[0.9, 0.3, 0.7], PropagationMethod::Min).unwrap();
        assert_eq!(result.value, 0.3);
    }

    #[test]
    fn dampened_is_geometric_mean_style_root() {
        let result = propagate_confidence(&[0.81, 0.81], PropagationMethod::Dampened).unwrap();
        assert!((result.value - 0.81).abs() < 1e-9);
    }

    #[test]
    fn bayesian_clamps_extreme_scores() {
        let result = propagate_confidence(&[1.0, 0.0], PropagationMethod::Bayesian).unwrap();
        assert!(result.value.is_finite());
    }

    #[test]
    fn empty_propagation_input_rejected() {
        assert!(propagate_confidence(&[], PropagationMethod::Multiply).is_err());
    }

    #[test]
    fn noisy_or_is_commutative_and_monotone() {
        let a = combine_sources(&[0.5, 0.3], CombinationMethod::NoisyOr).unwrap();
        let b = combine_sources(&[0.3, 0.5], CombinationMethod::NoisyOr).unwrap();
        assert!((a.value - b.value).abs() < 1e-12);

        let more = combine_sources(&[0.5, 0.3, 0.2], CombinationMethod::NoisyOr).unwrap();
        assert!(more.value >= a.value);
    }

    #[test]
    fn dempster_shafer_folds_left_associatively() {
        let result = combine_sources(&[0.6, 0.5, 0.4], CombinationMethod::DempsterShafer).unwrap();
        assert!(result.value > 0.6);
        assert!(result.value <= 1.0);
    }

    #[test]
    fn resolve_conflict_highest_picks_max() {
        let candidates = vec![Assertion::new(json!("A"), 0.7), Assertion::new(json!("B"), 0.9)];
        let report = resolve_conflict(&candidates, ConflictResolutionStrategy::Highest).unwrap();
        assert_eq!(report.winner_value, json!("B"));
    }

    #[test]
    fn resolve_conflict_weighted_vote_groups_by_value() {
        let candidates = vec![
            Assertion::new(json!("A"), 0.6),
            Assertion::new(json!("A"), 0.5),
            Assertion::new(json!("B"), 0.95),
        ];
        let report = resolve_conflict(&candidates, ConflictResolutionStrategy::WeightedVote).unwrap();
        assert_eq!(report.winner_value, json!("A"));
        assert!((report.winner_confidence - (1.0 - 0.4 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn resolve_conflict_recency_prefers_latest_extraction() {
        let candidates = vec![
            Assertion::new(json!("old"), 0.9).with_extracted_at("2020-01-01"),
            Assertion::new(json!("new"), 0.5).with_extracted_at("2024-01-01"),
        ];
        let report = resolve_conflict(&candidates, ConflictResolutionStrategy::Recency).unwrap();
        assert_eq!(report.winner_value, json!("new"));
    }

    #[test]
    fn resolve_conflict_missing_confidence_rejected() {
        let candidates = vec![Assertion { value: json!("A"), confidence: None, extracted_at: None }];
        assert!(resolve_conflict(&candidates, ConflictResolutionStrategy::Highest).is_err());
    }

    #[test]
    fn resolve_conflict_empty_input_rejected() {
        assert!(resolve_conflict(&[], ConflictResolutionStrategy::Highest).is_err());
    }
}
