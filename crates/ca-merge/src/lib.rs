#![forbid(unsafe_code)]

//! Cross-document graph merge and diff.
//!
//! `merge` aligns nodes across ≥2 annotated documents by `@id`, copies
//! through properties that appear in only one contributor, combines
//! confidences where contributors agree on the bare value, and resolves
//! disagreement via a pluggable [`ConflictStrategy`] — producing both the
//! merged [`ca_facade::Document`] and an auditable [`MergeReport`].
//!
//! `diff` performs the same bucket-and-compare procedure between exactly
//! two documents and classifies every property as added/removed/modified/
//! unchanged.

use std::collections::BTreeMap;

use ca_facade::{Document, Node, PropertyValue};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MergeError {
    #[error("merge requires at least two documents, got {0}")]
    TooFewDocuments(usize),
}

/// How to combine confidences when ≥2 contributors agree on a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combination {
    /// `1 - ∏(1 - p_i)` — treats independent confirmations as independent evidence.
    NoisyOr,
    Average,
    Max,
}

fn combine(scores: &[f64], combination: Combination) -> f64 {
    match combination {
        Combination::NoisyOr => 1.0 - scores.iter().map(|p| 1.0 - p).product::<f64>(),
        Combination::Average => scores.iter().sum::<f64>() / scores.len() as f64,
        Combination::Max => scores.iter().copied().fold(f64::MIN, f64::max),
    }
}

/// How to resolve disagreement on a property's bare value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Take the candidate with the highest confidence; ties keep input order.
    Highest,
    /// Group candidates by bare value, noisy-OR within each group, pick the
    /// top-scoring group's highest-individual-confidence representative.
    WeightedVote,
    /// Prefer the most recently extracted candidate; confidence breaks ties.
    Recency,
    /// Keep every candidate as a multi-valued sequence.
    Union,
}

impl ConflictStrategy {
    fn label(self) -> &'static str {
        match self {
            ConflictStrategy::Highest => "highest",
            ConflictStrategy::WeightedVote => "weighted_vote",
            ConflictStrategy::Recency => "recency",
            ConflictStrategy::Union => "union",
        }
    }
}

/// Per-operation merge configuration (teacher's `GroupByOptions` convention).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    pub conflict_strategy: ConflictStrategy,
    pub combination: Combination,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            conflict_strategy: ConflictStrategy::Highest,
            combination: Combination::NoisyOr,
        }
    }
}

/// A single resolved (or unioned) conflict, kept for audit (GDPR Art. 30-style
/// record-keeping).
#[derive(Debug, Clone, PartialEq)]
pub struct MergeConflict {
    pub node_id: Option<String>,
    pub property_name: String,
    pub candidate_values: Vec<serde_json::Value>,
    pub resolution_strategy: String,
    pub winner_value: serde_json::Value,
}

/// Audit summary of a merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub source_count: usize,
    pub nodes_merged: usize,
    pub properties_agreed: usize,
    pub properties_conflicted: usize,
    pub properties_union: usize,
    pub conflicts: Vec<MergeConflict>,
}

fn confidence_of(value: &PropertyValue) -> Option<f64> {
    value.confidence()
}

fn extracted_at_of(value: &PropertyValue) -> Option<&str> {
    value.as_annotated().and_then(|a| a.extracted_at.as_deref())
}

/// Merge ≥2 annotated graph documents into one, aligning nodes by `@id`.
pub fn merge(docs: &[Document], options: MergeOptions) -> Result<(Document, MergeReport), MergeError> {
    if docs.len() < 2 {
        return Err(MergeError::TooFewDocuments(docs.len()));
    }

    let mut merged = Document::new();
    merged.context = docs.iter().find_map(|d| d.context.clone());

    let mut report = MergeReport {
        source_count: docs.len(),
        ..MergeReport::default()
    };

    // Bucket nodes by id; nodes without one pass through untouched, in the
    // order they're first encountered.
    let mut buckets: BTreeMap<String, Vec<&Node>> = BTreeMap::new();
    let mut anonymous: Vec<Node> = Vec::new();
    for doc in docs {
        for node in &doc.nodes {
            match &node.id {
                Some(id) => buckets.entry(id.clone()).or_default().push(node),
                None => anonymous.push(node.clone()),
            }
        }
    }

    for (id, contributors) in &buckets {
        let mut merged_node = Node::new(id.clone());
        for contributor in contributors {
            for ty in &contributor.types {
                if !merged_node.types.contains(ty) {
                    merged_node.types.push(ty.clone());
                }
            }
        }

        let mut property_keys: Vec<&str> = Vec::new();
        for contributor in contributors {
            for key in contributor.properties.keys() {
                if !property_keys.contains(&key.as_str()) {
                    property_keys.push(key.as_str());
                }
            }
        }

        for key in property_keys {
            let candidates: Vec<&PropertyValue> = contributors
                .iter()
                .filter_map(|node| node.get(key))
                .collect();

            if candidates.len() == 1 {
                merged_node.set(key.to_owned(), candidates[0].clone());
                continue;
            }

            let bare_values: Vec<serde_json::Value> = candidates.iter().map(|v| v.bare()).collect();
            let all_agree = bare_values.windows(2).all(|w| w[0] == w[1]);

            if all_agree {
                report.properties_agreed += 1;
                merged_node.set(key.to_owned(), resolve_agreement(&candidates, options.combination));
            } else {
                report.properties_conflicted += 1;
                let (winner, winner_bare) = resolve_conflict(&candidates, options.conflict_strategy);
                if options.conflict_strategy == ConflictStrategy::Union {
                    report.properties_union += 1;
                }
                report.conflicts.push(MergeConflict {
                    node_id: Some(id.clone()),
                    property_name: key.to_owned(),
                    candidate_values: bare_values,
                    resolution_strategy: options.conflict_strategy.label().to_owned(),
                    winner_value: winner_bare,
                });

                #[cfg(feature = "tracing")]
                tracing::debug!(node_id = %id, property = key, strategy = options.conflict_strategy.label(), "merge conflict resolved");

                merged_node.set(key.to_owned(), winner);
            }
        }

        merged.push(merged_node);
        report.nodes_merged += 1;
    }

    for node in anonymous {
        merged.push(node);
    }

    Ok((merged, report))
}

fn resolve_agreement(candidates: &[&PropertyValue], combination: Combination) -> PropertyValue {
    let scores: Vec<f64> = candidates.iter().filter_map(|v| confidence_of(v)).collect();
    if scores.is_empty() {
        return candidates[0].clone();
    }

    let combined = combine(&scores, combination);
    let best = candidates
        .iter()
        .max_by(|a, b| {
            confidence_of(a)
                .unwrap_or(0.0)
                .partial_cmp(&confidence_of(b).unwrap_or(0.0))
                .expect("confidences are finite")
        })
        .expect("candidates is non-empty");

    match best {
        PropertyValue::Annotated(av) => {
            let mut out = av.clone();
            out.confidence = Some(combined);
            PropertyValue::Annotated(out)
        }
        other => (*other).clone(),
    }
}

fn resolve_conflict(
    candidates: &[&PropertyValue],
    strategy: ConflictStrategy,
) -> (PropertyValue, serde_json::Value) {
    match strategy {
        ConflictStrategy::Highest => {
            let winner = candidates
                .iter()
                .max_by(|a, b| {
                    confidence_of(a)
                        .unwrap_or(0.0)
                        .partial_cmp(&confidence_of(b).unwrap_or(0.0))
                        .expect("confidences are finite")
                })
                .expect("candidates is non-empty");
            ((*winner).clone(), winner.bare())
        }
        ConflictStrategy::WeightedVote => {
            let mut groups: Vec<(serde_json::Value, Vec<&PropertyValue>)> = Vec::new();
            for &candidate in candidates {
                let bare = candidate.bare();
                if let Some(group) = groups.iter_mut().find(|(v, _)| *v == bare) {
                    group.1.push(candidate);
                } else {
                    groups.push((bare, vec![candidate]));
                }
            }

            let top_group = groups
                .iter()
                .max_by(|a, b| {
                    let score_a = combine(
                        &a.1.iter().map(|v| confidence_of(v).unwrap_or(0.0)).collect::<Vec<_>>(),
                        Combination::NoisyOr,
                    );
                    let score_b = combine(
                        &b.1.iter().map(|v| confidence_of(v).unwrap_or(0.0)).collect::<Vec<_>>(),
                        Combination::NoisyOr,
                    );
                    score_a.partial_cmp(&score_b).expect("scores are finite")
                })
                .expect("groups is non-empty");

            let group_score = combine(
                &top_group.1.iter().map(|v| confidence_of(v).unwrap_or(0.0)).collect::<Vec<_>>(),
                Combination::NoisyOr,
            );
            let representative = top_group
                .1
                .iter()
                .max_by(|a, b| {
                    confidence_of(a)
                        .unwrap_or(0.0)
                        .partial_cmp(&confidence_of(b).unwrap_or(0.0))
                        .expect("confidences are finite")
                })
                .expect("top group is non-empty");

            let winner = match representative {
                PropertyValue::Annotated(av) => {
                    let mut out = (*av).clone();
                    out.confidence = Some(group_score);
                    PropertyValue::Annotated(out)
                }
                other => (*other).clone(),
            };
            let bare = winner.bare();
            (winner, bare)
        }
        ConflictStrategy::Recency => {
            let winner = candidates
                .iter()
                .max_by(|a, b| {
                    let by_time = extracted_at_of(a).unwrap_or("").cmp(extracted_at_of(b).unwrap_or(""));
                    if by_time != std::cmp::Ordering::Equal {
                        by_time
                    } else {
                        confidence_of(a)
                            .unwrap_or(0.0)
                            .partial_cmp(&confidence_of(b).unwrap_or(0.0))
                            .expect("confidences are finite")
                    }
                })
                .expect("candidates is non-empty");
            ((*winner).clone(), winner.bare())
        }
        ConflictStrategy::Union => {
            let union = PropertyValue::Many(candidates.iter().map(|v| (*v).clone()).collect());
            let bare = union.bare();
            (union, bare)
        }
    }
}

/// A single classified property difference between two documents.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
    pub node_id: String,
    pub property_name: String,
    pub value_a: Option<serde_json::Value>,
    pub value_b: Option<serde_json::Value>,
    pub confidence_a: Option<f64>,
    pub confidence_b: Option<f64>,
}

/// The classification of every property across both documents' aligned nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphDiff {
    pub added: Vec<DiffEntry>,
    pub removed: Vec<DiffEntry>,
    pub modified: Vec<DiffEntry>,
    pub unchanged: Vec<DiffEntry>,
}

/// Diff two documents. Nodes without an `@id` cannot be aligned across
/// documents and are excluded from the comparison.
#[must_use]
pub fn diff(a: &Document, b: &Document) -> GraphDiff {
    let mut result = GraphDiff::default();

    let mut ids: Vec<&str> = Vec::new();
    for node in a.nodes.iter().chain(b.nodes.iter()) {
        if let Some(id) = node.id.as_deref() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids.sort_unstable();

    for id in ids {
        let node_a = a.node(id);
        let node_b = b.node(id);

        let mut keys: Vec<&str> = Vec::new();
        if let Some(n) = node_a {
            keys.extend(n.properties.keys().map(String::as_str));
        }
        if let Some(n) = node_b {
            for k in n.properties.keys().map(String::as_str) {
                if !keys.contains(&k) {
                    keys.push(k);
                }
            }
        }

        for key in keys {
            let va = node_a.and_then(|n| n.get(key));
            let vb = node_b.and_then(|n| n.get(key));

            let entry = DiffEntry {
                node_id: id.to_owned(),
                property_name: key.to_owned(),
                value_a: va.map(PropertyValue::bare),
                value_b: vb.map(PropertyValue::bare),
                confidence_a: va.and_then(confidence_of),
                confidence_b: vb.and_then(confidence_of),
            };

            match (va, vb) {
                (None, Some(_)) => result.added.push(entry),
                (Some(_), None) => result.removed.push(entry),
                (Some(x), Some(y)) if x.bare() == y.bare() => result.unchanged.push(entry),
                (Some(_), Some(_)) => result.modified.push(entry),
                (None, None) => unreachable!("key present in at least one side"),
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use ca_facade::{AnnotatedValue, Document, Node, PropertyValue};
    use serde_json::json;

    use super::{Combination, ConflictStrategy, MergeOptions, diff, merge};

    fn new_annotated(value: serde_json::Value, confidence: f64) -> AnnotatedValue {
        AnnotatedValue::new(value).with_confidence(confidence)
    }

    fn doc_with(id: &str, property: &str, value: serde_json::Value, confidence: f64) -> Document {
        let mut node = Node::new(id);
        node.set(property, PropertyValue::Annotated(new_annotated(value, confidence)));
        let mut doc = Document::new();
        doc.push(node);
        doc
    }

    #[test]
    fn too_few_documents_rejected() {
        let single = doc_with("ex:alice", "name", json!("Alice"), 0.9);
        assert!(merge(&[single], MergeOptions::default()).is_err());
    }

    #[test]
    fn agreement_combines_confidence_via_noisy_or() {
        let a = doc_with("ex:alice", "name", json!("Alice"), 0.8);
        let b = doc_with("ex:alice", "name", json!("Alice"), 0.7);

        let (merged, report) = merge(&[a, b], MergeOptions::default()).unwrap();
        let node = merged.node("ex:alice").unwrap();
        let name = node.get("name").unwrap();
        assert!((name.confidence().unwrap() - (1.0 - 0.2 * 0.3)).abs() < 1e-9);
        assert_eq!(report.properties_agreed, 1);
        assert_eq!(report.properties_conflicted, 0);
    }

    #[test]
    fn conflict_highest_picks_max_confidence() {
        let a = doc_with("ex:alice", "name", json!("Alice"), 0.8);
        let b = doc_with("ex:alice", "name", json!("A. Smith"), 0.9);

        let options = MergeOptions {
            conflict_strategy: ConflictStrategy::Highest,
            combination: Combination::NoisyOr,
        };
        let (merged, report) = merge(&[a, b], options).unwrap();
        let node = merged.node("ex:alice").unwrap();
        assert_eq!(node.get("name").unwrap().bare(), json!("A. Smith"));
        assert_eq!(report.properties_conflicted, 1);
        assert_eq!(report.conflicts.len(), 1);
    }

    #[test]
    fn conflict_union_keeps_every_candidate() {
        let a = doc_with("ex:alice", "name", json!("Alice"), 0.8);
        let b = doc_with("ex:alice", "name", json!("A. Smith"), 0.9);

        let options = MergeOptions {
            conflict_strategy: ConflictStrategy::Union,
            combination: Combination::NoisyOr,
        };
        let (merged, _) = merge(&[a, b], options).unwrap();
        let node = merged.node("ex:alice").unwrap();
        match node.get("name").unwrap() {
            PropertyValue::Many(items) => assert_eq!(items.len(), 2),
            other => panic!("expected Many, got {other:?}"),
        }
    }

    #[test]
    fn property_present_in_only_one_doc_passes_through() {
        let a = doc_with("ex:alice", "name", json!("Alice"), 0.8);
        let mut b_node = Node::new("ex:alice");
        b_node.set("age", PropertyValue::Bare(json!(30)));
        let mut b = Document::new();
        b.push(b_node);

        let (merged, report) = merge(&[a, b], MergeOptions::default()).unwrap();
        let node = merged.node("ex:alice").unwrap();
        assert_eq!(node.get("name").unwrap().bare(), json!("Alice"));
        assert_eq!(node.get("age").unwrap().bare(), json!(30));
        assert_eq!(report.properties_agreed, 0);
    }

    #[test]
    fn anonymous_nodes_pass_through_unmerged() {
        let mut anon = Node::new("placeholder");
        anon.id = None;
        let mut a = Document::new();
        a.push(anon);
        let b = doc_with("ex:alice", "name", json!("Alice"), 0.8);

        let (merged, _) = merge(&[a, b], MergeOptions::default()).unwrap();
        assert_eq!(merged.nodes.len(), 2);
    }

    #[test]
    fn diff_classifies_added_removed_modified_unchanged() {
        let a = {
            let mut node = Node::new("ex:alice");
            node.set("name", PropertyValue::Annotated(new_annotated(json!("Alice"), 0.9)));
            node.set("age", PropertyValue::Annotated(new_annotated(json!(30), 0.8)));
            let mut d = Document::new();
            d.push(node);
            d
        };
        let b = {
            let mut node = Node::new("ex:alice");
            node.set("name", PropertyValue::Annotated(new_annotated(json!("Alice"), 0.95)));
            node.set("title", PropertyValue::Annotated(new_annotated(json!("Engineer"), 0.7)));
            let mut d = Document::new();
            d.push(node);
            d
        };

        let result = diff(&a, &b);
        assert_eq!(result.unchanged.len(), 1);
        assert_eq!(result.unchanged[0].property_name, "name");
        assert_eq!(result.removed.len(), 1);
        assert_eq!(result.removed[0].property_name, "age");
        assert_eq!(result.added.len(), 1);
        assert_eq!(result.added[0].property_name, "title");
    }

    #[test]
    fn diff_modified_when_bare_values_differ() {
        let a = doc_with("ex:alice", "name", json!("Alice"), 0.9);
        let b = doc_with("ex:alice", "name", json!("A. Smith"), 0.9);
        let result = diff(&a, &b);
        assert_eq!(result.modified.len(), 1);
    }
}
