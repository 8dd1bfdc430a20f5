#![forbid(unsafe_code)]

//! Provider interfaces the compliance algebra's erasure and review-due
//! operators depend on, kept narrow and I/O-free: `LineageProvider` and
//! `ReviewScheduleProvider` are method bundles any adapter (a real
//! lineage store, a scheduling service) can implement, plus in-memory
//! reference implementations built on deterministic id→adjacency and
//! id→schedule maps.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use ca_compliance::{ComplianceError, ComplianceOpinion};
use ca_types::Opinion;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdapterError {
    #[error("erasure scope for {source_id:?} is empty after excluding exempt nodes")]
    EmptyScope { source_id: String },
    #[error(transparent)]
    Compliance(#[from] ComplianceError),
}

/// A DAG of dataset lineage: which datasets derive from which, each
/// node's erasure-completeness opinion, and the set of nodes exempt from
/// erasure (e.g. legal-hold, anonymized-beyond-re-identification).
pub trait LineageProvider {
    /// Direct and transitive children of `id`, breadth-first, deterministic order.
    fn descendants(&self, id: &str) -> Vec<String>;
    /// Direct and transitive parents of `id`, breadth-first, deterministic order.
    fn ancestors(&self, id: &str) -> Vec<String>;
    /// Erasure-completeness opinion for `id`. Implementations default to
    /// [`Opinion::vacuous`] for nodes with no recorded assessment.
    fn erasure_opinion(&self, id: &str) -> Opinion;
    /// Nodes exempt from erasure obligations.
    fn exempt_nodes(&self) -> BTreeSet<String>;
}

/// Maps assessment ids to their review cadence.
pub trait ReviewScheduleProvider {
    /// The next mandatory review time for `id`, if scheduled.
    fn review_due(&self, id: &str) -> Option<f64>;
    /// Normal review half-life for `id`.
    fn half_life(&self, id: &str) -> Option<f64>;
    /// Accelerated half-life applied once a review is overdue. Defaults
    /// to `half_life(id) / 4`, matching the reference schedule.
    fn accelerated_half_life(&self, id: &str) -> Option<f64> {
        self.half_life(id).map(|h| h / 4.0)
    }
}

fn bfs(adjacency: &BTreeMap<String, Vec<String>>, start: &str) -> Vec<String> {
    let mut visited: BTreeSet<String> = BTreeSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    let mut order = Vec::new();

    if let Some(children) = adjacency.get(start) {
        queue.extend(children.iter().cloned());
    }

    while let Some(node) = queue.pop_front() {
        if visited.insert(node.clone()) {
            order.push(node.clone());
            if let Some(children) = adjacency.get(&node) {
                for child in children {
                    if !visited.contains(child) {
                        queue.push_back(child.clone());
                    }
                }
            }
        }
    }

    order
}

/// An in-memory reference [`LineageProvider`]: an id→children adjacency
/// map (a `BTreeMap` for deterministic iteration when building the
/// reverse map for `ancestors`), an id→erasure-opinion map, and an exempt
/// set.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLineageGraph {
    children: BTreeMap<String, Vec<String>>,
    erasure_opinions: BTreeMap<String, Opinion>,
    exempt: BTreeSet<String>,
}

impl InMemoryLineageGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, parent: impl Into<String>, child: impl Into<String>) {
        self.children.entry(parent.into()).or_default().push(child.into());
    }

    pub fn set_erasure_opinion(&mut self, id: impl Into<String>, opinion: Opinion) {
        self.erasure_opinions.insert(id.into(), opinion);
    }

    pub fn mark_exempt(&mut self, id: impl Into<String>) {
        self.exempt.insert(id.into());
    }

    fn reverse_adjacency(&self) -> BTreeMap<String, Vec<String>> {
        let mut reverse: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (parent, kids) in &self.children {
            for kid in kids {
                reverse.entry(kid.clone()).or_default().push(parent.clone());
            }
        }
        reverse
    }
}

impl LineageProvider for InMemoryLineageGraph {
    fn descendants(&self, id: &str) -> Vec<String> {
        bfs(&self.children, id)
    }

    fn ancestors(&self, id: &str) -> Vec<String> {
        bfs(&self.reverse_adjacency(), id)
    }

    fn erasure_opinion(&self, id: &str) -> Opinion {
        self.erasure_opinions.get(id).copied().unwrap_or_else(Opinion::vacuous)
    }

    fn exempt_nodes(&self) -> BTreeSet<String> {
        self.exempt.clone()
    }
}

#[derive(Debug, Clone, Copy)]
struct ScheduleEntry {
    half_life: f64,
    accelerated_half_life: Option<f64>,
    review_due: Option<f64>,
}

/// An in-memory reference [`ReviewScheduleProvider`]: an id→schedule map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReviewSchedule {
    entries: BTreeMap<String, ScheduleEntry>,
}

impl InMemoryReviewSchedule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_schedule(&mut self, id: impl Into<String>, half_life: f64, review_due: Option<f64>) {
        self.entries.insert(
            id.into(),
            ScheduleEntry { half_life, accelerated_half_life: None, review_due },
        );
    }

    pub fn set_accelerated_half_life(&mut self, id: &str, accelerated_half_life: f64) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.accelerated_half_life = Some(accelerated_half_life);
        }
    }
}

impl ReviewScheduleProvider for InMemoryReviewSchedule {
    fn review_due(&self, id: &str) -> Option<f64> {
        self.entries.get(id).and_then(|e| e.review_due)
    }

    fn half_life(&self, id: &str) -> Option<f64> {
        self.entries.get(id).map(|e| e.half_life)
    }

    fn accelerated_half_life(&self, id: &str) -> Option<f64> {
        self.entries
            .get(id)
            .and_then(|e| e.accelerated_half_life.or(Some(e.half_life / 4.0)))
    }
}

/// Compute the erasure-scope compliance opinion for `source_id`: the
/// n-ary meet over the erasure opinions of `({source} ∪ descendants) −
/// exempt`, gathered in sorted-id order for determinism.
pub fn erasure_scope_assessment(
    source_id: &str,
    lineage: &impl LineageProvider,
) -> Result<ComplianceOpinion, AdapterError> {
    let exempt = lineage.exempt_nodes();

    let mut scope: BTreeSet<String> = lineage.descendants(source_id).into_iter().collect();
    scope.insert(source_id.to_owned());
    for id in &exempt {
        scope.remove(id);
    }

    if scope.is_empty() {
        return Err(AdapterError::EmptyScope { source_id: source_id.to_owned() });
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(source_id, scope_size = scope.len(), "assessing erasure scope");

    let opinions: Vec<Opinion> = scope.iter().map(|id| lineage.erasure_opinion(id)).collect();
    Ok(ca_compliance::erasure_scope_opinion(&opinions)?)
}

/// Compute residual contamination risk for `node_id` given its full
/// ancestor set (not filtered by exempt — contamination tracks data
/// persistence, which exemption doesn't erase).
pub fn contamination_risk(
    node_id: &str,
    lineage: &impl LineageProvider,
) -> Result<ComplianceOpinion, AdapterError> {
    let mut scope: BTreeSet<String> = lineage.ancestors(node_id).into_iter().collect();
    scope.insert(node_id.to_owned());

    let opinions: Vec<Opinion> = scope.iter().map(|id| lineage.erasure_opinion(id)).collect();
    Ok(ca_compliance::residual_contamination(&opinions)?)
}

#[cfg(test)]
mod tests {
    use ca_types::Opinion;

    use super::{
        AdapterError, InMemoryLineageGraph, InMemoryReviewSchedule, LineageProvider, ReviewScheduleProvider,
        contamination_risk, erasure_scope_assessment,
    };

    fn op(l: f64, v: f64, u: f64) -> Opinion {
        Opinion::new(l, v, u, 0.5).unwrap()
    }

    #[test]
    fn descendants_are_breadth_first_and_deterministic() {
        let mut graph = InMemoryLineageGraph::new();
        graph.add_edge("root", "a");
        graph.add_edge("root", "b");
        graph.add_edge("a", "c");

        assert_eq!(graph.descendants("root"), vec!["a", "b", "c"]);
    }

    #[test]
    fn ancestors_traverse_reverse_adjacency() {
        let mut graph = InMemoryLineageGraph::new();
        graph.add_edge("root", "a");
        graph.add_edge("a", "leaf");

        assert_eq!(graph.ancestors("leaf"), vec!["a", "root"]);
    }

    #[test]
    fn unknown_node_erasure_opinion_defaults_to_vacuous() {
        let graph = InMemoryLineageGraph::new();
        assert_eq!(graph.erasure_opinion("unknown"), Opinion::vacuous());
    }

    #[test]
    fn erasure_scope_excludes_exempt_nodes() {
        let mut graph = InMemoryLineageGraph::new();
        graph.add_edge("root", "a");
        graph.add_edge("root", "b");
        graph.set_erasure_opinion("root", op(0.9, 0.05, 0.05));
        graph.set_erasure_opinion("a", op(0.9, 0.05, 0.05));
        graph.set_erasure_opinion("b", op(0.2, 0.7, 0.1));
        graph.mark_exempt("b");

        let assessment = erasure_scope_assessment("root", &graph).unwrap();
        assert!(assessment.lawfulness() > 0.5);
    }

    #[test]
    fn erasure_scope_empty_after_exempting_everything_errors() {
        let mut graph = InMemoryLineageGraph::new();
        graph.mark_exempt("root");
        assert!(matches!(
            erasure_scope_assessment("root", &graph),
            Err(AdapterError::EmptyScope { .. })
        ));
    }

    #[test]
    fn contamination_risk_ignores_exemption() {
        let mut graph = InMemoryLineageGraph::new();
        graph.add_edge("root", "leaf");
        graph.set_erasure_opinion("root", op(0.9, 0.05, 0.05));
        graph.set_erasure_opinion("leaf", op(0.9, 0.05, 0.05));
        graph.mark_exempt("root");

        let risk = contamination_risk("leaf", &graph).unwrap();
        let total = risk.lawfulness() + risk.violation() + risk.uncertainty();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn review_schedule_accelerated_half_life_defaults_to_quarter() {
        let mut schedule = InMemoryReviewSchedule::new();
        schedule.set_schedule("assessment-1", 40.0, Some(100.0));
        assert_eq!(schedule.accelerated_half_life("assessment-1"), Some(10.0));
        assert_eq!(schedule.review_due("assessment-1"), Some(100.0));
    }

    #[test]
    fn review_schedule_accelerated_half_life_can_be_overridden() {
        let mut schedule = InMemoryReviewSchedule::new();
        schedule.set_schedule("assessment-1", 40.0, None);
        schedule.set_accelerated_half_life("assessment-1", 5.0);
        assert_eq!(schedule.accelerated_half_life("assessment-1"), Some(5.0));
    }

    #[test]
    fn review_schedule_unknown_id_returns_none() {
        let schedule = InMemoryReviewSchedule::new();
        assert_eq!(schedule.half_life("unknown"), None);
        assert_eq!(schedule.accelerated_half_life("unknown"), None);
    }
}
