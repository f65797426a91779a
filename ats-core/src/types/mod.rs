//! Core data types shared across the engine.

pub mod alias;
pub mod attestation;
pub mod embedding;
pub mod filter;
pub mod watcher;

pub use alias::Alias;
pub use attestation::{Attestation, CreateAttestationCommand};
pub use embedding::{
    ClusterAssignment, ClusterCentroid, ClusterCentroidVector, ClusterEvent, ClusterEventType,
    ClusterIdentity, ClusterRun, ClusterSnapshot, ClusterStatus, ClusterTimelineEntry, Embedding,
    EmbeddingProjection, LabelEligibleCluster, ProjectionWithCluster, SemanticSearchHit,
    NOISE_CLUSTER_ID,
};
pub use filter::{Filter, OverComparison, OverOperator, OverUnit};
pub use watcher::Watcher;

use serde::{Deserialize, Serialize};

/// A named conflict between attestations, produced by the executor's
/// conflict-detection pass (§4.6 step 5, §9 Open Question). The default
/// implementation never produces any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// The attestation IDs involved in this conflict.
    pub attestation_ids: Vec<String>,
    /// A human-readable description of the conflict.
    pub description: String,
}

/// Per-facet totals computed over a query's result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacetSummary {
    /// Count of distinct subject values across the result set.
    pub distinct_subjects: usize,
    /// Count of distinct predicate values across the result set.
    pub distinct_predicates: usize,
    /// Count of distinct context values across the result set.
    pub distinct_contexts: usize,
    /// Count of distinct actor values across the result set.
    pub distinct_actors: usize,
}

/// The result of a query-executor pass (§4.6 step 5).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Matched attestations, ordered by `timestamp DESC`.
    pub attestations: Vec<Attestation>,
    /// Per-facet summary computed over `attestations`.
    pub summary: FacetSummary,
    /// Conflicts surfaced by the conflict-detection pass (possibly empty).
    pub conflicts: Vec<Conflict>,
}

impl QueryResult {
    /// Build a result, computing the facet summary from `attestations`.
    #[must_use]
    pub fn new(attestations: Vec<Attestation>, conflicts: Vec<Conflict>) -> Self {
        use std::collections::HashSet;

        let mut subjects = HashSet::new();
        let mut predicates = HashSet::new();
        let mut contexts = HashSet::new();
        let mut actors = HashSet::new();

        for a in &attestations {
            subjects.extend(a.subjects.iter().cloned());
            predicates.extend(a.predicates.iter().cloned());
            contexts.extend(a.contexts.iter().cloned());
            actors.extend(a.actors.iter().cloned());
        }

        let summary = FacetSummary {
            distinct_subjects: subjects.len(),
            distinct_predicates: predicates.len(),
            distinct_contexts: contexts.len(),
            distinct_actors: actors.len(),
        };

        Self {
            attestations,
            summary,
            conflicts,
        }
    }
}

/// The outcome of persisting one batch of ingestion items (§4.9).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistenceResult {
    /// Number of items persisted successfully.
    pub persisted_count: usize,
    /// Number of items that failed to persist.
    pub failure_count: usize,
    /// `persisted_count / (persisted_count + failure_count) * 100`, or `0.0`
    /// when no items were processed.
    pub success_rate: f64,
    /// Free-form error strings, one per failed item.
    pub errors: Vec<String>,
    /// Deduplicated predictive warnings, keyed by `actor|context`.
    pub warnings: Vec<crate::warnings::Warning>,
}

impl PersistenceResult {
    /// Recompute `success_rate` from `persisted_count`/`failure_count`.
    pub fn recompute_success_rate(&mut self) {
        let total = self.persisted_count + self.failure_count;
        self.success_rate = if total == 0 {
            0.0
        } else {
            (self.persisted_count as f64 / total as f64) * 100.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::attestation::Attestation;
    use chrono::Utc;

    fn attestation(subjects: Vec<&str>, predicates: Vec<&str>) -> Attestation {
        Attestation {
            id: "AS-1".to_string(),
            subjects: subjects.into_iter().map(str::to_string).collect(),
            predicates: predicates.into_iter().map(str::to_string).collect(),
            contexts: vec![],
            actors: vec![],
            timestamp: Utc::now(),
            source: "t".to_string(),
            attributes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn query_result_summary_counts_distinct_values() {
        let attestations = vec![
            attestation(vec!["ALICE"], vec!["speaks"]),
            attestation(vec!["ALICE", "BOB"], vec!["speaks"]),
        ];
        let result = QueryResult::new(attestations, vec![]);
        assert_eq!(result.summary.distinct_subjects, 2);
        assert_eq!(result.summary.distinct_predicates, 1);
    }

    #[test]
    fn success_rate_recomputes_as_percent() {
        let mut result = PersistenceResult {
            persisted_count: 3,
            failure_count: 1,
            ..Default::default()
        };
        result.recompute_success_rate();
        assert!((result.success_rate - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn success_rate_is_zero_for_no_items() {
        let mut result = PersistenceResult::default();
        result.recompute_success_rate();
        assert_eq!(result.success_rate, 0.0);
    }
}
