//! Backend and capability traits. `ats-core` is storage-agnostic: every
//! operation that touches persistence is expressed against one of the
//! `*Backend` traits here, and a concrete crate (e.g. `ats-storage-sqlite`)
//! supplies the implementation.
//!
//! The capability traits (`IdGenerator`, `QueryExpander`, `ActionDispatcher`,
//! `VectorIndex`, `FuzzyMatcher`) name seams the engine calls out to but does
//! not itself implement; callers wire in real implementations (an ID
//! generator, an LLM-backed query expander, an action dispatch loop) from
//! outside this crate.

use crate::error::Result;
use crate::query::QueryParam;
use crate::types::{
    Alias, Attestation, ClusterAssignment, ClusterCentroid, ClusterCentroidVector, ClusterEvent,
    ClusterIdentity, ClusterRun, ClusterSnapshot, ClusterTimelineEntry, Embedding,
    EmbeddingProjection, LabelEligibleCluster, ProjectionWithCluster, SemanticSearchHit, Watcher,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage operations over attestation rows.
#[async_trait]
pub trait AttestationBackend: Send + Sync {
    /// Insert a fully-formed attestation.
    async fn insert(&self, attestation: &Attestation) -> Result<()>;

    /// Fetch one attestation by ID.
    async fn get(&self, id: &str) -> Result<Option<Attestation>>;

    /// Run a parameterized WHERE-fragment query, returning at most `limit`
    /// rows ordered by `timestamp DESC`.
    async fn query(&self, where_sql: &str, params: &[QueryParam], limit: i64) -> Result<Vec<Attestation>>;

    /// Delete the named attestations. Not required to be atomic with any
    /// caller-side quota computation (§4.5).
    async fn delete_many(&self, ids: &[String]) -> Result<usize>;

    /// Count attestations sharing `actor` and `context` (§4.5 dimension 1).
    async fn count_actor_context(&self, actor: &str, context: &str) -> Result<i64>;

    /// List `(id, contexts, created_at)` for every attestation by `actor`,
    /// oldest first, used to enforce the per-actor distinct-contexts quota
    /// (§4.5 dimension 2).
    async fn actor_context_usage(&self, actor: &str) -> Result<Vec<(String, Vec<String>, DateTime<Utc>)>>;

    /// List `(id, actors, created_at)` for every attestation about `subject`,
    /// oldest first, used to enforce the per-subject distinct-actors quota
    /// (§4.5 dimension 3).
    async fn subject_actor_recency(&self, subject: &str) -> Result<Vec<(String, Vec<String>, DateTime<Utc>)>>;

    /// Count attestations created within `[start, end)`, used by the
    /// predictive warning pass (§4.5 step 5).
    async fn count_created_between(&self, actor: &str, context: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64>;
}

/// Storage operations over bidirectional alias edges.
#[async_trait]
pub trait AliasBackend: Send + Sync {
    /// Insert both directions of an alias edge in one write.
    async fn insert_pair(&self, forward: &Alias, reverse: &Alias) -> Result<()>;

    /// Resolve one hop from `identifier`, case-insensitively.
    async fn resolve_one(&self, identifier: &str) -> Result<Option<Alias>>;

    /// List every alias pointing at or from `identifier`.
    async fn all_for(&self, identifier: &str) -> Result<Vec<Alias>>;

    /// Remove every alias edge touching `identifier`, in both directions.
    async fn remove_all_for(&self, identifier: &str) -> Result<usize>;

    /// Remove only the edge(s) between `alias` and `target`, matched
    /// case-insensitively in either direction. Edges touching either
    /// identifier and some other identifier are left untouched.
    async fn remove_pair(&self, alias: &str, target: &str) -> Result<usize>;
}

/// Storage operations over embeddings and their cluster lifecycle.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Insert or replace an embedding row.
    async fn save(&self, embedding: &Embedding) -> Result<()>;

    /// Fetch the embedding for a given logical source, if one exists.
    async fn get_by_source(&self, source_type: &str, source_id: &str) -> Result<Option<Embedding>>;

    /// Nearest-neighbour search by L2 distance, returning at most `limit`
    /// hits ordered by ascending distance.
    async fn search_nearest(&self, query_vector: &[f32], limit: i64) -> Result<Vec<SemanticSearchHit>>;

    /// Delete the embedding for a given logical source.
    async fn delete_by_source(&self, source_type: &str, source_id: &str) -> Result<bool>;

    /// Load every known centroid, for in-process nearest-centroid prediction.
    async fn all_centroids(&self) -> Result<Vec<ClusterCentroidVector>>;

    /// Persist a clustering run record.
    async fn record_run(&self, run: &ClusterRun) -> Result<()>;

    /// Backfill `duration_ms` on an already-recorded run.
    async fn update_run_duration(&self, run_id: &str, duration_ms: i64) -> Result<()>;

    /// Atomically allocate a new cluster id and create its identity row,
    /// active and first/last seen at `run_id`.
    async fn create_cluster(&self, run_id: &str) -> Result<ClusterIdentity>;

    /// Upsert a cluster identity (first/last-seen run bookkeeping).
    async fn upsert_identity(&self, identity: &ClusterIdentity) -> Result<()>;

    /// Fetch a cluster identity by ID.
    async fn get_identity(&self, cluster_id: i64) -> Result<Option<ClusterIdentity>>;

    /// Persist a per-(cluster, run) snapshot.
    async fn save_snapshot(&self, snapshot: &ClusterSnapshot) -> Result<()>;

    /// Fetch the most recent snapshot recorded for a cluster, if any.
    async fn latest_snapshot(&self, cluster_id: i64) -> Result<Option<ClusterSnapshot>>;

    /// Record a lifecycle event for a (run, cluster) pair.
    async fn record_event(&self, event: &ClusterEvent) -> Result<()>;

    /// Replace the current-best centroid for a cluster.
    async fn upsert_centroid(&self, centroid: &ClusterCentroid) -> Result<()>;

    /// Apply a batch of cluster (re)assignments to embeddings.
    async fn apply_assignments(&self, assignments: &[ClusterAssignment]) -> Result<usize>;

    /// Persist a 2-D projection for an embedding.
    async fn save_projection(&self, projection: &EmbeddingProjection) -> Result<()>;

    /// Fetch the timeline of (run, cluster) events, ordered by run time then
    /// cluster id ascending.
    async fn timeline(&self) -> Result<Vec<ClusterTimelineEntry>>;

    /// Active clusters with at least `min_size` members whose `labeled_at`
    /// is null or older than `cooldown_before`, ordered by member count
    /// descending.
    async fn label_eligible_clusters(
        &self,
        min_size: usize,
        cooldown_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<LabelEligibleCluster>>;

    /// Every member text currently assigned to `cluster_id`, for uniform
    /// sampling by the caller.
    async fn member_texts(&self, cluster_id: i64) -> Result<Vec<String>>;

    /// All projections recorded under `method`, joined to each embedding's
    /// current cluster assignment.
    async fn projections_by_method(&self, method: &str) -> Result<Vec<ProjectionWithCluster>>;
}

/// Storage operations over persisted watchers.
#[async_trait]
pub trait WatcherBackend: Send + Sync {
    /// Insert a new watcher.
    async fn insert(&self, watcher: &Watcher) -> Result<()>;

    /// Fetch a watcher by ID.
    async fn get(&self, id: &str) -> Result<Option<Watcher>>;

    /// List every enabled watcher, for match evaluation against a new
    /// attestation.
    async fn list_enabled(&self) -> Result<Vec<Watcher>>;

    /// Record a fire (success or failure) against a watcher's counters.
    async fn record_fire(&self, id: &str, fired_at: DateTime<Utc>, error: Option<&str>) -> Result<()>;

    /// Enable or disable a watcher.
    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()>;

    /// Delete a watcher.
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// The facet values an [`IdGenerator`] may use to seed a vanity ID. The
/// generator's internal scheme is opaque to this crate (§6).
#[derive(Debug, Clone, Copy, Default)]
pub struct IdSeed<'a> {
    /// The attestation's subject, if known at generation time.
    pub subject: &'a str,
    /// The attestation's predicate, if known at generation time.
    pub predicate: &'a str,
    /// A free-form source/context prefix.
    pub source_prefix: &'a str,
    /// The actor seed (may be empty for a self-certifying attestation).
    pub actor_seed: &'a str,
}

/// Allocates opaque, collision-free attestation IDs. Implemented outside this
/// crate; the engine only calls through this seam (§4.3, Non-goals).
pub trait IdGenerator: Send + Sync {
    /// Allocate a new ID from the given seed fields.
    fn generate(&self, seed: IdSeed<'_>) -> String;
}

/// Maps natural-language predicates to predicate/context expansions. The
/// storage core never bakes in domain vocabulary; this is the only seam
/// that knows verbs (§4.6 step 2, §9 "Natural-language expansion").
pub trait QueryExpander: Send + Sync {
    /// Expand a natural-language `predicate` given its current filter
    /// `values` into concrete `(predicate, context)` pairs. An empty result
    /// means "not recognised"; the executor then treats `predicate`
    /// literally.
    fn expand_predicate(&self, predicate: &str, values: &[String]) -> Vec<(String, String)>;

    /// Predicate names permitted to carry a numeric value for the OVER
    /// filter (§4.2 `build_over_filter`).
    fn numeric_predicates(&self) -> Vec<String>;

    /// Predicate names this expander recognises as natural-language.
    fn natural_language_predicates(&self) -> Vec<String>;
}

/// A [`QueryExpander`] that recognises nothing; every predicate is treated
/// literally and the OVER whitelist is empty. Callers must tolerate this.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExpander;

impl QueryExpander for NullExpander {
    fn expand_predicate(&self, _predicate: &str, _values: &[String]) -> Vec<(String, String)> {
        Vec::new()
    }

    fn numeric_predicates(&self) -> Vec<String> {
        Vec::new()
    }

    fn natural_language_predicates(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Dispatches a watcher's action payload once its filter matches and its
/// rate limit admits the fire. Implemented outside this crate (§3, §4.5,
/// Non-goals: the dispatch loop itself is out of scope).
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Dispatch one watcher action. Errors are recorded against the
    /// watcher's `error_count`/`last_error` by the caller, not retried here.
    async fn dispatch(&self, watcher: &Watcher, attestation: &Attestation) -> Result<()>;
}

/// Finds fuzzy candidates for a query token against a vocabulary, used by
/// rich-text search (§4.8, §6). Scores are normalised to `[0, 1]`.
pub trait FuzzyMatcher: Send + Sync {
    /// Return up to `k` candidate words from `vocabulary` with score above
    /// `threshold`, best first.
    fn find_matches(&self, word: &str, vocabulary: &[String], k: usize, threshold: f64) -> Vec<(String, f64)>;
}

/// A [`FuzzyMatcher`] built on normalised Levenshtein similarity.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrsimFuzzyMatcher;

impl FuzzyMatcher for StrsimFuzzyMatcher {
    fn find_matches(&self, word: &str, vocabulary: &[String], k: usize, threshold: f64) -> Vec<(String, f64)> {
        let mut scored: Vec<(String, f64)> = vocabulary
            .iter()
            .map(|candidate| (candidate.clone(), strsim::normalized_levenshtein(word, candidate)))
            .filter(|(_, score)| *score >= threshold)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_expander_returns_nothing() {
        let expander = NullExpander;
        assert!(expander.expand_predicate("born_in", &[]).is_empty());
        assert!(expander.numeric_predicates().is_empty());
        assert!(expander.natural_language_predicates().is_empty());
    }

    #[test]
    fn strsim_matcher_ranks_closest_candidate_first() {
        let matcher = StrsimFuzzyMatcher;
        let vocabulary = vec!["fuzzy".to_string(), "buzzer".to_string(), "orange".to_string()];
        let matches = matcher.find_matches("fuzy", &vocabulary, 2, 0.3);
        assert_eq!(matches.first().map(|(w, _)| w.as_str()), Some("fuzzy"));
    }
}
