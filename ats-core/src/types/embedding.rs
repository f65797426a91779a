//! Dense-vector embeddings and their cluster lifecycle entities (§3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel `cluster_id` meaning "noise" (not assigned to any cluster).
pub const NOISE_CLUSTER_ID: i64 = -1;

/// A stored embedding row: a dense vector plus its logical pointer back to
/// the source record that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// 8-character opaque ID. Allocated on save if absent.
    pub id: String,
    /// Logical pointer: the kind of record this embedding represents.
    pub source_type: String,
    /// Logical pointer: the ID of the record this embedding represents.
    pub source_id: String,
    /// The raw text the embedding was computed from.
    pub text: String,
    /// The embedding vector, little-endian IEEE-754 f32 components.
    pub vector: Vec<f32>,
    /// Name of the model that produced this embedding.
    pub model: String,
    /// Number of dimensions (redundant with `vector.len()`, persisted
    /// explicitly per §6's schema).
    pub dimensions: usize,
    /// Assigned cluster, if any. A negative value encodes noise.
    pub cluster_id: Option<i64>,
    /// Membership probability within `cluster_id`, if assigned.
    pub cluster_probability: Option<f64>,
    /// When this row was first created.
    pub created_at: DateTime<Utc>,
    /// When this row was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Embedding {
    /// Serialize `vector` to its little-endian f32 byte blob.
    #[must_use]
    pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(vector.len() * 4);
        for v in vector {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Deserialize a little-endian f32 byte blob back to a vector.
    ///
    /// # Errors
    /// Returns an error message if `blob.len()` is not a multiple of 4.
    pub fn blob_to_vector(blob: &[u8]) -> Result<Vec<f32>, String> {
        if blob.len() % 4 != 0 {
            return Err(format!(
                "embedding blob length {} is not a multiple of 4",
                blob.len()
            ));
        }
        Ok(blob
            .chunks_exact(4)
            .map(|chunk| {
                let bytes: [u8; 4] = chunk.try_into().expect("chunks_exact(4) yields 4 bytes");
                f32::from_le_bytes(bytes)
            })
            .collect())
    }
}

/// A single nearest-neighbour search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticSearchHit {
    /// The matched embedding row.
    pub embedding: Embedding,
    /// L2 distance to the query vector.
    pub distance: f64,
    /// Similarity derived from distance, assuming L2-normalised inputs:
    /// `max(0, 1 - distance / 2)`.
    pub similarity: f64,
}

/// Input to a `predict_cluster` call: one known centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterCentroidVector {
    /// The cluster this centroid represents.
    pub cluster_id: i64,
    /// The centroid vector.
    pub vector: Vec<f32>,
}

/// A clustering run: one execution of an external clustering algorithm
/// whose outputs this engine persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRun {
    /// Identifier for this run.
    pub run_id: String,
    /// Number of embeddings fed into the run.
    pub input_size: usize,
    /// Number of clusters produced.
    pub output_cluster_count: usize,
    /// Number of points assigned to noise.
    pub noise_count: usize,
    /// The minimum-cluster-size parameter used for this run.
    pub min_cluster_size: usize,
    /// Wall-clock duration of the run, in milliseconds.
    pub duration_ms: Option<i64>,
    /// When this run was recorded.
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a cluster identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    /// The cluster is currently active.
    Active,
    /// The cluster has been dissolved; the transition is one-way.
    Dissolved,
}

/// A stable identity for a cluster across multiple clustering runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterIdentity {
    /// Auto-assigned integer ID.
    pub cluster_id: i64,
    /// Optional human label assigned by an external labelling worker.
    pub label: Option<String>,
    /// The run this cluster was first observed in.
    pub first_seen_run: String,
    /// The run this cluster was most recently observed in.
    pub last_seen_run: String,
    /// Current lifecycle status.
    pub status: ClusterStatus,
    /// When `label` was last set.
    pub labeled_at: Option<DateTime<Utc>>,
}

/// A per-(cluster, run) centroid snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// The cluster this snapshot belongs to.
    pub cluster_id: i64,
    /// The run this snapshot was captured in.
    pub run_id: String,
    /// The centroid vector at the time of this run.
    pub centroid: Vec<f32>,
    /// Number of members at the time of this run.
    pub member_count: usize,
}

/// The kind of lifecycle event a cluster experienced in a given run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterEventType {
    /// The cluster was newly observed in this run.
    Birth,
    /// The cluster disappeared in this run.
    Death,
    /// The cluster persisted unchanged in this run.
    Stable,
}

/// A per-(run, cluster) lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEvent {
    /// The run this event occurred in.
    pub run_id: String,
    /// The cluster this event concerns.
    pub cluster_id: i64,
    /// The kind of event.
    pub event_type: ClusterEventType,
    /// Similarity to the prior snapshot, if computed.
    pub similarity: Option<f64>,
}

/// The current best centroid for an active cluster. One row per cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCentroid {
    /// The cluster this centroid belongs to.
    pub cluster_id: i64,
    /// The centroid vector.
    pub centroid: Vec<f32>,
    /// When this centroid was last replaced.
    pub updated_at: DateTime<Utc>,
}

/// A batch cluster-assignment update for one embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    /// The embedding being (re)assigned.
    pub embedding_id: String,
    /// The cluster assigned, or a negative value for noise.
    pub cluster_id: i64,
    /// Membership probability within the assigned cluster.
    pub probability: f64,
}

/// A 2-D projection of an embedding, produced by an external dimensionality
/// reduction method (UMAP, PCA, ...), persisted for visualisation callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingProjection {
    /// The embedding this projection describes.
    pub embedding_id: String,
    /// The projection method name (e.g. `"umap"`).
    pub method: String,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
}

/// One row of the cluster timeline: a (run, cluster) pair with its
/// dominant event, ordered by run time ascending then cluster id ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterTimelineEntry {
    /// The run this entry belongs to.
    pub run_id: String,
    /// When the run was recorded.
    pub run_created_at: DateTime<Utc>,
    /// The cluster this entry concerns.
    pub cluster_id: i64,
    /// Member count recorded in the snapshot for this (run, cluster).
    pub member_count: usize,
    /// The dominant event type for this (run, cluster), if any was recorded.
    pub event_type: Option<ClusterEventType>,
}

/// A cluster that meets a labelling worker's eligibility threshold: at
/// least `min_size` members, and either never labelled or labelled before
/// the caller's cooldown cutoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEligibleCluster {
    /// The eligible cluster.
    pub cluster_id: i64,
    /// Current member count (embeddings assigned to this cluster).
    pub member_count: usize,
    /// Current human label, if any.
    pub label: Option<String>,
    /// When `label` was last set.
    pub labeled_at: Option<DateTime<Utc>>,
}

/// An embedding's 2-D projection joined with its current cluster
/// assignment, for visualisation callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionWithCluster {
    /// The embedding this projection describes.
    pub embedding_id: String,
    /// The projection method name (e.g. `"umap"`).
    pub method: String,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// The embedding's current cluster assignment, if any.
    pub cluster_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_blob_round_trips() {
        let vector = vec![1.0_f32, -2.5, 0.0, 3.25];
        let blob = Embedding::vector_to_blob(&vector);
        assert_eq!(blob.len(), 16);
        let restored = Embedding::blob_to_vector(&blob).unwrap();
        assert_eq!(restored, vector);
    }

    #[test]
    fn malformed_blob_length_is_rejected() {
        let err = Embedding::blob_to_vector(&[0u8, 1, 2]).unwrap_err();
        assert!(err.contains("multiple of 4"));
    }
}
