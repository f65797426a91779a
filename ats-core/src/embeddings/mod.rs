//! Dense-vector persistence, nearest-neighbour search, and cluster lifecycle
//! management (§4.7). Clustering algorithms themselves are out of scope;
//! this module only persists their outputs and reads them back.

use crate::error::{Error, Result};
use crate::traits::EmbeddingBackend;
use crate::types::{
    ClusterAssignment, ClusterCentroid, ClusterCentroidVector, ClusterEvent, ClusterEventType,
    ClusterIdentity, ClusterRun, ClusterSnapshot, ClusterStatus, ClusterTimelineEntry, Embedding,
    EmbeddingProjection, LabelEligibleCluster, ProjectionWithCluster, SemanticSearchHit,
    NOISE_CLUSTER_ID,
};
use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Length of a generated embedding ID.
const EMBEDDING_ID_LEN: usize = 8;
const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn random_embedding_id() -> String {
    let mut rng = rand::rng();
    (0..EMBEDDING_ID_LEN)
        .map(|_| {
            let idx = rand::Rng::random_range(&mut rng, 0..ID_ALPHABET.len());
            ID_ALPHABET[idx] as char
        })
        .collect()
}

/// Orchestrates embedding persistence and cluster lifecycle bookkeeping over
/// an [`EmbeddingBackend`].
pub struct EmbeddingStore<B> {
    backend: Arc<B>,
}

impl<B: EmbeddingBackend> EmbeddingStore<B> {
    /// Wrap `backend`.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Save an embedding, allocating an ID if `embedding.id` is empty.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn save(&self, mut embedding: Embedding) -> Result<Embedding> {
        if embedding.id.is_empty() {
            embedding.id = random_embedding_id();
        }
        embedding.dimensions = embedding.vector.len();
        self.backend.save(&embedding).await?;
        Ok(embedding)
    }

    /// Save a batch of embeddings. Semantics match repeated [`Self::save`]
    /// calls; the backend is responsible for wrapping this in a single
    /// transaction.
    ///
    /// # Errors
    /// Propagates any backend error; no partial-success reporting.
    pub async fn batch_save(&self, embeddings: Vec<Embedding>) -> Result<Vec<Embedding>> {
        let mut saved = Vec::with_capacity(embeddings.len());
        for embedding in embeddings {
            saved.push(self.save(embedding).await?);
        }
        Ok(saved)
    }

    /// Fetch the embedding for a logical source, if one exists.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn get_by_source(&self, source_type: &str, source_id: &str) -> Result<Option<Embedding>> {
        self.backend.get_by_source(source_type, source_id).await
    }

    /// Nearest-neighbour search by L2 distance. Results below `threshold`
    /// similarity are dropped; `limit <= 0` yields the component default.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn semantic_search(
        &self,
        query_vector: &[f32],
        limit: i64,
        threshold: f64,
    ) -> Result<Vec<SemanticSearchHit>> {
        let limit = if limit <= 0 { crate::constants::DEFAULT_SEMANTIC_SEARCH_LIMIT } else { limit };
        let hits = self.backend.search_nearest(query_vector, limit).await?;
        Ok(hits.into_iter().filter(|hit| hit.similarity >= threshold).collect())
    }

    /// Delete the embedding for a logical source.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn delete_by_source(&self, source_type: &str, source_id: &str) -> Result<bool> {
        self.backend.delete_by_source(source_type, source_id).await
    }

    /// Argmax over centroid cosine similarity; returns the noise sentinel
    /// when the best similarity is below `threshold` or there are no
    /// centroids.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn predict_cluster(&self, vector: &[f32], threshold: f64) -> Result<i64> {
        let centroids = self.backend.all_centroids().await?;
        Ok(predict_cluster_over(vector, &centroids, threshold))
    }

    /// Record a clustering run.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn create_run(&self, run: &ClusterRun) -> Result<()> {
        self.backend.record_run(run).await
    }

    /// Backfill `duration_ms` on an already-recorded run.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn update_run_duration(&self, run_id: &str, duration_ms: i64) -> Result<()> {
        self.backend.update_run_duration(run_id, duration_ms).await
    }

    /// Create a new active cluster identity, first/last seen at `run_id`.
    /// The cluster id is allocated by the store, atomically against
    /// concurrent creators.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn create_cluster(&self, run_id: &str) -> Result<ClusterIdentity> {
        self.backend.create_cluster(run_id).await
    }

    /// Update `last_seen_run` for an existing cluster identity.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the cluster is unknown, or propagates
    /// any backend error.
    pub async fn update_cluster_last_seen(&self, cluster_id: i64, run_id: &str) -> Result<()> {
        let mut identity = self
            .backend
            .get_identity(cluster_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("cluster {cluster_id}")))?;
        identity.last_seen_run = run_id.to_string();
        self.backend.upsert_identity(&identity).await
    }

    /// Transition a cluster to `Dissolved`. One-way: dissolving an already
    /// dissolved cluster is a no-op.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the cluster is unknown, or propagates
    /// any backend error.
    pub async fn dissolve_cluster(&self, cluster_id: i64) -> Result<()> {
        let mut identity = self
            .backend
            .get_identity(cluster_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("cluster {cluster_id}")))?;
        identity.status = ClusterStatus::Dissolved;
        self.backend.upsert_identity(&identity).await
    }

    /// Set a cluster's human label and stamp `labeled_at = now`.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the cluster is unknown, or propagates
    /// any backend error.
    pub async fn update_cluster_label(&self, cluster_id: i64, label: String) -> Result<()> {
        let mut identity = self
            .backend
            .get_identity(cluster_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("cluster {cluster_id}")))?;
        identity.label = Some(label);
        identity.labeled_at = Some(Utc::now());
        self.backend.upsert_identity(&identity).await
    }

    /// Active clusters with at least `min_size` members whose label is null
    /// or older than `cooldown_days`, ordered by member count descending.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn get_label_eligible_clusters(
        &self,
        min_size: usize,
        cooldown_days: i64,
        limit: i64,
    ) -> Result<Vec<LabelEligibleCluster>> {
        let cooldown_before = Utc::now() - Duration::days(cooldown_days);
        self.backend.label_eligible_clusters(min_size, cooldown_before, limit).await
    }

    /// Persist a batch of per-(cluster, run) snapshots.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn save_cluster_snapshots(&self, snapshots: &[ClusterSnapshot]) -> Result<()> {
        for snapshot in snapshots {
            self.backend.save_snapshot(snapshot).await?;
        }
        Ok(())
    }

    /// Record a batch of lifecycle events.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn record_cluster_events(&self, events: &[ClusterEvent]) -> Result<()> {
        for event in events {
            self.backend.record_event(event).await?;
        }
        Ok(())
    }

    /// Replace the current-best centroid rows.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn save_cluster_centroids(&self, centroids: &[(i64, Vec<f32>)]) -> Result<()> {
        let now = Utc::now();
        for (cluster_id, centroid) in centroids {
            self.backend
                .upsert_centroid(&ClusterCentroid {
                    cluster_id: *cluster_id,
                    centroid: centroid.clone(),
                    updated_at: now,
                })
                .await?;
        }
        Ok(())
    }

    /// Apply a batch of `(cluster_id, probability)` assignments to
    /// embeddings. A negative `cluster_id` encodes noise.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn update_cluster_assignments(&self, assignments: &[ClusterAssignment]) -> Result<usize> {
        self.backend.apply_assignments(assignments).await
    }

    /// Upsert a 2-D projection for an embedding.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn update_projection(&self, projection: &EmbeddingProjection) -> Result<()> {
        self.backend.save_projection(projection).await
    }

    /// One row per (run, cluster), ordered by run time ascending then
    /// cluster id ascending, carrying the dominant event type if recorded.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn get_cluster_timeline(&self) -> Result<Vec<ClusterTimelineEntry>> {
        self.backend.timeline().await
    }

    /// Uniform-random sample of up to `n` member texts for a cluster.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn sample_cluster_texts(&self, cluster_id: i64, n: usize) -> Result<Vec<String>> {
        let mut pool = self.backend.member_texts(cluster_id).await?;
        let mut rng = rand::rng();
        pool.shuffle(&mut rng);
        pool.truncate(n);
        Ok(pool)
    }

    /// All projections recorded under `method`, joined to each embedding's
    /// current cluster assignment, for visualisation callers.
    ///
    /// # Errors
    /// Propagates any backend error.
    pub async fn get_projections_by_method(&self, method: &str) -> Result<Vec<ProjectionWithCluster>> {
        self.backend.projections_by_method(method).await
    }
}

/// Argmax over centroid cosine similarity. Returns [`NOISE_CLUSTER_ID`] when
/// `centroids` is empty or the best similarity is below `threshold`.
#[must_use]
pub fn predict_cluster_over(vector: &[f32], centroids: &[ClusterCentroidVector], threshold: f64) -> i64 {
    let mut best: Option<(i64, f64)> = None;
    for centroid in centroids {
        let similarity = cosine_similarity(vector, &centroid.vector);
        if best.is_none_or(|(_, best_sim)| similarity > best_sim) {
            best = Some((centroid.cluster_id, similarity));
        }
    }
    match best {
        Some((cluster_id, similarity)) if similarity >= threshold => cluster_id,
        _ => NOISE_CLUSTER_ID,
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeBackend {
        identities: Mutex<Vec<ClusterIdentity>>,
        texts: Mutex<Vec<(i64, String)>>,
        next_id: std::sync::atomic::AtomicI64,
    }

    #[async_trait]
    impl EmbeddingBackend for FakeBackend {
        async fn save(&self, _: &Embedding) -> Result<()> {
            unimplemented!()
        }
        async fn get_by_source(&self, _: &str, _: &str) -> Result<Option<Embedding>> {
            unimplemented!()
        }
        async fn search_nearest(&self, _: &[f32], _: i64) -> Result<Vec<SemanticSearchHit>> {
            unimplemented!()
        }
        async fn delete_by_source(&self, _: &str, _: &str) -> Result<bool> {
            unimplemented!()
        }
        async fn all_centroids(&self) -> Result<Vec<ClusterCentroidVector>> {
            Ok(Vec::new())
        }
        async fn record_run(&self, _: &ClusterRun) -> Result<()> {
            Ok(())
        }
        async fn update_run_duration(&self, _: &str, _: i64) -> Result<()> {
            Ok(())
        }
        async fn create_cluster(&self, run_id: &str) -> Result<ClusterIdentity> {
            let cluster_id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            let identity = ClusterIdentity {
                cluster_id,
                label: None,
                first_seen_run: run_id.to_string(),
                last_seen_run: run_id.to_string(),
                status: ClusterStatus::Active,
                labeled_at: None,
            };
            self.identities.lock().unwrap().push(identity.clone());
            Ok(identity)
        }
        async fn upsert_identity(&self, identity: &ClusterIdentity) -> Result<()> {
            let mut identities = self.identities.lock().unwrap();
            identities.retain(|i| i.cluster_id != identity.cluster_id);
            identities.push(identity.clone());
            Ok(())
        }
        async fn get_identity(&self, cluster_id: i64) -> Result<Option<ClusterIdentity>> {
            Ok(self.identities.lock().unwrap().iter().find(|i| i.cluster_id == cluster_id).cloned())
        }
        async fn save_snapshot(&self, _: &ClusterSnapshot) -> Result<()> {
            Ok(())
        }
        async fn latest_snapshot(&self, _: i64) -> Result<Option<ClusterSnapshot>> {
            Ok(None)
        }
        async fn record_event(&self, _: &ClusterEvent) -> Result<()> {
            Ok(())
        }
        async fn upsert_centroid(&self, _: &ClusterCentroid) -> Result<()> {
            Ok(())
        }
        async fn apply_assignments(&self, _: &[ClusterAssignment]) -> Result<usize> {
            Ok(0)
        }
        async fn save_projection(&self, _: &EmbeddingProjection) -> Result<()> {
            Ok(())
        }
        async fn timeline(&self) -> Result<Vec<ClusterTimelineEntry>> {
            Ok(Vec::new())
        }
        async fn label_eligible_clusters(
            &self,
            _: usize,
            _: chrono::DateTime<Utc>,
            _: i64,
        ) -> Result<Vec<LabelEligibleCluster>> {
            Ok(Vec::new())
        }
        async fn member_texts(&self, cluster_id: i64) -> Result<Vec<String>> {
            Ok(self
                .texts
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _)| *id == cluster_id)
                .map(|(_, t)| t.clone())
                .collect())
        }
        async fn projections_by_method(&self, _: &str) -> Result<Vec<ProjectionWithCluster>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn create_cluster_allocates_distinct_ids() {
        let store = EmbeddingStore::new(Arc::new(FakeBackend::default()));
        let first = store.create_cluster("run-1").await.unwrap();
        let second = store.create_cluster("run-1").await.unwrap();
        assert_ne!(first.cluster_id, second.cluster_id);
        assert_eq!(first.status, ClusterStatus::Active);
    }

    #[tokio::test]
    async fn update_cluster_label_stamps_labeled_at() {
        let backend = Arc::new(FakeBackend::default());
        backend
            .upsert_identity(&ClusterIdentity {
                cluster_id: 1,
                label: None,
                first_seen_run: "run-1".to_string(),
                last_seen_run: "run-1".to_string(),
                status: ClusterStatus::Active,
                labeled_at: None,
            })
            .await
            .unwrap();
        let store = EmbeddingStore::new(backend.clone());

        store.update_cluster_label(1, "travel".to_string()).await.unwrap();

        let identity = backend.get_identity(1).await.unwrap().unwrap();
        assert_eq!(identity.label, Some("travel".to_string()));
        assert!(identity.labeled_at.is_some());
    }

    #[tokio::test]
    async fn update_cluster_label_missing_cluster_is_not_found() {
        let store = EmbeddingStore::new(Arc::new(FakeBackend::default()));
        let err = store.update_cluster_label(99, "x".to_string()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn sample_cluster_texts_truncates_to_n_and_ignores_other_clusters() {
        let backend = Arc::new(FakeBackend::default());
        {
            let mut texts = backend.texts.lock().unwrap();
            texts.push((1, "a".to_string()));
            texts.push((1, "b".to_string()));
            texts.push((1, "c".to_string()));
            texts.push((2, "other".to_string()));
        }
        let store = EmbeddingStore::new(backend);

        let sample = store.sample_cluster_texts(1, 2).await.unwrap();
        assert_eq!(sample.len(), 2);
        assert!(sample.iter().all(|t| t != "other"));
    }

    #[test]
    fn predict_cluster_returns_noise_when_no_centroids() {
        assert_eq!(predict_cluster_over(&[1.0, 0.0], &[], 0.5), NOISE_CLUSTER_ID);
    }

    #[test]
    fn predict_cluster_returns_best_match_above_threshold() {
        let centroids = vec![
            ClusterCentroidVector { cluster_id: 1, vector: vec![1.0, 0.0] },
            ClusterCentroidVector { cluster_id: 2, vector: vec![0.0, 1.0] },
        ];
        assert_eq!(predict_cluster_over(&[1.0, 0.0], &centroids, 0.9), 1);
    }

    #[test]
    fn predict_cluster_returns_noise_below_threshold() {
        let centroids = vec![ClusterCentroidVector { cluster_id: 1, vector: vec![0.0, 1.0] }];
        assert_eq!(predict_cluster_over(&[1.0, 0.0], &centroids, 0.5), NOISE_CLUSTER_ID);
    }
}
