//! [`EmbeddingBackend`] over the `embeddings` table and its cluster
//! lifecycle satellite tables.
//!
//! Nearest-neighbour search is a brute-force L2 scan over `vec_embeddings`
//! in Rust, not a native vector index — the portable fallback described in
//! `schema::CREATE_VEC_EMBEDDINGS_TABLE`.

use crate::codec::{from_unix_seconds, to_unix_seconds};
use crate::SqliteStorage;
use ats_core::traits::EmbeddingBackend;
use ats_core::types::{
    ClusterAssignment, ClusterCentroid, ClusterCentroidVector, ClusterEvent, ClusterEventType,
    ClusterIdentity, ClusterRun, ClusterSnapshot, ClusterStatus, ClusterTimelineEntry, Embedding,
    EmbeddingProjection, LabelEligibleCluster, ProjectionWithCluster, SemanticSearchHit,
};
use ats_core::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::Connection;

fn row_to_embedding(row: &libsql::Row) -> ats_core::Result<Embedding> {
    let id: String = row.get(0).map_err(|e| Error::backend("row_to_embedding", e.to_string()))?;
    let source_type: String = row.get(1).map_err(|e| Error::backend("row_to_embedding", e.to_string()))?;
    let source_id: String = row.get(2).map_err(|e| Error::backend("row_to_embedding", e.to_string()))?;
    let text: String = row.get(3).map_err(|e| Error::backend("row_to_embedding", e.to_string()))?;
    let blob: Vec<u8> = row.get(4).map_err(|e| Error::backend("row_to_embedding", e.to_string()))?;
    let model: String = row.get(5).map_err(|e| Error::backend("row_to_embedding", e.to_string()))?;
    let dimensions: i64 = row.get(6).map_err(|e| Error::backend("row_to_embedding", e.to_string()))?;
    let cluster_id: Option<i64> = row.get(7).map_err(|e| Error::backend("row_to_embedding", e.to_string()))?;
    let cluster_probability: Option<f64> = row.get(8).map_err(|e| Error::backend("row_to_embedding", e.to_string()))?;
    let created_at: i64 = row.get(9).map_err(|e| Error::backend("row_to_embedding", e.to_string()))?;
    let updated_at: i64 = row.get(10).map_err(|e| Error::backend("row_to_embedding", e.to_string()))?;

    let vector = Embedding::blob_to_vector(&blob).map_err(|msg| Error::backend("row_to_embedding", msg))?;

    Ok(Embedding {
        id,
        source_type,
        source_id,
        text,
        vector,
        model,
        dimensions: dimensions as usize,
        cluster_id,
        cluster_probability,
        created_at: from_unix_seconds(created_at, "created_at")?,
        updated_at: from_unix_seconds(updated_at, "updated_at")?,
    })
}

async fn fetch_embedding_by_id(conn: &Connection, id: &str) -> ats_core::Result<Option<Embedding>> {
    let mut rows = conn
        .query(
            "SELECT id, source_type, source_id, text, embedding, model, dimensions, \
             cluster_id, cluster_probability, created_at, updated_at FROM embeddings WHERE id = ?",
            libsql::params![id.to_string()],
        )
        .await
        .map_err(|e| Error::backend("fetch_embedding_by_id", e.to_string()))?;

    match rows.next().await.map_err(|e| Error::backend("fetch_embedding_by_id", e.to_string()))? {
        Some(row) => Ok(Some(row_to_embedding(&row)?)),
        None => Ok(None),
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x - *y).powi(2))
        .sum::<f64>()
        .sqrt()
}

const fn status_to_str(status: ClusterStatus) -> &'static str {
    match status {
        ClusterStatus::Active => "active",
        ClusterStatus::Dissolved => "dissolved",
    }
}

fn str_to_status(s: &str) -> ats_core::Result<ClusterStatus> {
    match s {
        "active" => Ok(ClusterStatus::Active),
        "dissolved" => Ok(ClusterStatus::Dissolved),
        other => Err(Error::backend("decode_cluster_status", format!("unknown cluster status `{other}`"))),
    }
}

const fn event_type_to_str(event: ClusterEventType) -> &'static str {
    match event {
        ClusterEventType::Birth => "birth",
        ClusterEventType::Death => "death",
        ClusterEventType::Stable => "stable",
    }
}

fn str_to_event_type(s: &str) -> ats_core::Result<ClusterEventType> {
    match s {
        "birth" => Ok(ClusterEventType::Birth),
        "death" => Ok(ClusterEventType::Death),
        "stable" => Ok(ClusterEventType::Stable),
        other => Err(Error::backend("decode_cluster_event_type", format!("unknown event type `{other}`"))),
    }
}

#[async_trait]
impl EmbeddingBackend for SqliteStorage {
    async fn save(&self, embedding: &Embedding) -> ats_core::Result<()> {
        let embedding = embedding.clone();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let blob = Embedding::vector_to_blob(&embedding.vector);

            let tx = conn.transaction().await.map_err(|e| Error::backend("save_embedding", e.to_string()))?;

            tx.execute(
                "INSERT OR REPLACE INTO embeddings \
                 (id, source_type, source_id, text, embedding, model, dimensions, cluster_id, cluster_probability, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    embedding.id.clone(),
                    embedding.source_type.clone(),
                    embedding.source_id.clone(),
                    embedding.text.clone(),
                    blob.clone(),
                    embedding.model.clone(),
                    embedding.dimensions as i64,
                    embedding.cluster_id,
                    embedding.cluster_probability,
                    to_unix_seconds(embedding.created_at),
                    to_unix_seconds(embedding.updated_at),
                ],
            )
            .await
            .map_err(|e| Error::backend("save_embedding", e.to_string()))?;

            tx.execute(
                "INSERT OR REPLACE INTO vec_embeddings (embedding_id, embedding) VALUES (?, ?)",
                libsql::params![embedding.id.clone(), blob],
            )
            .await
            .map_err(|e| Error::backend("save_embedding", e.to_string()))?;

            tx.commit().await.map_err(|e| Error::backend("save_embedding", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn get_by_source(&self, source_type: &str, source_id: &str) -> ats_core::Result<Option<Embedding>> {
        let source_type = source_type.to_string();
        let source_id = source_id.to_string();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query(
                    "SELECT id, source_type, source_id, text, embedding, model, dimensions, \
                     cluster_id, cluster_probability, created_at, updated_at \
                     FROM embeddings WHERE source_type = ? AND source_id = ?",
                    libsql::params![source_type, source_id],
                )
                .await
                .map_err(|e| Error::backend("get_embedding_by_source", e.to_string()))?;

            match rows.next().await.map_err(|e| Error::backend("get_embedding_by_source", e.to_string()))? {
                Some(row) => Ok(Some(row_to_embedding(&row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn search_nearest(&self, query_vector: &[f32], limit: i64) -> ats_core::Result<Vec<SemanticSearchHit>> {
        let query_vector = query_vector.to_vec();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query("SELECT embedding_id, embedding FROM vec_embeddings", ())
                .await
                .map_err(|e| Error::backend("search_nearest", e.to_string()))?;

            let mut distances: Vec<(String, f64)> = Vec::new();
            while let Some(row) = rows.next().await.map_err(|e| Error::backend("search_nearest", e.to_string()))? {
                let id: String = row.get(0).map_err(|e| Error::backend("search_nearest", e.to_string()))?;
                let blob: Vec<u8> = row.get(1).map_err(|e| Error::backend("search_nearest", e.to_string()))?;
                let vector = Embedding::blob_to_vector(&blob).map_err(|msg| Error::backend("search_nearest", msg))?;
                distances.push((id, l2_distance(&query_vector, &vector)));
            }

            distances.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            distances.truncate(limit.max(0) as usize);

            let mut hits = Vec::with_capacity(distances.len());
            for (id, distance) in distances {
                if let Some(embedding) = fetch_embedding_by_id(conn, &id).await? {
                    let similarity = (1.0 - distance / 2.0).max(0.0);
                    hits.push(SemanticSearchHit { embedding, distance, similarity });
                }
            }
            Ok(hits)
        })
        .await
    }

    async fn delete_by_source(&self, source_type: &str, source_id: &str) -> ats_core::Result<bool> {
        let source_type = source_type.to_string();
        let source_id = source_id.to_string();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query(
                    "SELECT id FROM embeddings WHERE source_type = ? AND source_id = ?",
                    libsql::params![source_type, source_id],
                )
                .await
                .map_err(|e| Error::backend("delete_embedding", e.to_string()))?;

            let Some(row) = rows.next().await.map_err(|e| Error::backend("delete_embedding", e.to_string()))? else {
                return Ok(false);
            };
            let id: String = row.get(0).map_err(|e| Error::backend("delete_embedding", e.to_string()))?;

            let tx = conn.transaction().await.map_err(|e| Error::backend("delete_embedding", e.to_string()))?;
            tx.execute("DELETE FROM embeddings WHERE id = ?", libsql::params![id.clone()])
                .await
                .map_err(|e| Error::backend("delete_embedding", e.to_string()))?;
            tx.execute("DELETE FROM vec_embeddings WHERE embedding_id = ?", libsql::params![id])
                .await
                .map_err(|e| Error::backend("delete_embedding", e.to_string()))?;
            tx.commit().await.map_err(|e| Error::backend("delete_embedding", e.to_string()))?;

            Ok(true)
        })
        .await
    }

    async fn all_centroids(&self) -> ats_core::Result<Vec<ClusterCentroidVector>> {
        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query("SELECT cluster_id, centroid FROM cluster_centroids", ())
                .await
                .map_err(|e| Error::backend("all_centroids", e.to_string()))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next().await.map_err(|e| Error::backend("all_centroids", e.to_string()))? {
                let cluster_id: i64 = row.get(0).map_err(|e| Error::backend("all_centroids", e.to_string()))?;
                let blob: Vec<u8> = row.get(1).map_err(|e| Error::backend("all_centroids", e.to_string()))?;
                let vector = Embedding::blob_to_vector(&blob).map_err(|msg| Error::backend("all_centroids", msg))?;
                out.push(ClusterCentroidVector { cluster_id, vector });
            }
            Ok(out)
        })
        .await
    }

    async fn record_run(&self, run: &ClusterRun) -> ats_core::Result<()> {
        let run = run.clone();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            conn.execute(
                "INSERT OR REPLACE INTO cluster_runs \
                 (id, input_size, output_cluster_count, noise_count, min_cluster_size, duration_ms, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    run.run_id,
                    run.input_size as i64,
                    run.output_cluster_count as i64,
                    run.noise_count as i64,
                    run.min_cluster_size as i64,
                    run.duration_ms,
                    to_unix_seconds(run.created_at),
                ],
            )
            .await
            .map_err(|e| Error::backend("record_run", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn update_run_duration(&self, run_id: &str, duration_ms: i64) -> ats_core::Result<()> {
        let run_id = run_id.to_string();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            conn.execute(
                "UPDATE cluster_runs SET duration_ms = ? WHERE id = ?",
                libsql::params![duration_ms, run_id],
            )
            .await
            .map_err(|e| Error::backend("update_run_duration", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn create_cluster(&self, run_id: &str) -> ats_core::Result<ClusterIdentity> {
        let run_id = run_id.to_string();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            conn.execute(
                "INSERT INTO clusters (label, first_seen_run, last_seen_run, status, labeled_at) \
                 VALUES (NULL, ?, ?, 'active', NULL)",
                libsql::params![run_id.clone(), run_id.clone()],
            )
            .await
            .map_err(|e| Error::backend("create_cluster", e.to_string()))?;

            let cluster_id = conn.last_insert_rowid();
            Ok(ClusterIdentity {
                cluster_id,
                label: None,
                first_seen_run: run_id.clone(),
                last_seen_run: run_id,
                status: ClusterStatus::Active,
                labeled_at: None,
            })
        })
        .await
    }

    async fn upsert_identity(&self, identity: &ClusterIdentity) -> ats_core::Result<()> {
        let identity = identity.clone();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            conn.execute(
                "INSERT OR REPLACE INTO clusters (id, label, first_seen_run, last_seen_run, status, labeled_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
                libsql::params![
                    identity.cluster_id,
                    identity.label,
                    identity.first_seen_run,
                    identity.last_seen_run,
                    status_to_str(identity.status),
                    identity.labeled_at.map(to_unix_seconds),
                ],
            )
            .await
            .map_err(|e| Error::backend("upsert_identity", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn get_identity(&self, cluster_id: i64) -> ats_core::Result<Option<ClusterIdentity>> {
        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query(
                    "SELECT id, label, first_seen_run, last_seen_run, status, labeled_at FROM clusters WHERE id = ?",
                    libsql::params![cluster_id],
                )
                .await
                .map_err(|e| Error::backend("get_identity", e.to_string()))?;

            let Some(row) = rows.next().await.map_err(|e| Error::backend("get_identity", e.to_string()))? else {
                return Ok(None);
            };

            let cluster_id: i64 = row.get(0).map_err(|e| Error::backend("get_identity", e.to_string()))?;
            let label: Option<String> = row.get(1).map_err(|e| Error::backend("get_identity", e.to_string()))?;
            let first_seen_run: String = row.get(2).map_err(|e| Error::backend("get_identity", e.to_string()))?;
            let last_seen_run: String = row.get(3).map_err(|e| Error::backend("get_identity", e.to_string()))?;
            let status: String = row.get(4).map_err(|e| Error::backend("get_identity", e.to_string()))?;
            let labeled_at: Option<i64> = row.get(5).map_err(|e| Error::backend("get_identity", e.to_string()))?;

            Ok(Some(ClusterIdentity {
                cluster_id,
                label,
                first_seen_run,
                last_seen_run,
                status: str_to_status(&status)?,
                labeled_at: labeled_at.map(|v| from_unix_seconds(v, "labeled_at")).transpose()?,
            }))
        })
        .await
    }

    async fn save_snapshot(&self, snapshot: &ClusterSnapshot) -> ats_core::Result<()> {
        let snapshot = snapshot.clone();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let blob = Embedding::vector_to_blob(&snapshot.centroid);
            conn.execute(
                "INSERT OR REPLACE INTO cluster_snapshots (cluster_id, run_id, centroid, member_count, created_at) \
                 VALUES (?, ?, ?, ?, ?)",
                libsql::params![
                    snapshot.cluster_id,
                    snapshot.run_id,
                    blob,
                    snapshot.member_count as i64,
                    to_unix_seconds(Utc::now()),
                ],
            )
            .await
            .map_err(|e| Error::backend("save_snapshot", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn latest_snapshot(&self, cluster_id: i64) -> ats_core::Result<Option<ClusterSnapshot>> {
        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query(
                    "SELECT cluster_id, run_id, centroid, member_count FROM cluster_snapshots \
                     WHERE cluster_id = ? ORDER BY created_at DESC LIMIT 1",
                    libsql::params![cluster_id],
                )
                .await
                .map_err(|e| Error::backend("latest_snapshot", e.to_string()))?;

            let Some(row) = rows.next().await.map_err(|e| Error::backend("latest_snapshot", e.to_string()))? else {
                return Ok(None);
            };

            let cluster_id: i64 = row.get(0).map_err(|e| Error::backend("latest_snapshot", e.to_string()))?;
            let run_id: String = row.get(1).map_err(|e| Error::backend("latest_snapshot", e.to_string()))?;
            let blob: Vec<u8> = row.get(2).map_err(|e| Error::backend("latest_snapshot", e.to_string()))?;
            let member_count: i64 = row.get(3).map_err(|e| Error::backend("latest_snapshot", e.to_string()))?;
            let centroid = Embedding::blob_to_vector(&blob).map_err(|msg| Error::backend("latest_snapshot", msg))?;

            Ok(Some(ClusterSnapshot {
                cluster_id,
                run_id,
                centroid,
                member_count: member_count as usize,
            }))
        })
        .await
    }

    async fn record_event(&self, event: &ClusterEvent) -> ats_core::Result<()> {
        let event = event.clone();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            conn.execute(
                "INSERT INTO cluster_events (run_id, cluster_id, event_type, similarity, created_at) \
                 VALUES (?, ?, ?, ?, ?)",
                libsql::params![
                    event.run_id,
                    event.cluster_id,
                    event_type_to_str(event.event_type),
                    event.similarity,
                    to_unix_seconds(Utc::now()),
                ],
            )
            .await
            .map_err(|e| Error::backend("record_event", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn upsert_centroid(&self, centroid: &ClusterCentroid) -> ats_core::Result<()> {
        let centroid = centroid.clone();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let blob = Embedding::vector_to_blob(&centroid.centroid);
            conn.execute(
                "INSERT OR REPLACE INTO cluster_centroids (cluster_id, centroid, updated_at) VALUES (?, ?, ?)",
                libsql::params![centroid.cluster_id, blob, to_unix_seconds(centroid.updated_at)],
            )
            .await
            .map_err(|e| Error::backend("upsert_centroid", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn apply_assignments(&self, assignments: &[ClusterAssignment]) -> ats_core::Result<usize> {
        if assignments.is_empty() {
            return Ok(0);
        }
        let assignments = assignments.to_vec();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let tx = conn.transaction().await.map_err(|e| Error::backend("apply_assignments", e.to_string()))?;

            let mut applied = 0usize;
            for assignment in &assignments {
                let affected = tx
                    .execute(
                        "UPDATE embeddings SET cluster_id = ?, cluster_probability = ? WHERE id = ?",
                        libsql::params![assignment.cluster_id, assignment.probability, assignment.embedding_id.clone()],
                    )
                    .await
                    .map_err(|e| Error::backend("apply_assignments", e.to_string()))?;
                applied += affected as usize;
            }

            tx.commit().await.map_err(|e| Error::backend("apply_assignments", e.to_string()))?;
            Ok(applied)
        })
        .await
    }

    async fn save_projection(&self, projection: &EmbeddingProjection) -> ats_core::Result<()> {
        let projection = projection.clone();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            conn.execute(
                "INSERT OR REPLACE INTO embedding_projections (embedding_id, method, x, y, updated_at) \
                 VALUES (?, ?, ?, ?, ?)",
                libsql::params![
                    projection.embedding_id,
                    projection.method,
                    projection.x,
                    projection.y,
                    to_unix_seconds(Utc::now()),
                ],
            )
            .await
            .map_err(|e| Error::backend("save_projection", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn timeline(&self) -> ats_core::Result<Vec<ClusterTimelineEntry>> {
        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query(
                    "SELECT r.id, r.created_at, s.cluster_id, s.member_count, e.event_type \
                     FROM cluster_runs r \
                     JOIN cluster_snapshots s ON s.run_id = r.id \
                     LEFT JOIN cluster_events e ON e.run_id = s.run_id AND e.cluster_id = s.cluster_id \
                     ORDER BY r.created_at ASC, s.cluster_id ASC",
                    (),
                )
                .await
                .map_err(|e| Error::backend("timeline", e.to_string()))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next().await.map_err(|e| Error::backend("timeline", e.to_string()))? {
                let run_id: String = row.get(0).map_err(|e| Error::backend("timeline", e.to_string()))?;
                let run_created_at: i64 = row.get(1).map_err(|e| Error::backend("timeline", e.to_string()))?;
                let cluster_id: i64 = row.get(2).map_err(|e| Error::backend("timeline", e.to_string()))?;
                let member_count: i64 = row.get(3).map_err(|e| Error::backend("timeline", e.to_string()))?;
                let event_type: Option<String> = row.get(4).map_err(|e| Error::backend("timeline", e.to_string()))?;

                out.push(ClusterTimelineEntry {
                    run_id,
                    run_created_at: from_unix_seconds(run_created_at, "run_created_at")?,
                    cluster_id,
                    member_count: member_count as usize,
                    event_type: event_type.as_deref().map(str_to_event_type).transpose()?,
                });
            }
            Ok(out)
        })
        .await
    }

    async fn label_eligible_clusters(
        &self,
        min_size: usize,
        cooldown_before: DateTime<Utc>,
        limit: i64,
    ) -> ats_core::Result<Vec<LabelEligibleCluster>> {
        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query(
                    "SELECT c.id, c.label, c.labeled_at, COUNT(e.id) AS member_count \
                     FROM clusters c \
                     LEFT JOIN embeddings e ON e.cluster_id = c.id \
                     WHERE c.status = 'active' \
                     GROUP BY c.id \
                     HAVING member_count >= ? AND (c.labeled_at IS NULL OR c.labeled_at < ?) \
                     ORDER BY member_count DESC \
                     LIMIT ?",
                    libsql::params![min_size as i64, to_unix_seconds(cooldown_before), limit],
                )
                .await
                .map_err(|e| Error::backend("label_eligible_clusters", e.to_string()))?;

            let mut out = Vec::new();
            while let Some(row) =
                rows.next().await.map_err(|e| Error::backend("label_eligible_clusters", e.to_string()))?
            {
                let cluster_id: i64 =
                    row.get(0).map_err(|e| Error::backend("label_eligible_clusters", e.to_string()))?;
                let label: Option<String> =
                    row.get(1).map_err(|e| Error::backend("label_eligible_clusters", e.to_string()))?;
                let labeled_at: Option<i64> =
                    row.get(2).map_err(|e| Error::backend("label_eligible_clusters", e.to_string()))?;
                let member_count: i64 =
                    row.get(3).map_err(|e| Error::backend("label_eligible_clusters", e.to_string()))?;

                out.push(LabelEligibleCluster {
                    cluster_id,
                    member_count: member_count as usize,
                    label,
                    labeled_at: labeled_at.map(|v| from_unix_seconds(v, "labeled_at")).transpose()?,
                });
            }
            Ok(out)
        })
        .await
    }

    async fn member_texts(&self, cluster_id: i64) -> ats_core::Result<Vec<String>> {
        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query("SELECT text FROM embeddings WHERE cluster_id = ?", libsql::params![cluster_id])
                .await
                .map_err(|e| Error::backend("member_texts", e.to_string()))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next().await.map_err(|e| Error::backend("member_texts", e.to_string()))? {
                out.push(row.get(0).map_err(|e| Error::backend("member_texts", e.to_string()))?);
            }
            Ok(out)
        })
        .await
    }

    async fn projections_by_method(&self, method: &str) -> ats_core::Result<Vec<ProjectionWithCluster>> {
        let method = method.to_string();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query(
                    "SELECT p.embedding_id, p.method, p.x, p.y, e.cluster_id \
                     FROM embedding_projections p \
                     LEFT JOIN embeddings e ON e.id = p.embedding_id \
                     WHERE p.method = ?",
                    libsql::params![method],
                )
                .await
                .map_err(|e| Error::backend("projections_by_method", e.to_string()))?;

            let mut out = Vec::new();
            while let Some(row) =
                rows.next().await.map_err(|e| Error::backend("projections_by_method", e.to_string()))?
            {
                out.push(ProjectionWithCluster {
                    embedding_id: row.get(0).map_err(|e| Error::backend("projections_by_method", e.to_string()))?,
                    method: row.get(1).map_err(|e| Error::backend("projections_by_method", e.to_string()))?,
                    x: row.get(2).map_err(|e| Error::backend("projections_by_method", e.to_string()))?,
                    y: row.get(3).map_err(|e| Error::backend("projections_by_method", e.to_string()))?,
                    cluster_id: row.get(4).map_err(|e| Error::backend("projections_by_method", e.to_string()))?,
                });
            }
            Ok(out)
        })
        .await
    }
}
