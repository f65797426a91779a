//! [`AttestationBackend`] over the `attestations` table.

use crate::codec::{
    decode_attributes, decode_facet, encode_attributes, encode_facet, from_unix_seconds,
    query_params_to_values, to_unix_seconds,
};
use crate::SqliteStorage;
use ats_core::query::QueryParam;
use ats_core::traits::AttestationBackend;
use ats_core::types::Attestation;
use ats_core::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

fn row_to_attestation(row: &libsql::Row) -> ats_core::Result<Attestation> {
    let id: String = row.get(0).map_err(|e| Error::backend("row_to_attestation", e.to_string()))?;
    let subjects_json: String = row.get(1).map_err(|e| Error::backend("row_to_attestation", e.to_string()))?;
    let predicates_json: String = row.get(2).map_err(|e| Error::backend("row_to_attestation", e.to_string()))?;
    let contexts_json: String = row.get(3).map_err(|e| Error::backend("row_to_attestation", e.to_string()))?;
    let actors_json: String = row.get(4).map_err(|e| Error::backend("row_to_attestation", e.to_string()))?;
    let timestamp: i64 = row.get(5).map_err(|e| Error::backend("row_to_attestation", e.to_string()))?;
    let source: String = row.get(6).map_err(|e| Error::backend("row_to_attestation", e.to_string()))?;
    let attributes_json: Option<String> = row.get(7).map_err(|e| Error::backend("row_to_attestation", e.to_string()))?;
    let created_at: i64 = row.get(8).map_err(|e| Error::backend("row_to_attestation", e.to_string()))?;

    Ok(Attestation {
        subjects: decode_facet(&subjects_json, "subjects", Some(&id))?,
        predicates: decode_facet(&predicates_json, "predicates", Some(&id))?,
        contexts: decode_facet(&contexts_json, "contexts", Some(&id))?,
        actors: decode_facet(&actors_json, "actors", Some(&id))?,
        timestamp: from_unix_seconds(timestamp, "timestamp")?,
        source,
        attributes: decode_attributes(attributes_json, Some(&id))?,
        created_at: from_unix_seconds(created_at, "created_at")?,
        id,
    })
}

#[async_trait]
impl AttestationBackend for SqliteStorage {
    async fn insert(&self, attestation: &Attestation) -> ats_core::Result<()> {
        let subjects = encode_facet(&attestation.subjects)?;
        let predicates = encode_facet(&attestation.predicates)?;
        let contexts = encode_facet(&attestation.contexts)?;
        let actors = encode_facet(&attestation.actors)?;
        let attributes = encode_attributes(&attestation.attributes)?;
        let timestamp = to_unix_seconds(attestation.timestamp);
        let created_at = to_unix_seconds(attestation.created_at);
        let id = attestation.id.clone();
        let source = attestation.source.clone();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            conn.execute(
                "INSERT INTO attestations \
                 (id, subjects, predicates, contexts, actors, timestamp, source, attributes, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![id, subjects, predicates, contexts, actors, timestamp, source, attributes, created_at],
            )
            .await
            .map_err(|e| Error::backend("insert_attestation", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &str) -> ats_core::Result<Option<Attestation>> {
        let id = id.to_string();
        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query(
                    "SELECT id, subjects, predicates, contexts, actors, timestamp, source, attributes, created_at \
                     FROM attestations WHERE id = ?",
                    libsql::params![id],
                )
                .await
                .map_err(|e| Error::backend("get_attestation", e.to_string()))?;

            match rows.next().await.map_err(|e| Error::backend("get_attestation", e.to_string()))? {
                Some(row) => Ok(Some(row_to_attestation(&row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn query(&self, where_sql: &str, params: &[QueryParam], limit: i64) -> ats_core::Result<Vec<Attestation>> {
        let where_sql = where_sql.to_string();
        let mut values = query_params_to_values(params);
        values.push(libsql::Value::Integer(limit));

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let sql = format!(
                "SELECT id, subjects, predicates, contexts, actors, timestamp, source, attributes, created_at \
                 FROM attestations WHERE {where_sql} ORDER BY timestamp DESC LIMIT ?"
            );

            let mut rows = conn
                .query(&sql, libsql::params_from_iter(values))
                .await
                .map_err(|e| Error::backend("query_attestations", e.to_string()))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next().await.map_err(|e| Error::backend("query_attestations", e.to_string()))? {
                out.push(row_to_attestation(&row)?);
            }
            Ok(out)
        })
        .await
    }

    async fn delete_many(&self, ids: &[String]) -> ats_core::Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let placeholders = std::iter::repeat("?").take(ids.len()).collect::<Vec<_>>().join(", ");
            let sql = format!("DELETE FROM attestations WHERE id IN ({placeholders})");
            let values: Vec<libsql::Value> = ids.into_iter().map(libsql::Value::Text).collect();

            let affected = conn
                .execute(&sql, libsql::params_from_iter(values))
                .await
                .map_err(|e| Error::backend("delete_attestations", e.to_string()))?;
            Ok(affected as usize)
        })
        .await
    }

    async fn count_actor_context(&self, actor: &str, context: &str) -> ats_core::Result<i64> {
        let actor_pattern = format!("%\"{actor}\"%");
        let context_pattern = format!("%\"{context}\"%");

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM attestations WHERE actors LIKE ? AND contexts LIKE ?",
                    libsql::params![actor_pattern, context_pattern],
                )
                .await
                .map_err(|e| Error::backend("count_actor_context", e.to_string()))?;

            let row = rows
                .next()
                .await
                .map_err(|e| Error::backend("count_actor_context", e.to_string()))?
                .ok_or_else(|| Error::backend("count_actor_context", "COUNT(*) returned no row"))?;
            let count: i64 = row.get(0).map_err(|e| Error::backend("count_actor_context", e.to_string()))?;
            Ok(count)
        })
        .await
    }

    async fn actor_context_usage(&self, actor: &str) -> ats_core::Result<Vec<(String, Vec<String>, DateTime<Utc>)>> {
        let actor_pattern = format!("%\"{actor}\"%");

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query(
                    "SELECT id, contexts, timestamp FROM attestations WHERE actors LIKE ? ORDER BY timestamp ASC",
                    libsql::params![actor_pattern],
                )
                .await
                .map_err(|e| Error::backend("actor_context_usage", e.to_string()))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next().await.map_err(|e| Error::backend("actor_context_usage", e.to_string()))? {
                let id: String = row.get(0).map_err(|e| Error::backend("actor_context_usage", e.to_string()))?;
                let contexts_json: String = row.get(1).map_err(|e| Error::backend("actor_context_usage", e.to_string()))?;
                let timestamp: i64 = row.get(2).map_err(|e| Error::backend("actor_context_usage", e.to_string()))?;
                let contexts = decode_facet(&contexts_json, "contexts", Some(&id))?;
                out.push((id.clone(), contexts, from_unix_seconds(timestamp, "timestamp")?));
            }
            Ok(out)
        })
        .await
    }

    async fn subject_actor_recency(&self, subject: &str) -> ats_core::Result<Vec<(String, Vec<String>, DateTime<Utc>)>> {
        let subject_pattern = format!("%\"{subject}\"%");

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query(
                    "SELECT id, actors, timestamp FROM attestations WHERE subjects LIKE ? ORDER BY timestamp ASC",
                    libsql::params![subject_pattern],
                )
                .await
                .map_err(|e| Error::backend("subject_actor_recency", e.to_string()))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next().await.map_err(|e| Error::backend("subject_actor_recency", e.to_string()))? {
                let id: String = row.get(0).map_err(|e| Error::backend("subject_actor_recency", e.to_string()))?;
                let actors_json: String = row.get(1).map_err(|e| Error::backend("subject_actor_recency", e.to_string()))?;
                let timestamp: i64 = row.get(2).map_err(|e| Error::backend("subject_actor_recency", e.to_string()))?;
                let actors = decode_facet(&actors_json, "actors", Some(&id))?;
                out.push((id.clone(), actors, from_unix_seconds(timestamp, "timestamp")?));
            }
            Ok(out)
        })
        .await
    }

    async fn count_created_between(
        &self,
        actor: &str,
        context: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ats_core::Result<i64> {
        let actor_pattern = format!("%\"{actor}\"%");
        let context_pattern = format!("%\"{context}\"%");
        let start = to_unix_seconds(start);
        let end = to_unix_seconds(end);

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM attestations \
                     WHERE actors LIKE ? AND contexts LIKE ? AND created_at >= ? AND created_at < ?",
                    libsql::params![actor_pattern, context_pattern, start, end],
                )
                .await
                .map_err(|e| Error::backend("count_created_between", e.to_string()))?;

            let row = rows
                .next()
                .await
                .map_err(|e| Error::backend("count_created_between", e.to_string()))?
                .ok_or_else(|| Error::backend("count_created_between", "COUNT(*) returned no row"))?;
            let count: i64 = row.get(0).map_err(|e| Error::backend("count_created_between", e.to_string()))?;
            Ok(count)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;
    use std::collections::HashMap;

    async fn storage() -> SqliteStorage {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        let storage = SqliteStorage::from_database(db);
        storage.initialize_schema().await.unwrap();
        storage
    }

    fn attestation(id: &str, subjects: Vec<String>, actors: Vec<String>) -> Attestation {
        Attestation {
            id: id.to_string(),
            subjects,
            predicates: vec!["speaks".to_string()],
            contexts: vec!["Dutch".to_string()],
            actors,
            timestamp: Utc::now(),
            source: "test".to_string(),
            attributes: Some(HashMap::new()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let storage = storage().await;
        let a = attestation("AS-1", vec!["ALICE".to_string()], vec!["u@x".to_string()]);
        storage.insert(&a).await.unwrap();

        let fetched = storage.get("AS-1").await.unwrap().unwrap();
        assert_eq!(fetched.id, a.id);
        assert_eq!(fetched.subjects, a.subjects);
        assert_eq!(fetched.actors, a.actors);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let storage = storage().await;
        assert!(storage.get("AS-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_respects_limit_and_where_fragment() {
        let storage = storage().await;
        for i in 0..5 {
            storage
                .insert(&attestation(&format!("AS-{i}"), vec!["ALICE".to_string()], vec!["u@x".to_string()]))
                .await
                .unwrap();
        }

        let results = AttestationBackend::query(&storage, "1=1", &[], 3).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn delete_many_removes_named_rows() {
        let storage = storage().await;
        storage.insert(&attestation("AS-1", vec!["ALICE".to_string()], vec!["u@x".to_string()])).await.unwrap();
        storage.insert(&attestation("AS-2", vec!["BOB".to_string()], vec!["u@x".to_string()])).await.unwrap();

        let deleted = storage.delete_many(&["AS-1".to_string()]).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(storage.get("AS-1").await.unwrap().is_none());
        assert!(storage.get("AS-2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_many_with_empty_slice_is_a_noop() {
        let storage = storage().await;
        assert_eq!(storage.delete_many(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn count_actor_context_matches_both_facets() {
        let storage = storage().await;
        storage.insert(&attestation("AS-1", vec!["ALICE".to_string()], vec!["u@x".to_string()])).await.unwrap();
        storage.insert(&attestation("AS-2", vec!["BOB".to_string()], vec!["u@y".to_string()])).await.unwrap();

        let count = storage.count_actor_context("u@x", "Dutch").await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn actor_context_usage_is_ordered_oldest_first() {
        let storage = storage().await;
        storage.insert(&attestation("AS-1", vec!["ALICE".to_string()], vec!["u@x".to_string()])).await.unwrap();
        storage.insert(&attestation("AS-2", vec!["BOB".to_string()], vec!["u@x".to_string()])).await.unwrap();

        let usage = storage.actor_context_usage("u@x").await.unwrap();
        assert_eq!(usage.len(), 2);
        assert!(usage[0].2 <= usage[1].2);
    }

    #[tokio::test]
    async fn actor_context_usage_orders_by_timestamp_not_created_at() {
        let storage = storage().await;
        let now = Utc::now();
        let mut older = attestation("AS-1", vec!["ALICE".to_string()], vec!["u@x".to_string()]);
        older.timestamp = now - chrono::Duration::days(1);
        older.created_at = now;
        let mut newer = attestation("AS-2", vec!["BOB".to_string()], vec!["u@x".to_string()]);
        newer.timestamp = now;
        newer.created_at = now - chrono::Duration::days(1);
        storage.insert(&older).await.unwrap();
        storage.insert(&newer).await.unwrap();

        let usage = storage.actor_context_usage("u@x").await.unwrap();
        assert_eq!(usage[0].0, "AS-1");
        assert_eq!(usage[1].0, "AS-2");
        assert_eq!(usage[0].2, older.timestamp);
        assert_eq!(usage[1].2, newer.timestamp);
    }

    #[tokio::test]
    async fn subject_actor_recency_orders_by_timestamp_not_created_at() {
        let storage = storage().await;
        let now = Utc::now();
        let mut older = attestation("AS-1", vec!["ALICE".to_string()], vec!["u@x".to_string()]);
        older.timestamp = now - chrono::Duration::days(1);
        older.created_at = now;
        let mut newer = attestation("AS-2", vec!["ALICE".to_string()], vec!["u@y".to_string()]);
        newer.timestamp = now;
        newer.created_at = now - chrono::Duration::days(1);
        storage.insert(&older).await.unwrap();
        storage.insert(&newer).await.unwrap();

        let recency = storage.subject_actor_recency("ALICE").await.unwrap();
        assert_eq!(recency[0].0, "AS-1");
        assert_eq!(recency[1].0, "AS-2");
        assert_eq!(recency[0].2, older.timestamp);
        assert_eq!(recency[1].2, newer.timestamp);
    }
}
