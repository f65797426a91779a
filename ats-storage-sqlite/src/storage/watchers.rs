//! [`WatcherBackend`] over the `watchers` table.
//!
//! `filter` and `action_payload` are stored as JSON text; everything else
//! is a plain scalar column.

use crate::codec::{from_unix_seconds, to_unix_seconds};
use crate::SqliteStorage;
use ats_core::traits::WatcherBackend;
use ats_core::types::{Filter, Watcher};
use ats_core::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

fn row_to_watcher(row: &libsql::Row) -> ats_core::Result<Watcher> {
    let id: String = row.get(0).map_err(|e| Error::backend("row_to_watcher", e.to_string()))?;
    let name: String = row.get(1).map_err(|e| Error::backend("row_to_watcher", e.to_string()))?;
    let filter_json: String = row.get(2).map_err(|e| Error::backend("row_to_watcher", e.to_string()))?;
    let action_type: String = row.get(3).map_err(|e| Error::backend("row_to_watcher", e.to_string()))?;
    let action_payload_json: String = row.get(4).map_err(|e| Error::backend("row_to_watcher", e.to_string()))?;
    let max_fires_per_minute: i64 = row.get(5).map_err(|e| Error::backend("row_to_watcher", e.to_string()))?;
    let enabled: i64 = row.get(6).map_err(|e| Error::backend("row_to_watcher", e.to_string()))?;
    let fire_count: i64 = row.get(7).map_err(|e| Error::backend("row_to_watcher", e.to_string()))?;
    let error_count: i64 = row.get(8).map_err(|e| Error::backend("row_to_watcher", e.to_string()))?;
    let last_fired_at: Option<i64> = row.get(9).map_err(|e| Error::backend("row_to_watcher", e.to_string()))?;
    let last_error: Option<String> = row.get(10).map_err(|e| Error::backend("row_to_watcher", e.to_string()))?;

    let filter: Filter = serde_json::from_str(&filter_json).map_err(|source| Error::Codec {
        field: "filter".to_string(),
        attestation_id: Some(id.clone()),
        source,
    })?;
    let action_payload = serde_json::from_str(&action_payload_json).map_err(|source| Error::Codec {
        field: "action_payload".to_string(),
        attestation_id: Some(id.clone()),
        source,
    })?;

    Ok(Watcher {
        id,
        name,
        filter,
        action_type,
        action_payload,
        max_fires_per_minute: max_fires_per_minute as u32,
        enabled: enabled != 0,
        fire_count: fire_count as u64,
        error_count: error_count as u64,
        last_fired_at: last_fired_at.map(|v| from_unix_seconds(v, "last_fired_at")).transpose()?,
        last_error,
    })
}

const WATCHER_COLUMNS: &str = "id, name, filter, action_type, action_payload, max_fires_per_minute, \
     enabled, fire_count, error_count, last_fired_at, last_error";

#[async_trait]
impl WatcherBackend for SqliteStorage {
    async fn insert(&self, watcher: &Watcher) -> ats_core::Result<()> {
        let watcher = watcher.clone();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let filter_json = serde_json::to_string(&watcher.filter).map_err(|source| Error::Codec {
                field: "filter".to_string(),
                attestation_id: Some(watcher.id.clone()),
                source,
            })?;
            let action_payload_json = serde_json::to_string(&watcher.action_payload).map_err(|source| Error::Codec {
                field: "action_payload".to_string(),
                attestation_id: Some(watcher.id.clone()),
                source,
            })?;

            conn.execute(
                "INSERT OR REPLACE INTO watchers \
                 (id, name, filter, action_type, action_payload, max_fires_per_minute, \
                  enabled, fire_count, error_count, last_fired_at, last_error, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    watcher.id.clone(),
                    watcher.name.clone(),
                    filter_json,
                    watcher.action_type.clone(),
                    action_payload_json,
                    i64::from(watcher.max_fires_per_minute),
                    i64::from(watcher.enabled),
                    watcher.fire_count as i64,
                    watcher.error_count as i64,
                    watcher.last_fired_at.map(to_unix_seconds),
                    watcher.last_error.clone(),
                    to_unix_seconds(Utc::now()),
                ],
            )
            .await
            .map_err(|e| Error::backend("insert_watcher", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &str) -> ats_core::Result<Option<Watcher>> {
        let id = id.to_string();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let sql = format!("SELECT {WATCHER_COLUMNS} FROM watchers WHERE id = ?");
            let mut rows = conn
                .query(&sql, libsql::params![id])
                .await
                .map_err(|e| Error::backend("get_watcher", e.to_string()))?;

            match rows.next().await.map_err(|e| Error::backend("get_watcher", e.to_string()))? {
                Some(row) => Ok(Some(row_to_watcher(&row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn list_enabled(&self) -> ats_core::Result<Vec<Watcher>> {
        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let sql = format!("SELECT {WATCHER_COLUMNS} FROM watchers WHERE enabled = 1");
            let mut rows = conn
                .query(&sql, ())
                .await
                .map_err(|e| Error::backend("list_enabled_watchers", e.to_string()))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next().await.map_err(|e| Error::backend("list_enabled_watchers", e.to_string()))? {
                out.push(row_to_watcher(&row)?);
            }
            Ok(out)
        })
        .await
    }

    async fn record_fire(&self, id: &str, fired_at: DateTime<Utc>, error: Option<&str>) -> ats_core::Result<()> {
        let id = id.to_string();
        let error = error.map(str::to_string);

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let affected = conn
                .execute(
                    "UPDATE watchers SET \
                     fire_count = fire_count + 1, \
                     error_count = error_count + CASE WHEN ?1 IS NULL THEN 0 ELSE 1 END, \
                     last_fired_at = ?2, \
                     last_error = ?1 \
                     WHERE id = ?3",
                    libsql::params![error, to_unix_seconds(fired_at), id.clone()],
                )
                .await
                .map_err(|e| Error::backend("record_watcher_fire", e.to_string()))?;

            if affected == 0 {
                return Err(Error::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> ats_core::Result<()> {
        let id = id.to_string();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let affected = conn
                .execute(
                    "UPDATE watchers SET enabled = ? WHERE id = ?",
                    libsql::params![i64::from(enabled), id.clone()],
                )
                .await
                .map_err(|e| Error::backend("set_watcher_enabled", e.to_string()))?;

            if affected == 0 {
                return Err(Error::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &str) -> ats_core::Result<bool> {
        let id = id.to_string();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let affected = conn
                .execute("DELETE FROM watchers WHERE id = ?", libsql::params![id])
                .await
                .map_err(|e| Error::backend("delete_watcher", e.to_string()))?;
            Ok(affected > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ats_core::types::Filter;
    use libsql::Builder;
    use serde_json::json;

    async fn storage() -> SqliteStorage {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        let storage = SqliteStorage::from_database(db);
        storage.initialize_schema().await.unwrap();
        storage
    }

    fn watcher(id: &str) -> Watcher {
        Watcher {
            id: id.to_string(),
            name: "spend spike".to_string(),
            filter: Filter::default(),
            action_type: "webhook".to_string(),
            action_payload: json!({"url": "https://example.com/hook"}),
            max_fires_per_minute: 5,
            enabled: true,
            fire_count: 0,
            error_count: 0,
            last_fired_at: None,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let storage = storage().await;
        storage.insert(&watcher("W-1")).await.unwrap();

        let fetched = storage.get("W-1").await.unwrap().unwrap();
        assert_eq!(fetched.name, "spend spike");
        assert_eq!(fetched.max_fires_per_minute, 5);
        assert!(fetched.enabled);
    }

    #[tokio::test]
    async fn list_enabled_excludes_disabled_watchers() {
        let storage = storage().await;
        storage.insert(&watcher("W-1")).await.unwrap();
        let mut disabled = watcher("W-2");
        disabled.enabled = false;
        storage.insert(&disabled).await.unwrap();

        let enabled = storage.list_enabled().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, "W-1");
    }

    #[tokio::test]
    async fn record_fire_increments_counters_and_tracks_errors() {
        let storage = storage().await;
        storage.insert(&watcher("W-1")).await.unwrap();

        storage.record_fire("W-1", Utc::now(), None).await.unwrap();
        storage.record_fire("W-1", Utc::now(), Some("timeout")).await.unwrap();

        let fetched = storage.get("W-1").await.unwrap().unwrap();
        assert_eq!(fetched.fire_count, 2);
        assert_eq!(fetched.error_count, 1);
        assert_eq!(fetched.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn set_enabled_toggles_flag() {
        let storage = storage().await;
        storage.insert(&watcher("W-1")).await.unwrap();

        storage.set_enabled("W-1", false).await.unwrap();
        assert!(!storage.get("W-1").await.unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn set_enabled_missing_watcher_is_not_found() {
        let storage = storage().await;
        let err = storage.set_enabled("missing", true).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn delete_removes_watcher_and_reports_existence() {
        let storage = storage().await;
        storage.insert(&watcher("W-1")).await.unwrap();

        assert!(storage.delete("W-1").await.unwrap());
        assert!(!storage.delete("W-1").await.unwrap());
        assert!(storage.get("W-1").await.unwrap().is_none());
    }
}
