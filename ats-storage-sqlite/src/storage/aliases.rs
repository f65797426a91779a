//! [`AliasBackend`] over the `aliases` table.
//!
//! Both directions of an alias edge are written inside one transaction:
//! a crash between the two inserts must never leave a one-way alias.

use crate::codec::{from_unix_seconds, to_unix_seconds};
use crate::SqliteStorage;
use ats_core::traits::AliasBackend;
use ats_core::types::Alias;
use ats_core::Error;
use async_trait::async_trait;

fn row_to_alias(row: &libsql::Row) -> ats_core::Result<Alias> {
    let alias: String = row.get(0).map_err(|e| Error::backend("row_to_alias", e.to_string()))?;
    let target: String = row.get(1).map_err(|e| Error::backend("row_to_alias", e.to_string()))?;
    let created_by: String = row.get(2).map_err(|e| Error::backend("row_to_alias", e.to_string()))?;
    let created_at: i64 = row.get(3).map_err(|e| Error::backend("row_to_alias", e.to_string()))?;

    Ok(Alias {
        alias,
        target,
        created_by,
        created_at: from_unix_seconds(created_at, "created_at")?,
    })
}

#[async_trait]
impl AliasBackend for SqliteStorage {
    async fn insert_pair(&self, forward: &Alias, reverse: &Alias) -> ats_core::Result<()> {
        let forward = forward.clone();
        let reverse = reverse.clone();

        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let tx = conn
                .transaction()
                .await
                .map_err(|e| Error::backend("insert_alias_pair", e.to_string()))?;

            for edge in [&forward, &reverse] {
                tx.execute(
                    "INSERT OR REPLACE INTO aliases (alias, target, created_by, created_at) VALUES (?, ?, ?, ?)",
                    libsql::params![
                        edge.alias.clone(),
                        edge.target.clone(),
                        edge.created_by.clone(),
                        to_unix_seconds(edge.created_at),
                    ],
                )
                .await
                .map_err(|e| Error::backend("insert_alias_pair", e.to_string()))?;
            }

            tx.commit().await.map_err(|e| Error::backend("insert_alias_pair", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn resolve_one(&self, identifier: &str) -> ats_core::Result<Option<Alias>> {
        let identifier = identifier.to_string();
        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query(
                    "SELECT alias, target, created_by, created_at FROM aliases \
                     WHERE alias = ? COLLATE NOCASE LIMIT 1",
                    libsql::params![identifier],
                )
                .await
                .map_err(|e| Error::backend("resolve_alias", e.to_string()))?;

            match rows.next().await.map_err(|e| Error::backend("resolve_alias", e.to_string()))? {
                Some(row) => Ok(Some(row_to_alias(&row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn all_for(&self, identifier: &str) -> ats_core::Result<Vec<Alias>> {
        let identifier = identifier.to_string();
        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let mut rows = conn
                .query(
                    "SELECT alias, target, created_by, created_at FROM aliases \
                     WHERE alias = ? COLLATE NOCASE OR target = ? COLLATE NOCASE",
                    libsql::params![identifier.clone(), identifier],
                )
                .await
                .map_err(|e| Error::backend("all_aliases_for", e.to_string()))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next().await.map_err(|e| Error::backend("all_aliases_for", e.to_string()))? {
                out.push(row_to_alias(&row)?);
            }
            Ok(out)
        })
        .await
    }

    async fn remove_all_for(&self, identifier: &str) -> ats_core::Result<usize> {
        let identifier = identifier.to_string();
        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let affected = conn
                .execute(
                    "DELETE FROM aliases WHERE alias = ? COLLATE NOCASE OR target = ? COLLATE NOCASE",
                    libsql::params![identifier.clone(), identifier],
                )
                .await
                .map_err(|e| Error::backend("remove_aliases_for", e.to_string()))?;
            Ok(affected as usize)
        })
        .await
    }

    async fn remove_pair(&self, alias: &str, target: &str) -> ats_core::Result<usize> {
        let alias = alias.to_string();
        let target = target.to_string();
        self.guarded(move |guard| async move {
            let conn = guard.get()?;
            let affected = conn
                .execute(
                    "DELETE FROM aliases WHERE \
                     (alias = ? COLLATE NOCASE AND target = ? COLLATE NOCASE) \
                     OR (alias = ? COLLATE NOCASE AND target = ? COLLATE NOCASE)",
                    libsql::params![alias.clone(), target.clone(), target, alias],
                )
                .await
                .map_err(|e| Error::backend("remove_alias_pair", e.to_string()))?;
            Ok(affected as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use libsql::Builder;

    async fn storage() -> SqliteStorage {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        let storage = SqliteStorage::from_database(db);
        storage.initialize_schema().await.unwrap();
        storage
    }

    fn edge(alias: &str, target: &str) -> Alias {
        Alias {
            alias: alias.to_string(),
            target: target.to_string(),
            created_by: "tester".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_pair_writes_both_directions() {
        let storage = storage().await;
        storage.insert_pair(&edge("bob", "ALICE"), &edge("ALICE", "bob")).await.unwrap();

        let forward = storage.resolve_one("bob").await.unwrap().unwrap();
        assert_eq!(forward.target, "ALICE");
        let reverse = storage.resolve_one("ALICE").await.unwrap().unwrap();
        assert_eq!(reverse.target, "bob");
    }

    #[tokio::test]
    async fn resolve_one_is_case_insensitive() {
        let storage = storage().await;
        storage.insert_pair(&edge("Bob", "ALICE"), &edge("ALICE", "Bob")).await.unwrap();
        assert!(storage.resolve_one("bob").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn remove_all_for_deletes_both_directions() {
        let storage = storage().await;
        storage.insert_pair(&edge("bob", "ALICE"), &edge("ALICE", "bob")).await.unwrap();

        let removed = storage.remove_all_for("bob").await.unwrap();
        assert_eq!(removed, 2);
        assert!(storage.all_for("bob").await.unwrap().is_empty());
        assert!(storage.all_for("ALICE").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_pair_only_deletes_the_named_edge() {
        let storage = storage().await;
        storage.insert_pair(&edge("BILL", "W"), &edge("W", "BILL")).await.unwrap();
        storage.insert_pair(&edge("BILL", "WILLIAM"), &edge("WILLIAM", "BILL")).await.unwrap();

        let removed = storage.remove_pair("BILL", "W").await.unwrap();
        assert_eq!(removed, 2);
        assert!(storage.all_for("W").await.unwrap().is_empty());

        let remaining = storage.all_for("BILL").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].target, "WILLIAM");
    }
}
